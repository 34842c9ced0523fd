// Copyright Elasticsearch B.V. and/or licensed to Elasticsearch B.V. under one
// or more contributor license agreements. See the NOTICE file distributed with
// this work for additional information regarding copyright
// ownership. Elasticsearch B.V. licenses this file to you under
// the Apache License, Version 2.0 (the "License"); you may
// not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::elfwriter::ElfError;
use crate::executable::is_no_backing_file;
use std::io;

/// `ESRCH`: the process owning a mapping is gone. The value is the Linux
/// one and isn't checked elsewhere.
#[cfg(target_os = "linux")]
const ESRCH: Option<i32> = Some(3);
#[cfg(not(target_os = "linux"))]
const ESRCH: Option<i32> = None;

/// Errors produced while converting or looking up symbol tables.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The executable was never converted, or its conversion failed.
    #[error("unknown file")]
    UnknownFile,

    #[error("invalid mapping file")]
    InvalidMapping,

    /// The executable carries neither debug info nor a symbol table.
    #[error("no symbols")]
    NoSymbols,

    #[error("symbol cache is closed")]
    Closed,

    #[error("malformed symbol table: {0}")]
    BadTable(String),

    #[error(transparent)]
    Elf(#[from] ElfError),

    #[error(transparent)]
    Dwarf(#[from] gimli::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether this is an expected outcome during process churn rather than an
    /// operational problem.
    pub fn is_benign(&self) -> bool {
        match self {
            Error::NoSymbols => true,
            Error::Io(e) => is_vanished(e),
            Error::Elf(ElfError::Io(e)) => is_vanished(e),
            _ => false,
        }
    }
}

/// Whether the I/O error means the file or its owning process disappeared.
pub fn is_vanished(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound
        || (ESRCH.is_some() && e.raw_os_error() == ESRCH)
        || is_no_backing_file(e)
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
