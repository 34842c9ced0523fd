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

//! Stable identity of an executable's contents.

use std::fmt;
use std::str::FromStr;

/// Globally unique identifier for an executable.
///
/// Derived upstream from a build ID or a content hash. Everything in this
/// crate treats it as an opaque key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct FileId(u128);

impl FileId {
    /// Length of the canonical string form.
    pub const HEX_LEN: usize = 32;

    /// Construct a file ID from its two 64-bit halves.
    pub const fn from_parts(hi: u64, lo: u64) -> Self {
        Self(((hi as u128) << 64) | lo as u128)
    }

    pub const fn hi(self) -> u64 {
        (self.0 >> 64) as u64
    }

    pub const fn lo(self) -> u64 {
        self.0 as u64
    }

    /// Canonical string form: 32 lowercase hex digits, high half first.
    pub fn format_hex(&self) -> String {
        format!("{:016x}{:016x}", self.hi(), self.lo())
    }

    /// Parse the canonical string form.
    ///
    /// Only strings that [`FileId::format_hex`] could have produced are
    /// accepted, with the exception of uppercase digits.
    pub fn try_parse_hex(s: &str) -> Option<Self> {
        if s.len() != Self::HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }

        u128::from_str_radix(s, 16).ok().map(Self)
    }
}

impl From<u128> for FileId {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<FileId> for u128 {
    fn from(value: FileId) -> Self {
        value.0
    }
}

impl FromStr for FileId {
    type Err = InvalidFileId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse_hex(s).ok_or(InvalidFileId)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi(), self.lo())
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({self})")
    }
}

/// Returned when parsing a malformed file ID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid file ID: expected {} hex digits", FileId::HEX_LEN)]
pub struct InvalidFileId;
