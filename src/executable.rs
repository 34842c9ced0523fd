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

//! Executables as reported by the sampler.

use crate::fileid::FileId;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek};
use std::path::PathBuf;
use std::sync::Arc;

/// File name under which the kernel maps the vDSO.
pub const VDSO_PATH_NAME: &str = "[vdso]";

/// Readable, seekable view of an executable's bytes.
pub trait ExecutableFile: Read + Seek + Send {
    /// Size of the underlying file, if it can be determined.
    fn size_hint(&self) -> io::Result<Option<u64>> {
        Ok(None)
    }
}

impl ExecutableFile for File {
    fn size_hint(&self) -> io::Result<Option<u64>> {
        Ok(Some(self.metadata()?.len()))
    }
}

impl<T: AsRef<[u8]> + Send> ExecutableFile for Cursor<T> {
    fn size_hint(&self) -> io::Result<Option<u64>> {
        Ok(Some(self.get_ref().as_ref().len() as u64))
    }
}

/// Opens the original bytes of an executable.
pub type OpenFn = Arc<dyn Fn() -> io::Result<Box<dyn ExecutableFile>> + Send + Sync>;

/// Wraps a closure into an [`OpenFn`].
pub fn open_fn<F>(f: F) -> OpenFn
where
    F: Fn() -> io::Result<Box<dyn ExecutableFile>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Meta-data about a newly observed executable mapping.
#[derive(Clone)]
pub struct ExecutableMetadata {
    pub file_id: FileId,

    /// File name of the mapping inside the profiled process.
    pub file_name: String,

    /// Separate debug file located through `.gnu_debuglink`, if any.
    pub debuglink_path: Option<PathBuf>,

    /// PID of the process the mapping was observed in.
    pub pid: u32,

    pub open: OpenFn,
}

impl ExecutableMetadata {
    /// Metadata for an executable on the local file system.
    pub fn from_path(file_id: FileId, path: impl Into<PathBuf>, pid: u32) -> Self {
        let path = path.into();
        let file_name = path.to_string_lossy().into_owned();
        Self {
            file_id,
            file_name,
            debuglink_path: None,
            pid,
            open: open_fn(move || Ok(Box::new(File::open(&path)?))),
        }
    }

    pub fn is_vdso(&self) -> bool {
        self.file_name == VDSO_PATH_NAME
    }
}

impl fmt::Debug for ExecutableMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableMetadata")
            .field("file_id", &self.file_id)
            .field("file_name", &self.file_name)
            .field("debuglink_path", &self.debuglink_path)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Marker for mappings of anonymous memory.
#[derive(Debug, thiserror::Error)]
#[error("no backing file for anonymous memory")]
pub struct NoBackingFile;

/// Error that [`OpenFn`] implementations return for anonymous mappings.
pub fn no_backing_file() -> io::Error {
    io::Error::other(NoBackingFile)
}

pub fn is_no_backing_file(e: &io::Error) -> bool {
    e.get_ref().is_some_and(|inner| inner.is::<NoBackingFile>())
}
