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

//! Native code symbolization for a continuous profiling agent.
//!
//! - [`elfwriter`] reduces ELF files to the parts needed for symbolization.
//! - [`symbcache`] converts executables into lookup tables on disk and
//!   resolves addresses with them.
//! - [`uploader`] ships debug info to a remote symbol store.

pub mod config;
pub mod elfwriter;
pub mod error;
pub mod executable;
pub mod fileid;
pub mod log;
pub mod symbcache;
pub mod symtab;
pub mod uploader;

#[cfg(test)]
mod testutil;

pub use error::{Error, Result};
pub use fileid::FileId;
