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

//! Runtime options for the symbol cache and the upload coordinator.

use std::path::PathBuf;
use tracing::warn;

/// Top-level configuration.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheOptions,
    pub uploader: UploaderOptions,
}

/// Options for [`crate::symbcache::SymbCache`].
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Root directory. Tables are placed in a sub-directory named after the
    /// table factory.
    pub path: PathBuf,

    /// Maximum number of executables tracked before the least recently used
    /// entry is evicted.
    pub size_entries: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            path: default_cache_root(),
            size_entries: 2048,
        }
    }
}

/// Options for [`crate::uploader::SymbolUploader`].
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct UploaderOptions {
    /// Capacity of the retry decision LRU.
    pub cache_size: usize,

    /// Upload only the debug relevant parts of each executable.
    pub strip_text_section: bool,

    /// Capacity of the upload queue. Uploads are dropped while it is full.
    pub queue_size: usize,

    /// Number of concurrent upload workers.
    pub worker_num: usize,

    /// Directory for staging extracted files. A `symuploader` sub-directory
    /// is created inside.
    pub cache_dir: PathBuf,
}

impl Default for UploaderOptions {
    fn default() -> Self {
        Self {
            cache_size: 16384,
            strip_text_section: true,
            queue_size: 4096,
            worker_num: 4,
            cache_dir: default_cache_root(),
        }
    }
}

/// `~/.cache/native-symbols`.
pub fn default_cache_root() -> PathBuf {
    let home = home::home_dir().unwrap_or_else(|| {
        warn!("Unable to determine home directory: fallback to /tmp.");
        "/tmp".into()
    });

    home.join(".cache").join("native-symbols")
}
