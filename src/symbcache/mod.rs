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

//! Disk-backed cache of converted symbol tables.

use crate::config::CacheOptions;
use crate::error::{Error, Result};
use crate::executable::{ExecutableFile, ExecutableMetadata};
use crate::fileid::FileId;
use crate::symtab::{SourceInfo, SymbolTable, TableFactory};
use lru::LruCache;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// State of an executable known to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// A table file exists in the cache directory.
    Converted,

    /// Conversion failed. Not retried while the marker is cached.
    Errored,

    /// Virtual mapping without a backing file, e.g. the vDSO.
    Synthetic,
}

/// Conversion of one executable that other observers wait for.
#[derive(Default)]
struct InFlight {
    done: Mutex<bool>,
    finished: Condvar,
}

impl InFlight {
    fn wait(&self) {
        let mut done = self.done.lock().unwrap();
        while !*done {
            done = self.finished.wait(done).unwrap();
        }
    }
}

/// Releases a claimed conversion and wakes its waiters when dropped.
struct InFlightGuard<'a> {
    cache: &'a SymbCache,
    file_id: FileId,
    flight: Arc<InFlight>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.cache.converting.lock().unwrap().remove(&self.file_id);
        *self.flight.done.lock().unwrap() = true;
        self.flight.finished.notify_all();
    }
}

struct ConvertJob {
    file_id: FileId,
    src: Box<dyn ExecutableFile>,
    done: mpsc::SyncSender<Result<()>>,
}

/// Converts executables into symbol tables and answers address lookups.
///
/// Conversions run one at a time on a dedicated thread. Converted tables
/// are stored as `<dir>/<factory name>/<file ID>` and opened lazily on the
/// first lookup.
pub struct SymbCache {
    factory: Arc<dyn TableFactory>,
    dir: PathBuf,
    markers: Mutex<LruCache<FileId, Marker>>,
    tables: Mutex<HashMap<FileId, Box<dyn SymbolTable>>>,
    converting: Mutex<HashMap<FileId, Arc<InFlight>>>,
    jobs: Mutex<Option<mpsc::Sender<ConvertJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SymbCache {
    pub fn new(factory: Arc<dyn TableFactory>, opts: &CacheOptions) -> Result<Self> {
        let dir = opts.path.join(factory.name());
        tracing::debug!(path = %dir.display(), size = opts.size_entries, "opening symbol cache");
        fs::create_dir_all(&dir)?;

        let capacity = NonZeroUsize::new(opts.size_entries).unwrap_or(NonZeroUsize::MIN);
        let (tx, rx) = mpsc::channel();

        let cache = SymbCache {
            factory: factory.clone(),
            dir: dir.clone(),
            markers: Mutex::new(LruCache::new(capacity)),
            tables: Mutex::default(),
            converting: Mutex::default(),
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(None),
        };
        cache.rehydrate()?;

        let worker = thread::Builder::new()
            .name("symb-convert".into())
            .spawn(move || convert_loop(rx, factory, dir))?;
        *cache.worker.lock().unwrap() = Some(worker);

        Ok(cache)
    }

    /// Marks all tables left behind by previous instances as converted.
    fn rehydrate(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(file_id) = FileId::try_parse_hex(name) else {
                continue;
            };
            if file_id.format_hex() != name {
                continue;
            }

            self.insert_marker(file_id, Marker::Converted);
        }

        Ok(())
    }

    /// Directory the tables are stored in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self, file_id: FileId) -> PathBuf {
        self.dir.join(file_id.format_hex())
    }

    /// Marker of the given executable, if known.
    pub fn marker(&self, file_id: FileId) -> Option<Marker> {
        self.markers.lock().unwrap().get(&file_id).copied()
    }

    pub fn executable_known(&self, file_id: FileId) -> bool {
        self.marker(file_id).is_some()
    }

    /// Observes the executable unless it is already known.
    ///
    /// Failures are logged by [`SymbCache::observe_executable`].
    pub fn report_executable(&self, md: &ExecutableMetadata) {
        if self.executable_known(md.file_id) {
            return;
        }
        let _ = self.observe_executable(md.file_id, md);
    }

    /// Converts the executable into a symbol table.
    ///
    /// Blocks until the conversion finished. Executables that are already
    /// known aren't converted again: a previous failure is reported as
    /// [`Error::UnknownFile`]. Concurrent observers of the same executable
    /// wait for the first one instead of converting it again.
    pub fn observe_executable(&self, file_id: FileId, md: &ExecutableMetadata) -> Result<()> {
        if md.file_name.is_empty() {
            return Err(Error::InvalidMapping);
        }

        if let Some(known) = self.known_result(file_id) {
            return known;
        }

        if md.is_vdso() {
            self.insert_marker(file_id, Marker::Synthetic);
            return Ok(());
        }

        let _guard = match self.claim(file_id) {
            Ok(guard) => guard,
            Err(flight) => {
                flight.wait();
                return self.known_result(file_id).unwrap_or(Err(Error::UnknownFile));
            }
        };
        // The previous claimant may have finished in the meantime.
        if let Some(known) = self.known_result(file_id) {
            return known;
        }

        let start = Instant::now();
        let res = self.convert(file_id, md);
        let duration = start.elapsed();

        match &res {
            Ok(()) => {
                self.insert_marker(file_id, Marker::Converted);
                tracing::debug!(
                    file_id = %file_id,
                    elf = %md.file_name,
                    pid = md.pid,
                    ?duration,
                    "converted"
                );
            }
            Err(Error::Closed) => {
                tracing::debug!(file_id = %file_id, "symbol cache is closed");
            }
            Err(e) => {
                self.insert_marker(file_id, Marker::Errored);
                if e.is_benign() {
                    tracing::debug!(
                        file_id = %file_id,
                        elf = %md.file_name,
                        pid = md.pid,
                        ?duration,
                        error = %e,
                        "conversion failed"
                    );
                } else {
                    tracing::error!(
                        file_id = %file_id,
                        elf = %md.file_name,
                        pid = md.pid,
                        ?duration,
                        error = %e,
                        "conversion failed"
                    );
                }
            }
        }

        res
    }

    fn known_result(&self, file_id: FileId) -> Option<Result<()>> {
        match self.marker(file_id)? {
            Marker::Errored => Some(Err(Error::UnknownFile)),
            Marker::Converted | Marker::Synthetic => Some(Ok(())),
        }
    }

    /// Claims the conversion of `file_id`, or returns the conversion that
    /// is already running.
    fn claim(&self, file_id: FileId) -> std::result::Result<InFlightGuard<'_>, Arc<InFlight>> {
        let mut converting = self.converting.lock().unwrap();
        if let Some(flight) = converting.get(&file_id) {
            return Err(flight.clone());
        }

        let flight = Arc::new(InFlight::default());
        converting.insert(file_id, flight.clone());
        Ok(InFlightGuard {
            cache: self,
            file_id,
            flight,
        })
    }

    fn convert(&self, file_id: FileId, md: &ExecutableMetadata) -> Result<()> {
        if self.table_path(file_id).try_exists()? {
            return Ok(());
        }

        let src = open_source(md)?;
        let (done, result) = mpsc::sync_channel(1);
        let job = ConvertJob { file_id, src, done };

        {
            let jobs = self.jobs.lock().unwrap();
            let Some(jobs) = jobs.as_ref() else {
                return Err(Error::Closed);
            };
            jobs.send(job).map_err(|_| Error::Closed)?;
        }

        result.recv().map_err(|_| Error::Closed)?
    }

    /// Looks up the source location of an address.
    ///
    /// Returns an empty [`SourceInfo`] if the address isn't covered by the
    /// table.
    pub fn resolve_address(&self, file_id: FileId, addr: u64) -> Result<SourceInfo> {
        if self.marker(file_id) != Some(Marker::Converted) {
            return Err(Error::UnknownFile);
        }

        let mut tables = self.tables.lock().unwrap();
        if let Some(table) = tables.get(&file_id) {
            return table.lookup(addr);
        }

        let path = self.table_path(file_id);
        match self.factory.open_table(&path) {
            Ok(table) => {
                let info = table.lookup(addr);
                tables.insert(file_id, table);
                info
            }
            Err(e) => {
                tracing::debug!(file_id = %file_id, error = %e, "failed to open symbol table");
                remove_table_file(&path);
                self.markers.lock().unwrap().pop(&file_id);
                Err(e)
            }
        }
    }

    /// Closes all open table handles.
    pub fn cleanup(&self) {
        self.tables.lock().unwrap().clear();
    }

    /// Finishes queued conversions and stops the conversion thread.
    ///
    /// Further conversions fail with [`Error::Closed`].
    pub fn close(&self) {
        drop(self.jobs.lock().unwrap().take());

        if let Some(worker) = self.worker.lock().unwrap().take() {
            if worker.join().is_err() {
                tracing::error!("symbol conversion thread panicked");
            }
        }

        self.cleanup();
    }

    fn insert_marker(&self, file_id: FileId, marker: Marker) {
        let evicted = self.markers.lock().unwrap().push(file_id, marker);

        // `push` also returns the previous value when updating an entry.
        if let Some((evicted_id, Marker::Converted)) = evicted {
            if evicted_id != file_id {
                self.evict_table(evicted_id);
            }
        }
    }

    fn evict_table(&self, file_id: FileId) {
        self.tables.lock().unwrap().remove(&file_id);

        let path = self.table_path(file_id);
        tracing::debug!(path = %path.display(), "evicting symbol table");
        remove_table_file(&path);
    }
}

impl Drop for SymbCache {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_source(md: &ExecutableMetadata) -> Result<Box<dyn ExecutableFile>> {
    if let Some(path) = &md.debuglink_path {
        match File::open(path) {
            Ok(file) => return Ok(Box::new(file)),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "failed to open debug file")
            }
        }
    }

    Ok((md.open)()?)
}

fn remove_table_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            tracing::error!(path = %path.display(), error = %e, "failed to remove symbol table");
        }
    }
}

fn convert_loop(jobs: mpsc::Receiver<ConvertJob>, factory: Arc<dyn TableFactory>, dir: PathBuf) {
    for mut job in jobs {
        let res = convert_one(&*factory, &dir, job.file_id, &mut *job.src);

        // The caller waits unless it panicked.
        let _ = job.done.send(res);
    }
}

fn convert_one(
    factory: &dyn TableFactory,
    dir: &Path,
    file_id: FileId,
    src: &mut dyn ExecutableFile,
) -> Result<()> {
    let path = dir.join(file_id.format_hex());
    if path.try_exists()? {
        return Ok(());
    }

    let tmp_path = dir.join(format!("{}.tmp", file_id.format_hex()));
    let res = (|| -> Result<()> {
        let mut dst = File::create(&tmp_path)?;
        factory.convert_table(src, &mut dst)?;
        dst.sync_all()?;
        drop(dst);
        fs::rename(&tmp_path, &path)?;
        Ok(())
    })();

    if res.is_err() {
        remove_table_file(&tmp_path);
    }

    res
}
