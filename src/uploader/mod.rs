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

//! Ships debug info of observed executables to a remote symbol store.
//!
//! Each upload negotiates with the store first, transfers the file via the
//! strategy the store picked and finally marks the upload as finished. The
//! outcome is remembered in a [`RetryCache`] so that executables are not
//! negotiated over and over again.

use crate::config::UploaderOptions;
use crate::elfwriter::{only_keep_debug, ElfError, Options};
use crate::error::is_vanished;
use crate::executable::OpenFn;
use crate::fileid::FileId;
use anyhow::{bail, Context};
use futures::stream::{self, Stream, StreamExt};
use pb::upload_instructions::UploadStrategy;
use std::fs;
use std::io::{self, BufWriter, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

pub use client::{DebuginfoClient, GrpcDebuginfoClient};
pub use retry::{RetryCache, RetryDecision};
pub use tracker::InProgressTracker;

mod client;
pub mod pb;
mod retry;
mod tracker;

/// Reason the store gives when another agent is uploading the same file.
pub const REASON_UPLOAD_IN_PROGRESS: &str =
    "A previous upload is still in-progress and not stale yet (only stale uploads can be retried).";

/// How long to back off when another upload of the same file may still fail.
pub const RETRY_AFTER: Duration = Duration::from_secs(5 * 60);

/// Shrink the in-progress set when its peak exceeds the size by this ratio.
const SHRINK_RATIO: f64 = 0.2;

/// Size of the chunks payloads are streamed in.
const CHUNK_SIZE: usize = 1 << 20;

/// A request to upload an executable.
pub struct UploadJob {
    pub file_id: FileId,
    pub file_name: String,

    /// GNU build ID, or empty if the executable has none.
    pub build_id: String,

    pub open: OpenFn,
    pub client: Arc<dyn DebuginfoClient>,
}

/// Upload counters.
#[derive(Debug, Default)]
pub struct UploadStats {
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,

    /// Uploads dropped because the queue was full.
    pub dropped: AtomicU64,

    pub bytes_uploaded: AtomicU64,
}

/// Deduplicating upload queue with a pool of workers.
pub struct SymbolUploader {
    http: reqwest::Client,
    retry: RetryCache,
    in_progress: InProgressTracker,
    strip_text_section: bool,
    tmp: PathBuf,
    queue_tx: mpsc::Sender<UploadJob>,
    queue_rx: tokio::sync::Mutex<mpsc::Receiver<UploadJob>>,
    worker_num: usize,
    stats: UploadStats,
}

impl SymbolUploader {
    /// Creates the uploader and empties its staging directory.
    pub fn new(opts: &UploaderOptions) -> anyhow::Result<Self> {
        let tmp = opts.cache_dir.join("symuploader");
        fs::create_dir_all(&tmp)
            .with_context(|| format!("failed to create cache directory ({})", tmp.display()))?;
        clear_staging_dir(&tmp)
            .with_context(|| format!("failed to clean cache directory ({})", tmp.display()))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to create HTTP client")?;

        let (queue_tx, queue_rx) = mpsc::channel(opts.queue_size.max(1));

        Ok(Self {
            http,
            retry: RetryCache::new(opts.cache_size),
            in_progress: InProgressTracker::new(SHRINK_RATIO),
            strip_text_section: opts.strip_text_section,
            tmp,
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(queue_rx),
            worker_num: opts.worker_num.max(1),
            stats: UploadStats::default(),
        })
    }

    pub fn stats(&self) -> &UploadStats {
        &self.stats
    }

    pub fn retry_cache(&self) -> &RetryCache {
        &self.retry
    }

    /// Enqueues an upload unless one is in progress or a decision suppresses
    /// it. Never blocks.
    pub fn upload(
        &self,
        client: Arc<dyn DebuginfoClient>,
        file_id: FileId,
        file_name: &str,
        build_id: &str,
        open: OpenFn,
    ) {
        self.upload_at(Instant::now(), client, file_id, file_name, build_id, open)
    }

    /// [`SymbolUploader::upload`] with retry decisions evaluated at `now`.
    pub fn upload_at(
        &self,
        now: Instant,
        client: Arc<dyn DebuginfoClient>,
        file_id: FileId,
        file_name: &str,
        build_id: &str,
        open: OpenFn,
    ) {
        if self.retry.contains_at(file_id, now) {
            return;
        }

        if self.in_progress.get_or_add(file_id) {
            return;
        }

        let job = UploadJob {
            file_id,
            file_name: file_name.to_owned(),
            build_id: build_id.to_owned(),
            open,
            client,
        };

        match self.queue_tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.in_progress.remove(file_id);
                self.stats.dropped.fetch_add(1, Relaxed);
                warn!(
                    file_name,
                    build_id, "failed to enqueue upload request, queue is full"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.in_progress.remove(file_id);
            }
        }
    }

    /// Processes the queue with `worker_num` workers until `shutdown` turns
    /// true or its sender is dropped. Uploads in flight are abandoned.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let mut workers = JoinSet::new();

        for _ in 0..self.worker_num {
            let this = Arc::clone(&self);
            let mut shutdown = shutdown.clone();
            workers.spawn(async move {
                loop {
                    let job = tokio::select! {
                        _ = shutdown_signalled(&mut shutdown) => return,
                        job = this.next_job() => match job {
                            Some(job) => job,
                            None => return,
                        },
                    };

                    tokio::select! {
                        _ = shutdown_signalled(&mut shutdown) => return,
                        _ = this.process(job) => {}
                    }
                }
            });
        }

        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                error!("upload worker failed: {e}");
            }
        }
    }

    async fn next_job(&self) -> Option<UploadJob> {
        self.queue_rx.lock().await.recv().await
    }

    async fn process(&self, job: UploadJob) {
        let _in_progress = tracker::InProgressGuard::new(&self.in_progress, job.file_id);

        match self.attempt_upload(&job).await {
            Ok(Some(bytes)) => {
                self.stats.succeeded.fetch_add(1, Relaxed);
                self.stats.bytes_uploaded.fetch_add(bytes, Relaxed);
            }
            Ok(None) => {}
            Err(e) => {
                self.stats.failed.fetch_add(1, Relaxed);
                warn!(
                    file_name = %job.file_name,
                    build_id = %job.build_id,
                    "failed to upload: {e:#}"
                );
            }
        }
    }

    /// Runs the upload protocol for one executable. Returns the number of
    /// bytes transferred, or `None` if nothing was uploaded.
    async fn attempt_upload(&self, job: &UploadJob) -> anyhow::Result<Option<u64>> {
        let file_id = job.file_id;
        let (build_id, build_id_type) = match job.build_id.as_str() {
            "" => (file_id.format_hex(), pb::BuildIdType::Hash),
            id => (id.to_owned(), pb::BuildIdType::Gnu),
        };
        let debuginfo_type = pb::DebuginfoType::DebuginfoUnspecified as i32;

        let should = job
            .client
            .should_initiate_upload(pb::ShouldInitiateUploadRequest {
                build_id: build_id.clone(),
                build_id_type: build_id_type as i32,
                r#type: debuginfo_type,
                ..Default::default()
            })
            .await?;

        debug!(
            file_name = %job.file_name,
            %file_id,
            %build_id,
            should_initiate_upload = should.should_initiate_upload,
            reason = %should.reason,
            "ShouldInitiateUpload result"
        );

        if !should.should_initiate_upload {
            if should.reason == REASON_UPLOAD_IN_PROGRESS {
                self.retry.retry_after(file_id, RETRY_AFTER);
            } else {
                self.retry.never_retry(file_id);
            }
            return Ok(None);
        }

        let payload = match self.prepare(job).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                self.retry.never_retry(file_id);
                return Ok(None);
            }
            Err(PrepareError::Extract(e)) => {
                self.retry.never_retry(file_id);
                return Err(anyhow::Error::new(e).context("extract debuginfo"));
            }
            Err(PrepareError::Io(e)) => return Err(e.into()),
        };
        let Payload {
            reader,
            size,
            staged: _staged,
        } = payload;

        let initiated = job
            .client
            .initiate_upload(pb::InitiateUploadRequest {
                build_id: build_id.clone(),
                build_id_type: build_id_type as i32,
                r#type: debuginfo_type,
                hash: file_id.format_hex(),
                size: size as i64,
                ..Default::default()
            })
            .await;

        let initiated = match initiated {
            Ok(resp) => resp,
            Err(status) => {
                debug!(%file_id, "InitiateUpload failed: {status}");
                match status.code() {
                    // Another agent is uploading; it may still fail.
                    tonic::Code::FailedPrecondition => {
                        self.retry.retry_after(file_id, RETRY_AFTER)
                    }
                    tonic::Code::AlreadyExists | tonic::Code::InvalidArgument => {
                        self.retry.never_retry(file_id)
                    }
                    _ => return Err(status.into()),
                }
                return Ok(None);
            }
        };

        let Some(instructions) = initiated.upload_instructions else {
            self.retry.never_retry(file_id);
            return Ok(None);
        };

        let uploaded = match UploadStrategy::try_from(instructions.upload_strategy) {
            Ok(UploadStrategy::SignedUrl) => {
                self.upload_via_signed_url(&instructions.signed_url, reader, size)
                    .await?;
                size
            }
            Ok(UploadStrategy::Grpc) => {
                let info = pb::UploadInfo {
                    build_id: instructions.build_id.clone(),
                    upload_id: instructions.upload_id.clone(),
                    r#type: instructions.r#type,
                };
                let resp = job.client.upload(info, chunk_stream(reader).boxed()).await?;
                resp.size
            }
            _ => {
                warn!(
                    strategy = instructions.upload_strategy,
                    "unknown upload strategy"
                );
                self.retry.never_retry(file_id);
                return Ok(None);
            }
        };

        job.client
            .mark_upload_finished(pb::MarkUploadFinishedRequest {
                build_id: build_id.clone(),
                upload_id: instructions.upload_id,
                ..Default::default()
            })
            .await?;

        debug!(
            file_name = %job.file_name,
            %build_id,
            bytes = uploaded,
            "upload succeeded"
        );
        self.retry.never_retry(file_id);
        Ok(Some(uploaded))
    }

    /// Opens the executable and, in strip mode, extracts its debug info into
    /// the staging directory.
    async fn prepare(&self, job: &UploadJob) -> Result<Option<Payload>, PrepareError> {
        let open = Arc::clone(&job.open);
        let strip = self.strip_text_section;
        let tmp = self.tmp.clone();
        let file_id = job.file_id;

        tokio::task::spawn_blocking(move || prepare_payload(&open, strip, &tmp, file_id))
            .await
            .map_err(|e| PrepareError::Io(io::Error::other(e)))?
    }

    async fn upload_via_signed_url(
        &self,
        url: &str,
        reader: Box<dyn Read + Send>,
        size: u64,
    ) -> anyhow::Result<()> {
        let resp = self
            .http
            .put(url)
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(chunk_stream(reader)))
            .send()
            .await
            .context("do upload request")?;

        let status = resp.status();
        if !status.is_success() {
            let msg = resp.text().await.unwrap_or_default();
            bail!("unexpected status code: {}, msg: {msg}", status.as_u16());
        }

        Ok(())
    }
}

async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Removes the files left behind by a previous instance.
fn clear_staging_dir(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        if let Err(e) = fs::remove_file(entry.path()) {
            warn!(path = %entry.path().display(), "failed to remove cached file: {e}");
        }
    }
    Ok(())
}

/// File ready to be transferred.
struct Payload {
    reader: Box<dyn Read + Send>,
    size: u64,

    /// Extracted file, deleted on drop.
    staged: Option<tempfile::TempPath>,
}

#[derive(Debug, thiserror::Error)]
enum PrepareError {
    #[error(transparent)]
    Extract(ElfError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Returns `None` if there is nothing to upload now or ever.
fn prepare_payload(
    open: &OpenFn,
    strip: bool,
    tmp: &Path,
    file_id: FileId,
) -> Result<Option<Payload>, PrepareError> {
    let mut original = match open() {
        Ok(f) => f,
        Err(e) if is_vanished(&e) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if !strip {
        let size = original.size_hint()?.unwrap_or(0);
        if size == 0 {
            return Ok(None);
        }
        original.rewind()?;
        return Ok(Some(Payload {
            reader: Box::new(original),
            size,
            staged: None,
        }));
    }

    let mut staged = tempfile::Builder::new()
        .prefix(&format!("{file_id}."))
        .tempfile_in(tmp)?;

    let opts = Options {
        compress_dwarf: true,
    };
    only_keep_debug(BufWriter::new(staged.as_file_mut()), &mut original, opts)
        .map_err(PrepareError::Extract)?;

    let size = staged.as_file().metadata()?.len();
    if size == 0 {
        return Ok(None);
    }
    staged.as_file_mut().rewind()?;

    let (file, path) = staged.into_parts();
    Ok(Some(Payload {
        reader: Box::new(file),
        size,
        staged: Some(path),
    }))
}

/// Reads `reader` on the blocking pool in chunks of [`CHUNK_SIZE`].
fn chunk_stream(
    reader: Box<dyn Read + Send>,
) -> impl Stream<Item = io::Result<Vec<u8>>> + Send + Sync + 'static {
    let reader = Arc::new(Mutex::new(reader));
    stream::try_unfold(reader, |reader| async move {
        let r = Arc::clone(&reader);
        let chunk = tokio::task::spawn_blocking(move || read_chunk(&mut *r.lock().unwrap()))
            .await
            .map_err(io::Error::other)??;
        Ok::<_, io::Error>((!chunk.is_empty()).then_some((chunk, reader)))
    })
}

fn read_chunk(reader: &mut dyn Read) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(CHUNK_SIZE);
    reader.take(CHUNK_SIZE as u64).read_to_end(&mut buf)?;
    Ok(buf)
}
