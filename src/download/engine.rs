//! Transfer engine: one resumable, retrying transfer into a temp file that is
//! atomically promoted to its final name.
//!
//! # Overview
//!
//! [`TransferEngine::transfer`] rewrites the URL to a mirror (once), then runs
//! attempts under the request's [`RetryPolicy`](super::RetryPolicy). The
//! first attempt to succeed in resolving the file name fixes it for the rest.
//! Before each streaming request the temp file length is re-read as the
//! resume offset. On success the temp file is
//! verified and renamed into place.
//!
//! One transfer is one sequential task: network reads and disk writes
//! alternate inside the chunk loop. Transfers to distinct destinations are
//! independent and may run concurrently; a second transfer to a destination
//! already in flight in this process is rejected.
//!
//! # Example
//!
//! ```no_run
//! use model_fetch::download::{TransferEngine, TransferRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let request = TransferRequest::new(
//!     "https://huggingface.co/org/repo/resolve/main/model.safetensors",
//!     "./models/checkpoints",
//! )
//! .with_mirror(true);
//! let outcome = TransferEngine::new().transfer(&request).await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::{LazyLock, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::StreamExt;
use reqwest::{Response, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::{HttpClient, content_range, expected_total_bytes};
use super::filename::resolve_filename;
use super::mirror::MirrorConfig;
use super::request::{ProgressCallback, TransferOutcome, TransferProgress, TransferRequest};
use super::resume::{TransferState, finalize};
use super::TransferError;

/// Final paths with a transfer in flight in this process.
static IN_FLIGHT: LazyLock<DashMap<PathBuf, ()>> = LazyLock::new(DashMap::new);

/// Transfers one resource per call. Cheap to clone and share.
#[derive(Clone, Default)]
pub struct TransferEngine {
    mirror: MirrorConfig,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("mirror", &self.mirror)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Values fixed for every attempt of one transfer.
struct AttemptContext<'a> {
    client: &'a HttpClient,
    url: &'a str,
    token: Option<&'a str>,
    directory: &'a Path,
    rename_to: Option<&'a str>,
    override_existing: bool,
    chunk_size: usize,
}

/// Final path and in-flight registration, fixed by the first attempt that resolves them.
struct Destination {
    final_path: PathBuf,
    _guard: InFlightGuard,
}

/// Result of the attempt that ended the retry loop.
enum Step {
    Skipped(PathBuf),
    Streamed(Attempted),
}

/// What a successful attempt leaves behind for the finalizer.
struct Attempted {
    state: TransferState,
    resumed: bool,
}

impl TransferEngine {
    /// Creates an engine with the default mirror configuration and no progress reporting.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the mirror/authenticated-host configuration.
    #[must_use]
    pub fn with_mirror_config(mut self, mirror: MirrorConfig) -> Self {
        self.mirror = mirror;
        self
    }

    /// Reports cumulative progress after every chunk written to the temp file.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Returns the mirror configuration in use.
    #[must_use]
    pub fn mirror_config(&self) -> &MirrorConfig {
        &self.mirror
    }

    /// Transfers `request.source_url` into `request.destination_directory`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`TransferError`], or
    /// [`TransferError::RetriesExhausted`] wrapping the last transient one.
    /// The temp file is kept for a later resume on every failure except
    /// [`TransferError::Integrity`].
    #[instrument(skip(self, request), fields(url = %request.source_url))]
    pub async fn transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, TransferError> {
        let url = self.mirror.rewrite(&request.source_url, request.use_mirror);
        Url::parse(&url).map_err(|_| TransferError::invalid_url(&url))?;
        let token = request
            .auth_token
            .as_deref()
            .filter(|_| self.mirror.requires_auth(&url));
        let client = HttpClient::new(request.timeout, request.skip_tls_verify);
        let policy = request.retry_policy();

        let directory = &request.destination_directory;
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|e| TransferError::io(directory, e))?;

        let ctx = AttemptContext {
            client: &client,
            url: &url,
            token,
            directory,
            rename_to: request.rename_to.as_deref(),
            override_existing: request.override_existing,
            chunk_size: request.chunk_size_bytes.max(1),
        };

        // Name resolution and streaming share one retry budget.
        let destination = OnceLock::new();
        let step = policy
            .run(&url, |attempt| self.step(&ctx, &destination, attempt))
            .await?;
        let attempted = match step {
            Step::Skipped(path) => return Ok(TransferOutcome::Skipped { path }),
            Step::Streamed(attempted) => attempted,
        };
        let bytes = finalize(&attempted.state).await?;

        Ok(TransferOutcome::Downloaded {
            path: attempted.state.final_path().to_path_buf(),
            bytes,
            resumed: attempted.resumed,
        })
    }

    /// One attempt: resolves the destination unless an earlier attempt did, then streams.
    async fn step(
        &self,
        ctx: &AttemptContext<'_>,
        slot: &OnceLock<Destination>,
        attempt: u32,
    ) -> Result<Step, TransferError> {
        let (destination, naming_response) = match slot.get() {
            Some(destination) => (destination, None),
            None => {
                // Without an explicit name, the response headers decide it. The
                // response is kept so a fresh transfer streams its body instead of asking twice.
                let (file_name, naming_response) = match ctx.rename_to {
                    Some(name) => (resolve_filename(Some(name), None, ctx.url), None),
                    None => {
                        let response = ctx.client.get(ctx.url, 0, ctx.token).await?;
                        let name = resolve_filename(None, Some(response.headers()), ctx.url);
                        (name, Some(response))
                    }
                };
                let final_path = ctx.directory.join(file_name);
                debug!(path = %final_path.display(), "resolved destination");

                let exists = tokio::fs::try_exists(&final_path)
                    .await
                    .map_err(|e| TransferError::io(&final_path, e))?;
                if exists && !ctx.override_existing {
                    info!(path = %final_path.display(), "destination exists, skipping");
                    return Ok(Step::Skipped(final_path));
                }

                let guard = InFlightGuard::acquire(&final_path).await?;
                let destination = slot.get_or_init(|| Destination {
                    final_path,
                    _guard: guard,
                });
                (destination, naming_response)
            }
        };

        self.attempt(ctx, &destination.final_path, attempt, naming_response)
            .await
            .map(Step::Streamed)
    }

    /// One streaming attempt: plan the offset, request, append to the temp file.
    async fn attempt(
        &self,
        ctx: &AttemptContext<'_>,
        final_path: &Path,
        attempt: u32,
        naming_response: Option<Response>,
    ) -> Result<Attempted, TransferError> {
        let mut state = TransferState::plan(final_path.to_path_buf(), attempt).await?;
        let offset = state.bytes_written;

        let response = match naming_response {
            Some(response) if offset == 0 => {
                debug!("streaming body of the naming response");
                response
            }
            _ => ctx.client.get(ctx.url, offset, ctx.token).await?,
        };
        let status = response.status();
        let headers = response.headers();

        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            let total = content_range(headers).and_then(|range| range.total);
            if offset > 0 && total == Some(offset) {
                info!(offset, "temp file already holds the whole resource");
                state.expected_total_bytes = total;
                return Ok(Attempted {
                    state,
                    resumed: true,
                });
            }
            return Err(TransferError::http_status(ctx.url, status.as_u16(), offset));
        }
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(TransferError::http_status(ctx.url, status.as_u16(), offset));
        }

        let resumed = offset > 0 && status == StatusCode::PARTIAL_CONTENT;
        if resumed
            && let Some(start) = content_range(headers).and_then(|range| range.start)
            && start != offset
        {
            return Err(TransferError::UnexpectedRange {
                url: ctx.url.to_string(),
                requested: offset,
                returned: start,
            });
        }
        if offset > 0 && !resumed {
            warn!(offset, "server ignored Range request, restarting from zero");
            state.bytes_written = 0;
        }
        state.expected_total_bytes = expected_total_bytes(status, headers, state.bytes_written);

        let temp_path = state.temp_path().to_path_buf();
        let file = if resumed {
            OpenOptions::new().append(true).open(&temp_path).await
        } else {
            File::create(&temp_path).await
        }
        .map_err(|e| TransferError::io(&temp_path, e))?;

        info!(
            attempt,
            offset = state.bytes_written,
            total = ?state.expected_total_bytes,
            resumed,
            "streaming to temp file"
        );
        self.report(&state);
        self.stream_to_file(ctx, response, file, &mut state).await?;

        Ok(Attempted { state, resumed })
    }

    /// Appends the body to `file` in `chunk_size` writes.
    ///
    /// Bytes already received are written and flushed before a mid-body
    /// network error is returned, so the next attempt resumes after them.
    async fn stream_to_file(
        &self,
        ctx: &AttemptContext<'_>,
        response: Response,
        mut file: File,
        state: &mut TransferState,
    ) -> Result<(), TransferError> {
        let mut stream = response.bytes_stream();
        let mut buffer = Vec::with_capacity(ctx.chunk_size);

        while let Some(next) = stream.next().await {
            match next {
                Ok(bytes) => {
                    buffer.extend_from_slice(&bytes);
                    if buffer.len() >= ctx.chunk_size {
                        self.write_chunk(&mut file, &mut buffer, state).await?;
                    }
                }
                Err(e) => {
                    self.write_chunk(&mut file, &mut buffer, state).await?;
                    flush(&mut file, state.temp_path()).await?;
                    warn!(offset = state.bytes_written, error = %e, "body interrupted");
                    return Err(TransferError::network(ctx.url, state.bytes_written, e));
                }
            }
        }

        self.write_chunk(&mut file, &mut buffer, state).await?;
        flush(&mut file, state.temp_path()).await?;
        file.sync_all()
            .await
            .map_err(|e| TransferError::io(state.temp_path(), e))?;
        debug!(bytes = state.bytes_written, "body complete");
        Ok(())
    }

    async fn write_chunk(
        &self,
        file: &mut File,
        buffer: &mut Vec<u8>,
        state: &mut TransferState,
    ) -> Result<(), TransferError> {
        if buffer.is_empty() {
            return Ok(());
        }
        file.write_all(buffer)
            .await
            .map_err(|e| TransferError::io(state.temp_path(), e))?;
        state.bytes_written += buffer.len() as u64;
        buffer.clear();
        self.report(state);
        Ok(())
    }

    fn report(&self, state: &TransferState) {
        if let Some(progress) = &self.progress {
            progress(TransferProgress {
                bytes_written: state.bytes_written,
                total_bytes: state.expected_total_bytes,
            });
        }
    }
}

async fn flush(file: &mut File, temp_path: &Path) -> Result<(), TransferError> {
    file.flush()
        .await
        .map_err(|e| TransferError::io(temp_path, e))
}

/// Transfers `request` with a default [`TransferEngine`].
///
/// # Errors
///
/// See [`TransferEngine::transfer`].
pub async fn transfer(request: &TransferRequest) -> Result<TransferOutcome, TransferError> {
    TransferEngine::new().transfer(request).await
}

/// Registration of a final path in [`IN_FLIGHT`], released on drop.
struct InFlightGuard {
    key: PathBuf,
}

impl InFlightGuard {
    async fn acquire(final_path: &Path) -> Result<Self, TransferError> {
        let key = match (final_path.parent(), final_path.file_name()) {
            (Some(parent), Some(name)) => tokio::fs::canonicalize(parent)
                .await
                .map_or_else(|_| final_path.to_path_buf(), |dir| dir.join(name)),
            _ => final_path.to_path_buf(),
        };
        match IN_FLIGHT.entry(key.clone()) {
            Entry::Occupied(_) => Err(TransferError::AlreadyInProgress {
                path: final_path.to_path_buf(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(Self { key })
            }
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        IN_FLIGHT.remove(&self.key);
    }
}
