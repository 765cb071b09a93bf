//! Transfer request, outcome, and progress types.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::constants::{DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT_SECS};
use super::retry::{DEFAULT_MAX_RETRIES, RetryPolicy};

/// One caller-supplied transfer, immutable for the life of the transfer.
///
/// ```
/// use model_fetch::download::TransferRequest;
///
/// let request = TransferRequest::new(
///     "https://huggingface.co/org/repo/resolve/main/model.safetensors",
///     "./models/checkpoints",
/// )
/// .with_mirror(true)
/// .with_override_existing(false);
/// assert_eq!(request.max_retries, 3);
/// ```
#[derive(Clone)]
pub struct TransferRequest {
    /// Original URL, before mirror rewriting.
    pub source_url: String,
    /// Directory the final file is written to; created if missing.
    pub destination_directory: PathBuf,
    /// When false and the final file exists, the transfer is skipped.
    pub override_existing: bool,
    /// Rewrite the known source host to its mirror.
    pub use_mirror: bool,
    /// Explicit destination file name.
    pub rename_to: Option<String>,
    /// Bearer token, sent only to authenticated hosts.
    pub auth_token: Option<String>,
    /// Per-request connect and read deadline.
    pub timeout: Duration,
    /// Size of each write to the temp file.
    pub chunk_size_bytes: usize,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Accept invalid or self-signed TLS certificates.
    pub skip_tls_verify: bool,
}

impl TransferRequest {
    /// Creates a request with default tunables (30s, 1 MiB, 3 retries, 5s).
    #[must_use]
    pub fn new(source_url: impl Into<String>, destination_directory: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            destination_directory: destination_directory.into(),
            override_existing: true,
            use_mirror: false,
            rename_to: None,
            auth_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            skip_tls_verify: false,
        }
    }

    /// Replace (`true`) or skip (`false`) an existing final file.
    #[must_use]
    pub fn with_override_existing(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    /// Enables mirror rewriting of the source host.
    #[must_use]
    pub fn with_mirror(mut self, use_mirror: bool) -> Self {
        self.use_mirror = use_mirror;
        self
    }

    /// Empty names are treated as absent.
    #[must_use]
    pub fn with_rename_to(mut self, rename_to: Option<String>) -> Self {
        self.rename_to = rename_to.filter(|name| !name.trim().is_empty());
        self
    }

    /// Empty tokens are treated as absent.
    #[must_use]
    pub fn with_auth_token(mut self, auth_token: Option<String>) -> Self {
        self.auth_token = auth_token.filter(|token| !token.trim().is_empty());
        self
    }

    /// Sets the per-request connect and read deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Values below one byte are clamped to one.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size_bytes: usize) -> Self {
        self.chunk_size_bytes = chunk_size_bytes.max(1);
        self
    }

    /// Sets the number of retries after the first attempt.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the fixed delay between attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Disables TLS certificate verification, for mirrors with self-signed certificates.
    #[must_use]
    pub fn with_skip_tls_verify(mut self, skip_tls_verify: bool) -> Self {
        self.skip_tls_verify = skip_tls_verify;
        self
    }

    /// Retry policy described by this request's tunables.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }
}

/// Redacts the auth token.
impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("source_url", &self.source_url)
            .field("destination_directory", &self.destination_directory)
            .field("override_existing", &self.override_existing)
            .field("use_mirror", &self.use_mirror)
            .field("rename_to", &self.rename_to)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("chunk_size_bytes", &self.chunk_size_bytes)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("skip_tls_verify", &self.skip_tls_verify)
            .finish()
    }
}

/// Result of a transfer that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// The final file already existed and overriding was disabled.
    Skipped {
        /// The existing final path, left untouched.
        path: PathBuf,
    },
    /// The file was transferred and promoted to its final path.
    Downloaded {
        /// Final path.
        path: PathBuf,
        /// Size of the final file.
        bytes: u64,
        /// True when at least one attempt continued an existing temp file.
        resumed: bool,
    },
}

impl TransferOutcome {
    /// Final path of the file, whether freshly written or pre-existing.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Skipped { path } | Self::Downloaded { path, .. } => path,
        }
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped { path } => {
                write!(f, "skipped: {} already exists", path.display())
            }
            Self::Downloaded {
                path,
                bytes,
                resumed,
            } => {
                write!(f, "downloaded {} ({bytes} bytes", path.display())?;
                if *resumed {
                    write!(f, ", resumed")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Snapshot passed to the progress callback after every chunk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Cumulative bytes in the temp file, including resumed bytes.
    pub bytes_written: u64,
    /// Total size when the server advertised it.
    pub total_bytes: Option<u64>,
}

/// Progress callback shared across attempts.
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;
