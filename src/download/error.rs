//! Error types for the transfer engine.
//!
//! Every variant carries enough context (URL, path, byte offset, HTTP status)
//! to diagnose a failure without re-running with verbose logging.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring a file.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network-level error (DNS, connection refused or reset, body cut short).
    #[error("network error downloading {url} at byte offset {offset}: {source}")]
    Network {
        /// The URL being transferred.
        url: String,
        /// Bytes present in the temp file when the error occurred.
        offset: u64,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Connect or read deadline elapsed.
    #[error("timeout downloading {url} at byte offset {offset}")]
    Timeout {
        /// The URL being transferred.
        url: String,
        /// Bytes present in the temp file when the deadline elapsed.
        offset: u64,
    },

    /// Server answered with a status other than 200/206.
    #[error("HTTP {status} downloading {url} (requested from byte offset {offset})")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// Byte offset the request asked for.
        offset: u64,
    },

    /// A 206 response started at a different offset than requested.
    #[error("server returned range starting at {returned} for {url}, requested {requested}")]
    UnexpectedRange {
        /// The URL being transferred.
        url: String,
        /// Offset sent in the `Range` header.
        requested: u64,
        /// Start offset reported by `Content-Range`.
        returned: u64,
    },

    /// File system error (create, write, rename, permission, disk full).
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Transferred size does not match the size the server advertised.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Temp file that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// Another transfer in this process already targets the same final path.
    #[error("a transfer to {path} is already in progress")]
    AlreadyInProgress {
        /// The contested final path.
        path: PathBuf,
    },

    /// Transient failures persisted past the retry budget.
    #[error("giving up on {url} after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// The URL being transferred.
        url: String,
        /// Total attempts made, including the first.
        attempts: u32,
        /// The last transient error observed.
        #[source]
        source: Box<TransferError>,
    },
}

impl TransferError {
    /// Creates a network error, promoting reqwest timeouts to [`TransferError::Timeout`].
    pub fn network(url: impl Into<String>, offset: u64, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::timeout(url, offset);
        }
        Self::Network {
            url: url.into(),
            offset,
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>, offset: u64) -> Self {
        Self::Timeout {
            url: url.into(),
            offset,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16, offset: u64) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            offset,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Returns the HTTP status carried by this error, looking through
    /// [`TransferError::RetriesExhausted`].
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }
}
