//! Resume planning and finalization of the temp file.
//!
//! The temp file's length is the only checkpoint: there is no sidecar record,
//! so whatever bytes are on disk are taken as a correct prefix of the entity.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::TransferError;
use super::constants::TEMP_SUFFIX;

/// Mutable state of one transfer, shared by every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferState {
    final_path: PathBuf,
    temp_path: PathBuf,
    pub(crate) bytes_written: u64,
    pub(crate) expected_total_bytes: Option<u64>,
    pub(crate) attempt: u32,
}

impl TransferState {
    /// Creates state for a transfer whose result lands at `final_path`.
    #[must_use]
    pub fn new(final_path: PathBuf) -> Self {
        Self {
            temp_path: temp_path_for(&final_path),
            final_path,
            bytes_written: 0,
            expected_total_bytes: None,
            attempt: 0,
        }
    }

    /// Final destination path.
    #[must_use]
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// In-flight temp file path (`<final>.tmp`).
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Bytes currently in the temp file.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Total size advertised by the server, when known.
    #[must_use]
    pub fn expected_total_bytes(&self) -> Option<u64> {
        self.expected_total_bytes
    }

    /// Plans attempt number `attempt`: reads the temp file length as the
    /// offset to request from.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Io`] when the temp file exists but cannot be inspected.
    pub async fn plan(final_path: PathBuf, attempt: u32) -> Result<Self, TransferError> {
        let mut state = Self::new(final_path);
        state.attempt = attempt;
        state.bytes_written = resume_offset(&state.temp_path).await?;
        debug!(
            attempt,
            offset = state.bytes_written,
            temp = %state.temp_path.display(),
            "planned attempt"
        );
        Ok(state)
    }

    /// 1-indexed attempt this state was planned for.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Returns `<final_path>.tmp`.
#[must_use]
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = OsString::from(final_path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Byte offset to resume from: the temp file's length, or 0 when absent.
///
/// # Errors
///
/// Returns [`TransferError::Io`] for any metadata failure other than not-found.
pub async fn resume_offset(temp_path: &Path) -> Result<u64, TransferError> {
    match tokio::fs::metadata(temp_path).await {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(TransferError::io(
            temp_path,
            std::io::Error::other("temp path exists but is not a regular file"),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(TransferError::io(temp_path, e)),
    }
}

/// Verifies the temp file against the advertised size and renames it into place.
///
/// On a size mismatch the temp file is deleted, since its contents cannot be
/// trusted for a later resume either.
///
/// # Errors
///
/// Returns [`TransferError::Integrity`] on mismatch, [`TransferError::Io`] if
/// the temp file cannot be inspected or renamed.
pub async fn finalize(state: &TransferState) -> Result<u64, TransferError> {
    let temp_path = state.temp_path();
    let actual = tokio::fs::metadata(temp_path)
        .await
        .map_err(|e| TransferError::io(temp_path, e))?
        .len();

    if let Some(expected) = state.expected_total_bytes
        && expected != actual
    {
        warn!(
            temp = %temp_path.display(),
            expected,
            actual,
            "size mismatch, discarding temp file"
        );
        discard(temp_path).await;
        return Err(TransferError::integrity(temp_path, expected, actual));
    }

    tokio::fs::rename(temp_path, state.final_path())
        .await
        .map_err(|e| TransferError::io(state.final_path(), e))?;

    info!(path = %state.final_path().display(), bytes = actual, "transfer finalized");
    Ok(actual)
}

/// Best-effort removal of a temp file.
pub async fn discard(temp_path: &Path) {
    match tokio::fs::remove_file(temp_path).await {
        Ok(()) => debug!(temp = %temp_path.display(), "removed temp file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(temp = %temp_path.display(), error = %e, "failed to remove temp file"),
    }
}
