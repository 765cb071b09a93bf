//! Resumable model-weight downloader.
//!
//! Transfers large files (model checkpoints, tokenizers, weights) over
//! HTTP(S) into a local directory. Interrupted transfers continue from the
//! bytes already on disk, transient network failures are retried, and the
//! final file only appears once its size has been verified.
//!
//! # Architecture
//!
//! - [`download`] - mirror rewriting, name resolution, resume, retry, and the transfer engine
//! - [`config`] - optional TOML defaults for the command-line front end

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{FileConfig, Verbosity, load_file_config, resolve_default_config_path};
pub use download::{
    DEFAULT_MAX_RETRIES, FailureKind, MirrorConfig, ProgressCallback, RetryDecision, RetryPolicy,
    TransferEngine, TransferError, TransferOutcome, TransferProgress, TransferRequest,
    classify_error, resolve_filename, transfer,
};
