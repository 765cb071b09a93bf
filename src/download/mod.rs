//! Resumable HTTP(S) transfer of large model files.
//!
//! One transfer moves one remote resource to one local file:
//!
//! - the URL is optionally rewritten to a mirror host ([`MirrorConfig`])
//! - the destination name comes from an override, `Content-Disposition`, or
//!   the URL tail ([`resolve_filename`])
//! - bytes stream into `<final>.tmp`, whose length is the resume offset on the
//!   next attempt ([`TransferState`])
//! - transient failures are retried with a fixed delay ([`RetryPolicy`])
//! - the temp file is size-checked and renamed into place ([`finalize`])
//!
//! # Example
//!
//! ```no_run
//! use model_fetch::download::{TransferRequest, transfer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let request = TransferRequest::new(
//!     "https://huggingface.co/org/repo/resolve/main/model.safetensors",
//!     "./models",
//! );
//! let outcome = transfer(&request).await?;
//! println!("{}", outcome.path().display());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod filename;
mod mirror;
mod request;
mod resume;
mod retry;

pub use client::HttpClient;
pub use engine::{TransferEngine, transfer};
pub use error::TransferError;
pub use filename::resolve_filename;
pub use mirror::MirrorConfig;
pub use request::{ProgressCallback, TransferOutcome, TransferProgress, TransferRequest};
pub use resume::{TransferState, finalize, resume_offset, temp_path_for};
pub use retry::{DEFAULT_MAX_RETRIES, FailureKind, RetryDecision, RetryPolicy, classify_error};
