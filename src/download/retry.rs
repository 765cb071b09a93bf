//! Retry policy with a fixed inter-attempt delay for transient transfer failures.
//!
//! Failures are classified once, by [`classify_error`], into a [`FailureKind`].
//! The retry loop in [`RetryPolicy::run`] consumes only that kind, so a new
//! transient cause is added by extending the classification, never the loop.
//!
//! ```text
//! Attempting --success--------------------------> Done
//! Attempting --transient, budget left-----------> Waiting(delay) -> Attempting
//! Attempting --transient, budget spent----------> Failed(exhausted)
//! Attempting --fatal----------------------------> Failed(fatal)
//! ```
//!
//! # Example
//!
//! ```
//! use model_fetch::download::{FailureKind, RetryDecision, RetryPolicy, TransferError, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = TransferError::http_status("https://example.com/model.bin", 503, 0);
//! assert_eq!(classify_error(&error), FailureKind::Transient);
//! assert!(matches!(policy.should_retry(FailureKind::Transient, 1), RetryDecision::Retry { .. }));
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::TransferError;
use super::constants::DEFAULT_RETRY_DELAY;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Classification of transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Expected to succeed on retry without changing the request.
    ///
    /// Examples: timeout, connection reset, 5xx, 408, 429.
    Transient,

    /// The caller must change something before trying again.
    ///
    /// Examples: 404, 401, integrity mismatch, disk full, invalid URL.
    Fatal,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// The attempt number about to run (1-indexed, so the first retry is attempt 2).
        attempt: u32,
    },

    /// Stop retrying.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Bounded retry with a fixed delay between attempts.
///
/// `max_retries` counts retries *after* the first attempt, so a persistently
/// transient failure produces `max_retries + 1` attempts in total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given retry budget and fixed delay.
    #[must_use]
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Returns the number of retries allowed after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the fixed inter-attempt delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decides whether to retry after `attempt` (1-indexed) failed with `kind`.
    #[instrument(level = "trace", skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        if kind == FailureKind::Fatal {
            return RetryDecision::DoNotRetry {
                reason: "fatal failure - retry would not help".to_string(),
            };
        }

        if attempt > self.max_retries {
            debug!(attempt, max_retries = self.max_retries, "retry budget spent");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        RetryDecision::Retry {
            delay: self.delay,
            attempt: attempt + 1,
        }
    }

    /// Runs `operation` until it succeeds, fails fatally, or the budget is spent.
    ///
    /// `operation` receives the 1-indexed attempt number. Fatal errors are
    /// returned unchanged; an exhausted budget wraps the last transient error
    /// in [`TransferError::RetriesExhausted`].
    ///
    /// # Errors
    ///
    /// Returns the fatal error, or [`TransferError::RetriesExhausted`].
    #[instrument(level = "debug", skip(self, operation), fields(max_retries = self.max_retries))]
    pub async fn run<T, F, Fut>(&self, url: &str, mut operation: F) -> Result<T, TransferError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "starting attempt");

            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            let kind = classify_error(&error);

            match self.should_retry(kind, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    warn!(
                        url,
                        attempt = next_attempt,
                        max_attempts = self.max_retries.saturating_add(1),
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying transfer"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url, %reason, "not retrying transfer");
                    return Err(match kind {
                        FailureKind::Fatal => error,
                        FailureKind::Transient => TransferError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            source: Box::new(error),
                        },
                    });
                }
            }
        }
    }
}

/// Classifies a transfer error for retry decisions.
///
/// | Error | Kind |
/// |-------|------|
/// | Timeout | Transient |
/// | Network (most) | Transient |
/// | Network (TLS/certificate) | Fatal |
/// | HTTP 408, 429, 5xx | Transient |
/// | HTTP other 4xx, other | Fatal |
/// | Integrity, Io, InvalidUrl, UnexpectedRange, AlreadyInProgress | Fatal |
#[must_use]
pub fn classify_error(error: &TransferError) -> FailureKind {
    match error {
        TransferError::HttpStatus { status, .. } => classify_http_status(*status),

        TransferError::Timeout { .. } => FailureKind::Transient,

        TransferError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureKind::Fatal
            } else {
                FailureKind::Transient
            }
        }

        TransferError::Io { .. }
        | TransferError::InvalidUrl { .. }
        | TransferError::Integrity { .. }
        | TransferError::UnexpectedRange { .. }
        | TransferError::AlreadyInProgress { .. }
        | TransferError::RetriesExhausted { .. } => FailureKind::Fatal,
    }
}

#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureKind {
    match status {
        408 => FailureKind::Transient, // Request Timeout
        429 => FailureKind::Transient, // Too Many Requests
        status if (500..600).contains(&status) => FailureKind::Transient,
        status if (400..500).contains(&status) => FailureKind::Fatal,
        _ => FailureKind::Fatal,
    }
}

/// Certificate and handshake failures will not fix themselves between attempts.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut message = error.to_string().to_lowercase();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        message.push(' ');
        message.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }
    message.contains("certificate") || message.contains("tls") || message.contains("handshake")
}
