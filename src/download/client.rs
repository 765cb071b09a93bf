//! HTTP request/response plumbing for transfers.
//!
//! [`HttpClient`] issues plain or byte-range GETs and maps transport failures
//! and unexpected statuses into [`TransferError`]. The header helpers read
//! `Content-Length` and `Content-Range` into the sizes the engine verifies.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument};

use super::TransferError;
use crate::user_agent;

/// HTTP client configured with a per-request connect and read deadline.
///
/// The deadline applies to establishing the connection and to each read of
/// the body, never to the body as a whole, so large files are not cut off.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with `timeout` as both connect and read deadline.
    ///
    /// With `accept_invalid_certs`, TLS certificates are not verified, which
    /// self-hosted mirrors with self-signed certificates need.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Self {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .user_agent(user_agent::default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Issues a GET, adding `Range: bytes=<offset>-` when `offset > 0` and a
    /// bearer header when `auth_token` is present.
    ///
    /// Returns the response for 2xx and 416 answers; the caller decides what
    /// a 416 means for the temp file.
    ///
    /// # Errors
    ///
    /// [`TransferError::Network`]/[`TransferError::Timeout`] for transport
    /// failures, [`TransferError::HttpStatus`] for any other status.
    #[instrument(level = "debug", skip(self, auth_token), fields(authenticated = auth_token.is_some()))]
    pub async fn get(
        &self,
        url: &str,
        offset: u64,
        auth_token: Option<&str>,
    ) -> Result<Response, TransferError> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        if let Some(token) = auth_token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransferError::network(url, offset, e))?;

        let status = response.status();
        debug!(status = status.as_u16(), "response received");
        if status.is_success() || status == StatusCode::RANGE_NOT_SATISFIABLE {
            Ok(response)
        } else {
            Err(TransferError::http_status(url, status.as_u16(), offset))
        }
    }
}

/// Parsed `Content-Range: bytes <start>-<end>/<total>` (or `bytes */<total>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentRange {
    /// First byte of the returned span; `None` for the unsatisfied form.
    pub(crate) start: Option<u64>,
    /// Entity size; `None` when the server sent `*`.
    pub(crate) total: Option<u64>,
}

pub(crate) fn parse_content_range(value: &str) -> Option<ContentRange> {
    let spec = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = spec.split_once('/')?;
    let total = match total.trim() {
        "*" => None,
        digits => Some(digits.parse::<u64>().ok()?),
    };
    let start = match span.trim() {
        "*" => None,
        span => {
            let (start, end) = span.split_once('-')?;
            let start = start.trim().parse::<u64>().ok()?;
            let end = end.trim().parse::<u64>().ok()?;
            if end < start {
                return None;
            }
            Some(start)
        }
    };
    Some(ContentRange { start, total })
}

pub(crate) fn content_range(headers: &HeaderMap) -> Option<ContentRange> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}

pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Total entity size implied by a 200 or 206 response.
///
/// Fresh transfers use `Content-Length`. Resumed transfers use the
/// `Content-Range` total, falling back to `offset + Content-Length`.
pub(crate) fn expected_total_bytes(status: StatusCode, headers: &HeaderMap, offset: u64) -> Option<u64> {
    if status == StatusCode::PARTIAL_CONTENT {
        content_range(headers)
            .and_then(|range| range.total)
            .or_else(|| content_length(headers).map(|remaining| offset.saturating_add(remaining)))
    } else {
        content_length(headers)
    }
}
