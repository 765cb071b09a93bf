//! Destination file name resolution.
//!
//! Priority: explicit override, then the `Content-Disposition` header, then
//! the final URL path segment, then [`FALLBACK_FILENAME`].

use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};
use tracing::debug;
use url::Url;

use super::constants::FALLBACK_FILENAME;

/// Quoted `filename="X"` parameter of a Content-Disposition header.
#[allow(clippy::expect_used)]
static QUOTED_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"filename="(.+?)""#).expect("filename regex is valid")
});

/// Resolves the destination file name.
///
/// `rename_to` wins outright when non-empty and `headers` are never consulted.
/// The result is always a single, non-empty path segment.
#[must_use]
pub fn resolve_filename(rename_to: Option<&str>, headers: Option<&HeaderMap>, url: &str) -> String {
    if let Some(name) = rename_to.map(str::trim).filter(|name| !name.is_empty()) {
        return finish(sanitize_filename(name));
    }

    if let Some(name) = headers
        .and_then(|headers| headers.get(CONTENT_DISPOSITION))
        .and_then(|value| value.to_str().ok())
        .and_then(parse_content_disposition)
    {
        debug!(filename = %name, "using Content-Disposition filename");
        return finish(sanitize_filename(&name));
    }

    finish(filename_from_url(url).unwrap_or_default())
}

fn finish(name: String) -> String {
    if name.trim_matches('_').is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        name
    }
}

/// Parses a Content-Disposition header to extract the file name.
///
/// Handles:
/// - `attachment; filename*=UTF-8''example%20file.bin` (RFC 5987, preferred)
/// - `attachment; filename="example.bin"`
/// - `attachment; filename=example.bin`
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(captures) = QUOTED_FILENAME.captures(header) {
        return captures.get(1).map(|m| m.as_str().to_string());
    }

    let pos = header.find("filename=")?;
    let value = header[pos + 9..].trim();
    let end = value.find(';').unwrap_or(value.len());
    let filename = value[..end].trim();
    (!filename.is_empty() && !filename.starts_with('"')).then(|| filename.to_string())
}

/// Last non-empty URL path segment, percent-decoded and sanitized.
pub(crate) fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).unwrap_or_else(|e| {
        debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
        last.into()
    });
    Some(sanitize_filename(&decoded))
}

/// Sanitizes a file name for filesystem safety.
///
/// Replaces characters invalid on common filesystems (`/ \ : * ? " < > |`) and
/// control characters; dot-only names are rewritten so they cannot address
/// the current or parent directory.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
