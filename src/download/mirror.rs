//! Mirror rewriting and authenticated-host matching.
//!
//! Both operations are pure: they inspect a URL and return a value without
//! touching the network.

use tracing::debug;
use url::Url;

use super::constants::{DEFAULT_MIRROR_HOST, DEFAULT_SOURCE_HOST};

/// Known source host, its mirror, and the hosts that accept a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    source_host: String,
    mirror_host: String,
    mirror_port: Option<u16>,
    auth_hosts: Vec<String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_HOST, DEFAULT_MIRROR_HOST)
    }
}

impl MirrorConfig {
    /// Creates a config rewriting `source_host` to `mirror`.
    ///
    /// `mirror` is a host optionally followed by `:port`. Both hosts are
    /// registered as authenticated hosts.
    #[must_use]
    pub fn new(source_host: &str, mirror: &str) -> Self {
        let (mirror_host, mirror_port) = split_host_port(mirror);
        let source_host = source_host.trim().to_ascii_lowercase();
        Self {
            auth_hosts: vec![source_host.clone(), mirror_host.clone()],
            source_host,
            mirror_host,
            mirror_port,
        }
    }

    /// Replaces the set of hosts that receive the bearer token.
    #[must_use]
    pub fn with_auth_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.auth_hosts = hosts
            .into_iter()
            .map(|host| host.as_ref().trim().to_ascii_lowercase())
            .collect();
        self
    }

    /// The host that gets rewritten.
    #[must_use]
    pub fn source_host(&self) -> &str {
        &self.source_host
    }

    /// The host substituted for [`source_host`](Self::source_host).
    #[must_use]
    pub fn mirror_host(&self) -> &str {
        &self.mirror_host
    }

    /// Rewrites `url` to the mirror when enabled and its host is exactly the source host.
    ///
    /// Any other URL, including unparsable ones, is returned byte-for-byte.
    #[must_use]
    pub fn rewrite(&self, url: &str, use_mirror: bool) -> String {
        if !use_mirror {
            return url.to_string();
        }
        let Ok(mut parsed) = Url::parse(url) else {
            return url.to_string();
        };
        if !parsed
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(&self.source_host))
        {
            return url.to_string();
        }

        if parsed.set_host(Some(&self.mirror_host)).is_err()
            || parsed.set_port(self.mirror_port).is_err()
        {
            return url.to_string();
        }
        let rewritten = parsed.to_string();
        debug!(from = url, to = %rewritten, "rewrote URL to mirror");
        rewritten
    }

    /// Returns true when `url` points at a host that should receive the token.
    #[must_use]
    pub fn requires_auth(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|host| self.auth_hosts.iter().any(|known| *known == host))
    }
}

fn split_host_port(value: &str) -> (String, Option<u16>) {
    let value = value.trim().trim_end_matches('/');
    let value = value
        .split_once("://")
        .map_or(value, |(_, rest)| rest)
        .to_ascii_lowercase();
    match value.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), Some(port)),
            Err(_) => (value, None),
        },
        _ => (value, None),
    }
}
