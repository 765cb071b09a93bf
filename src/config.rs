//! Optional TOML file supplying defaults for the command-line front end.
//!
//! ```toml
//! output_dir = "./models"
//! use_mirror = true
//! max_retries = 5
//! verbosity = "verbose"
//! ```
//!
//! Command-line flags win over file values, file values win over built-in defaults.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// TOML-backed defaults. Every key is optional; unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default destination directory.
    pub output_dir: Option<PathBuf>,
    /// Replace existing files instead of skipping them.
    pub override_existing: Option<bool>,
    /// Rewrite the source host to the mirror.
    pub use_mirror: Option<bool>,
    /// Connect and read deadline in seconds.
    pub timeout_secs: Option<u64>,
    /// Bytes per write to the temp file.
    pub chunk_size_bytes: Option<usize>,
    /// Retries after the first attempt.
    pub max_retries: Option<u32>,
    /// Delay between attempts in seconds.
    pub retry_delay_secs: Option<u64>,
    /// Mirror host, optionally with a port.
    pub mirror_host: Option<String>,
    /// Accept invalid or self-signed TLS certificates.
    pub skip_tls_verify: Option<bool>,
    /// Default log verbosity.
    pub verbosity: Option<Verbosity>,
}

/// Maximum accepted `chunk_size_bytes` (256 MiB).
const MAX_CHUNK_SIZE_BYTES: usize = 256 * 1024 * 1024;

impl FileConfig {
    /// Validates values against the ranges the command line accepts.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first out-of-range key.
    pub fn validate(&self) -> Result<()> {
        validate_range("timeout_secs", self.timeout_secs, 1..=3600)?;
        validate_range("retry_delay_secs", self.retry_delay_secs, 0..=3600)?;
        validate_range("max_retries", self.max_retries, 0..=100)?;
        validate_range(
            "chunk_size_bytes",
            self.chunk_size_bytes,
            1..=MAX_CHUNK_SIZE_BYTES,
        )?;
        if let Some(host) = &self.mirror_host
            && host.trim().is_empty()
        {
            bail!("Invalid config value for `mirror_host`: must not be empty");
        }
        Ok(())
    }
}

fn validate_range<T>(field: &str, value: Option<T>, range: std::ops::RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    let Some(value) = value else {
        return Ok(());
    };
    if !range.contains(&value) {
        bail!(
            "Invalid config value for `{field}`: {value}. Expected range: {}..={}",
            range.start(),
            range.end()
        );
    }
    Ok(())
}

/// Log verbosity selectable from the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl Verbosity {
    /// `EnvFilter` directive for this verbosity.
    #[must_use]
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/model-fetch/config.toml`
/// 2. `$HOME/.config/model-fetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(
        env_var_non_empty_os("XDG_CONFIG_HOME"),
        env_var_non_empty_os("HOME"),
    )
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg) = xdg_config_home {
        return Some(PathBuf::from(xdg).join("model-fetch").join("config.toml"));
    }
    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("model-fetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    env::var_os(name).filter(|value| !value.is_empty())
}

/// Loads configuration.
///
/// An explicit path must exist. Without one, the default path is used when the
/// file is present and `None` is returned otherwise.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, contains
/// unknown keys, or holds out-of-range values.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match resolve_default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(None),
        },
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config = parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    Ok(Some(config))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config_str(
            r#"
output_dir = "/data/models"
override_existing = false
use_mirror = true
timeout_secs = 60
chunk_size_bytes = 65536
max_retries = 5
retry_delay_secs = 2
mirror_host = "mirror.internal:8443"
skip_tls_verify = true
verbosity = "quiet"
"#,
        )
        .unwrap();

        assert_eq!(config.output_dir, Some(PathBuf::from("/data/models")));
        assert_eq!(config.override_existing, Some(false));
        assert_eq!(config.use_mirror, Some(true));
        assert_eq!(config.timeout_secs, Some(60));
        assert_eq!(config.chunk_size_bytes, Some(65536));
        assert_eq!(config.max_retries, Some(5));
        assert_eq!(config.retry_delay_secs, Some(2));
        assert_eq!(config.mirror_host.as_deref(), Some("mirror.internal:8443"));
        assert_eq!(config.skip_tls_verify, Some(true));
        assert_eq!(config.verbosity, Some(Verbosity::Quiet));
    }

    #[test]
    fn test_empty_config_is_all_defaults() {
        assert_eq!(parse_config_str("").unwrap(), FileConfig::default());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = parse_config_str("concurrency = 4").unwrap_err();
        assert!(format!("{err:#}").contains("concurrency"), "got: {err:#}");
    }

    #[test]
    fn test_out_of_range_timeout_is_rejected() {
        let err = parse_config_str("timeout_secs = 0").unwrap_err();
        assert!(err.to_string().contains("timeout_secs"), "got: {err}");
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        assert!(parse_config_str("chunk_size_bytes = 0").is_err());
    }

    #[test]
    fn test_blank_mirror_host_is_rejected() {
        assert!(parse_config_str(r#"mirror_host = "  ""#).is_err());
    }

    #[test]
    fn test_unknown_verbosity_is_rejected() {
        assert!(parse_config_str(r#"verbosity = "loud""#).is_err());
    }

    #[test]
    fn test_config_path_prefers_xdg() {
        let path = config_path_from(Some("/xdg".into()), Some("/home/u".into())).unwrap();
        assert_eq!(path, PathBuf::from("/xdg/model-fetch/config.toml"));
    }

    #[test]
    fn test_config_path_falls_back_to_home() {
        let path = config_path_from(None, Some("/home/u".into())).unwrap();
        assert_eq!(path, PathBuf::from("/home/u/.config/model-fetch/config.toml"));
        assert_eq!(config_path_from(None, None), None);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "use_mirror = true\n").unwrap();

        let config = load_file_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.use_mirror, Some(true));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = TempDir::new().unwrap();
        let err = load_file_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"), "got: {err}");
    }

    #[test]
    fn test_verbosity_filter_directives() {
        assert_eq!(Verbosity::Default.filter_directive(), "info");
        assert_eq!(Verbosity::Verbose.filter_directive(), "debug");
        assert_eq!(Verbosity::Quiet.filter_directive(), "error");
        assert_eq!(Verbosity::Debug.filter_directive(), "trace");
    }
}
