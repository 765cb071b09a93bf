//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;

use model_fetch::download::constants::{
    DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_MIRROR_HOST, DEFAULT_RETRY_DELAY, DEFAULT_SOURCE_HOST,
    DEFAULT_TIMEOUT_SECS,
};
use model_fetch::{DEFAULT_MAX_RETRIES, FileConfig, MirrorConfig, TransferRequest, Verbosity};

/// Download large model files over HTTP(S), resuming interrupted transfers.
///
/// Partial data is kept in `<name>.tmp` next to the destination; re-running
/// the same command continues where the last run stopped.
#[derive(Parser, Debug)]
#[command(name = "model-fetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download, transferred one after another
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Destination directory (created if missing) [default: .]
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Explicit destination file name (single URL only)
    #[arg(long, value_name = "NAME")]
    pub rename_to: Option<String>,

    /// Skip URLs whose destination file already exists
    #[arg(long)]
    pub no_override: bool,

    /// Rewrite the source host to the mirror host
    #[arg(long, conflicts_with = "no_mirror")]
    pub mirror: bool,

    /// Never rewrite to the mirror, even if the config file enables it
    #[arg(long)]
    pub no_mirror: bool,

    /// Mirror host, optionally with a port [default: hf-mirror.com]
    #[arg(long, value_name = "HOST")]
    pub mirror_host: Option<String>,

    /// Bearer token sent to the source and mirror hosts
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Accept invalid or self-signed TLS certificates (self-hosted mirrors)
    #[arg(long)]
    pub skip_tls_verify: bool,

    /// Connect and read timeout in seconds (1-3600) [default: 30]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Bytes per write to the temp file [default: 1048576]
    #[arg(long, value_name = "BYTES", value_parser = parse_chunk_size)]
    pub chunk_size: Option<usize>,

    /// Retries after the first attempt for transient failures (0-100) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(0..=100))]
    pub max_retries: Option<u32>,

    /// Seconds to wait between attempts (0-3600) [default: 5]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(0..=3600))]
    pub retry_delay: Option<u64>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file [default: $XDG_CONFIG_HOME/model-fetch/config.toml]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print one JSON object per transfer instead of a human-readable line
    #[arg(long)]
    pub json: bool,
}

fn parse_chunk_size(raw: &str) -> Result<usize, String> {
    let value: usize = raw
        .parse()
        .map_err(|e| format!("invalid chunk size '{raw}': {e}"))?;
    if value == 0 {
        return Err("chunk size must be at least 1 byte".to_string());
    }
    Ok(value)
}

/// Effective settings after merging the command line over the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub override_existing: bool,
    pub use_mirror: bool,
    pub mirror_host: String,
    pub timeout: Duration,
    pub chunk_size_bytes: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub skip_tls_verify: bool,
    pub verbosity: Verbosity,
}

impl Settings {
    /// Merges `args` over `file`, falling back to built-in defaults.
    pub fn resolve(args: &Args, file: Option<&FileConfig>) -> Result<Self> {
        if args.rename_to.is_some() && args.urls.len() > 1 {
            bail!("--rename-to can only be used with a single URL");
        }
        let file = file.cloned().unwrap_or_default();

        let use_mirror = if args.mirror {
            true
        } else if args.no_mirror {
            false
        } else {
            file.use_mirror.unwrap_or(false)
        };

        let verbosity = if args.quiet {
            Verbosity::Quiet
        } else {
            match args.verbose {
                0 => file.verbosity.unwrap_or(Verbosity::Default),
                1 => Verbosity::Verbose,
                _ => Verbosity::Debug,
            }
        };

        Ok(Self {
            output_dir: args
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            override_existing: !args.no_override && file.override_existing.unwrap_or(true),
            use_mirror,
            mirror_host: args
                .mirror_host
                .clone()
                .or(file.mirror_host)
                .unwrap_or_else(|| DEFAULT_MIRROR_HOST.to_string()),
            timeout: Duration::from_secs(
                args.timeout
                    .or(file.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            chunk_size_bytes: args
                .chunk_size
                .or(file.chunk_size_bytes)
                .unwrap_or(DEFAULT_CHUNK_SIZE_BYTES),
            max_retries: args
                .max_retries
                .or(file.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: args
                .retry_delay
                .or(file.retry_delay_secs)
                .map_or(DEFAULT_RETRY_DELAY, Duration::from_secs),
            skip_tls_verify: args.skip_tls_verify || file.skip_tls_verify.unwrap_or(false),
            verbosity,
        })
    }

    /// Mirror configuration for the engine.
    pub fn mirror_config(&self) -> MirrorConfig {
        MirrorConfig::new(DEFAULT_SOURCE_HOST, &self.mirror_host)
    }

    /// Builds the request for one URL.
    pub fn request_for(&self, url: &str, args: &Args) -> TransferRequest {
        TransferRequest::new(url, self.output_dir.clone())
            .with_override_existing(self.override_existing)
            .with_mirror(self.use_mirror)
            .with_rename_to(args.rename_to.clone())
            .with_auth_token(args.token.clone())
            .with_timeout(self.timeout)
            .with_chunk_size(self.chunk_size_bytes)
            .with_max_retries(self.max_retries)
            .with_retry_delay(self.retry_delay)
            .with_skip_tls_verify(self.skip_tls_verify)
    }
}
