//! CLI entry point for model-fetch.

use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use model_fetch::{TransferEngine, TransferOutcome, TransferProgress, load_file_config};
use tracing::{debug, error, info};

mod cli;

use cli::{Args, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let file_config = load_file_config(args.config.as_deref())?;
    let settings = Settings::resolve(&args, file_config.as_ref())?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config file > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.verbosity.filter_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(urls = args.urls.len(), ?settings, "CLI arguments resolved");

    let show_progress = !args.json && !args.quiet && io::stderr().is_terminal();
    let base_engine = TransferEngine::new().with_mirror_config(settings.mirror_config());

    let mut failed = 0usize;
    for url in &args.urls {
        let request = settings.request_for(url, &args);
        let bar = show_progress.then(new_progress_bar);
        let engine = match &bar {
            Some(bar) => base_engine.clone().with_progress(progress_callback(bar.clone())),
            None => base_engine.clone(),
        };

        let result = engine.transfer(&request).await;
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }

        match result {
            Ok(outcome) => print_outcome(&outcome, args.json)?,
            Err(e) => {
                failed += 1;
                error!(url = %url, error = %e, "transfer failed");
                if args.json {
                    let line = serde_json::json!({
                        "status": "failed",
                        "url": url,
                        "error": e.to_string(),
                    });
                    println!("{line}");
                }
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} transfers failed", args.urls.len());
    }
    info!(count = args.urls.len(), "all transfers complete");
    Ok(())
}

fn print_outcome(outcome: &TransferOutcome, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(outcome).context("Failed to serialize transfer outcome")?;
        println!("{line}");
    } else {
        println!("{outcome}");
    }
    Ok(())
}

fn new_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

fn progress_callback(bar: ProgressBar) -> model_fetch::ProgressCallback {
    Arc::new(move |progress: TransferProgress| {
        if let Some(total) = progress.total_bytes {
            bar.set_length(total);
        }
        bar.set_position(progress.bytes_written);
    })
}
