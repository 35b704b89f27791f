// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use dbmirror::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose decides what the crate reports
    let default_level = if cli.verbose { "dbmirror=info" } else { "dbmirror=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = cli.into_config();
    let source = config.source_url.clone();
    let destination = config.destination_dir.clone();

    let report = dbmirror::run(config)
        .with_context(|| format!("Failed to mirror {} into {}", source, destination.display()))?;

    if report.fetched.is_empty() {
        println!("Up to date: {} databases unchanged", report.skipped.len());
    } else {
        println!(
            "Fetched {} databases ({} bytes), {} unchanged",
            report.fetched.len(),
            report.bytes_written,
            report.skipped.len()
        );
    }

    Ok(())
}
