//! Warden CLI
//!
//! Validates files from disk the way uploads are validated and prints the
//! batch summary as JSON. Exits with status 1 when any file is rejected.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use warden_files::{DiskFile, FileSource};
use warden_service::{SecurityConfig, SecurityService};

#[derive(Debug, Parser)]
#[command(name = "warden")]
#[command(about = "Validate files the way uploads are validated", long_about = None)]
struct Args {
    /// JSON security configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report every error per file instead of stopping at the first
    #[arg(long)]
    strict: bool,

    /// Files to validate
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SecurityConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => SecurityConfig::default(),
    };
    if args.strict {
        config = config.with_strict_uploads(true);
    }

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let service = SecurityService::new(config).context("invalid security configuration")?;

    let mut files = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let file = DiskFile::open(path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        files.push(file);
    }
    let sources: Vec<&dyn FileSource> = files.iter().map(|f| f as &dyn FileSource).collect();

    let summary = service.validate_files(&sources).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.is_valid() {
        info!(files = summary.valid_count, "All files accepted");
        Ok(())
    } else {
        error!(
            valid = summary.valid_count,
            invalid = summary.invalid_count,
            "Some files were rejected"
        );
        std::process::exit(1);
    }
}
