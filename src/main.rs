//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `riot_dispatch` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - User-facing output formatting
//!
//! Results go to stdout as JSON lines; logs and the summary go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::process;

use riot_dispatch::initialization::init_logger_with;
use riot_dispatch::{run_batch, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // RIOT_API_KEY may live in .env, either here or next to the executable
    if dotenvy::dotenv().is_err() {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let env_path = exe_dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                }
            }
        }
    }

    let cli = Cli::parse();

    init_logger_with(cli.log_level.clone().into(), cli.log_format.clone())
        .context("Failed to initialize logger")?;

    match run_batch(&cli).await {
        Ok(report) => {
            eprintln!(
                "Fetched {} URL{} ({} succeeded, {} failed, {} skipped) in {:.1}s",
                report.total,
                if report.total == 1 { "" } else { "s" },
                report.succeeded,
                report.failed,
                report.skipped,
                report.elapsed_seconds
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("riot_dispatch error: {:#}", e);
            process::exit(1);
        }
    }
}
