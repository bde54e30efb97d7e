//! Command-line front end for bluewing sessions.

mod cli;
mod commands;
mod config;
mod format;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load();
    if cli.verbose && config.session.log_level == bluewing_core::LogLevel::None {
        config.session.log_level = bluewing_core::LogLevel::Debug;
    }

    match cli.command {
        Commands::Scan {
            duration,
            service,
            format,
        } => commands::cmd_scan(duration, service, format, cli.quiet, &config).await,
        Commands::Inspect {
            id,
            timeout,
            read,
            format,
        } => commands::cmd_inspect(&id, timeout, read, format, cli.quiet, &config).await,
        Commands::Config { action } => commands::cmd_config(action, &config),
    }
}
