//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "bluewing")]
#[command(author, version, about = "Scan for and inspect Bluetooth LE peripherals", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for nearby peripherals
    Scan {
        /// Scan duration in seconds (default from config, else 10)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Only report peripherals advertising this service UUID
        #[arg(short, long)]
        service: Option<Uuid>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Connect to a peripheral and print its GATT tree
    Inspect {
        /// Peripheral identifier (MAC address, or UUID on macOS)
        id: String,

        /// Seconds to wait for the peripheral to appear and then to finish discovery
        #[arg(short = 'T', long, default_value = "30")]
        timeout: u64,

        /// Also read every readable characteristic
        #[arg(short, long)]
        read: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,
    /// Print the effective configuration
    Show,
    /// Write the default configuration if none exists
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan() {
        let cli = Cli::parse_from([
            "bluewing",
            "scan",
            "--duration",
            "5",
            "--service",
            "0000180f-0000-1000-8000-00805f9b34fb",
            "--format",
            "json",
        ]);
        match cli.command {
            Commands::Scan {
                duration,
                service,
                format,
            } => {
                assert_eq!(duration, Some(5));
                assert_eq!(service, Some(bluewing_types::uuids::BATTERY_SERVICE));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_inspect_defaults() {
        let cli = Cli::parse_from(["bluewing", "-v", "inspect", "AA:BB:CC:DD:EE:FF"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Inspect {
                id,
                timeout,
                read,
                format,
            } => {
                assert_eq!(id, "AA:BB:CC:DD:EE:FF");
                assert_eq!(timeout, 30);
                assert!(!read);
                assert_eq!(format, OutputFormat::Text);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["bluewing", "-v", "-q", "scan"]).is_err());
    }
}
