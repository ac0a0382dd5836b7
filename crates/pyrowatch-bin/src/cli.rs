// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.

use clap::{Parser, Subcommand, ValueEnum};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// PYROWATCH - pyrometer temperature monitoring service.
///
/// Continuously polls infrared pyrometers over Modbus RTU / RS-485,
/// persists their readings and serves a JSON + WebSocket API for
/// dashboards and operators.
#[derive(Parser, Debug)]
#[command(
    name = "pyrowatch",
    author = "Sylvex <contact@sylvex.io>",
    version = crate::VERSION,
    about = "Pyrometer temperature monitoring over Modbus RTU",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        default_value = "info",
        env = "PYROWATCH_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log output format
    #[arg(long, default_value = "text", env = "PYROWATCH_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text (default).
    Text,
    /// JSON lines for log aggregation.
    Json,
    /// Minimal single-line output.
    Compact,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the monitoring service
    ///
    /// This is the default when no subcommand is given. Reads the
    /// configuration from the environment, starts polling and serves the
    /// API until SIGINT/SIGTERM.
    Run,

    /// Validate the environment configuration
    ///
    /// Loads and validates the configuration without opening serial ports
    /// or binding the listener, then prints the effective values.
    Validate,

    /// Show version information
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["pyrowatch"]);
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_subcommand_parsing() {
        let cli = Cli::parse_from(["pyrowatch", "validate"]);
        assert!(matches!(cli.command, Some(Commands::Validate)));

        let cli = Cli::parse_from(["pyrowatch", "--log-format", "json", "run"]);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Some(Commands::Run)));
    }
}
