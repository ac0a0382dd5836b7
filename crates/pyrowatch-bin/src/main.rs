// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! PYROWATCH - pyrometer temperature monitoring service.
//!
//! Main binary entry point. Polls Modbus RTU pyrometers over RS-485,
//! persists readings, and serves the HTTP/WebSocket API.

use clap::Parser;

use pyrowatch_bin::cli::Cli;
use pyrowatch_bin::commands;
use pyrowatch_bin::error::report_error_and_exit;
use pyrowatch_bin::logging::init_logging;

/// Application entry point.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format);

    if let Err(error) = commands::execute(cli).await {
        report_error_and_exit(error);
    }
}
