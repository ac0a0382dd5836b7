// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command dispatch.

mod run;
mod validate;
mod version;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Executes the selected command; `run` is the default.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run::execute().await,
        Commands::Validate => validate::execute().await,
        Commands::Version => version::execute(),
    }
}
