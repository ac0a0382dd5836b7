// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `validate` command: check the environment configuration.

use pyrowatch_config::ServiceConfig;

use crate::error::BinResult;

/// Loads and validates the configuration, then prints the effective
/// values (the PIN is masked).
pub async fn execute() -> BinResult<()> {
    let mut config = ServiceConfig::from_env()?;
    config.config_pin = "****".to_string();

    println!("configuration OK");
    println!(
        "{}",
        serde_json::to_string_pretty(&config).expect("config serializes")
    );
    Ok(())
}
