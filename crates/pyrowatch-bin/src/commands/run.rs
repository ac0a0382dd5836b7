// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `run` command: start the service.

use pyrowatch_config::ServiceConfig;

use crate::error::BinResult;
use crate::runtime::ServiceRuntime;

/// Loads the configuration and runs the service until shutdown.
pub async fn execute() -> BinResult<()> {
    let config = ServiceConfig::from_env()?;
    ServiceRuntime::new(config).run().await
}
