// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Binary-level errors and exit reporting.

use thiserror::Error;

use pyrowatch_config::ConfigError;
use pyrowatch_poller::SchedulerError;
use pyrowatch_store::StoreError;

/// Result alias for binary operations.
pub type BinResult<T> = Result<T, BinError>;

/// Top-level errors of the service binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The database could not be prepared.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The scheduler failed to start.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// The API server failed.
    #[error("api error: {0}")]
    Api(String),
}

/// Prints the error and exits with a non-zero status.
pub fn report_error_and_exit(error: BinError) -> ! {
    tracing::error!(error = %error, "fatal error");
    eprintln!("error: {}", error);
    std::process::exit(1);
}
