// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # pyrowatch-bin
//!
//! The service binary: CLI parsing, logging setup, runtime orchestration
//! and graceful shutdown coordination.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
