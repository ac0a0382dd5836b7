// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `version` command.

use crate::error::BinResult;

/// Prints version information for the binary and its component crates.
pub fn execute() -> BinResult<()> {
    println!("pyrowatch {}", crate::VERSION);
    println!("  core    {}", pyrowatch_core::VERSION);
    println!("  api     {}", pyrowatch_api::VERSION);
    println!("  poller  {}", pyrowatch_poller::VERSION);
    println!("  store   {}", pyrowatch_store::VERSION);
    println!("  buffer  {}", pyrowatch_buffer::VERSION);
    Ok(())
}
