// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # pyrowatch-api
//!
//! The HTTP surface of PYROWATCH: JSON endpoints under `/api` plus the
//! `/api/ws` live stream.
//!
//! The layer is a thin adapter: validate inputs, call the services, format
//! results. It never touches a serial transport directly — device I/O goes
//! through the scheduler and parameter service.
//!
//! | Area | Endpoints |
//! |---|---|
//! | Health | `GET /api/health` |
//! | Devices | CRUD under `/api/devices` |
//! | Readings | `/api/reading/latest`, `/device/{id}`, `/filter`, `/export/csv`, `/stats` |
//! | Polling | `/api/polling/stats`, `/restart`, `/pause`, `/resume` |
//! | Config | `/api/config/com-ports`, `/verify-pin`, `/clear-settings` |
//! | Pyrometer | parameter read/write under `/api/pyrometer/...` |
//! | Live | `GET /api/ws` (websocket) |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::ApiServer;
pub use state::AppState;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
