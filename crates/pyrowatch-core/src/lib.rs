// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # pyrowatch-core
//!
//! Core data types for the PYROWATCH pyrometer monitoring service.
//!
//! This crate provides the protocol-agnostic building blocks shared by every
//! other crate in the workspace:
//!
//! - **Device model**: durable pyrometer configuration with validation
//! - **Reading model**: one record per poll attempt (successful or failed)
//! - **ReadingBus**: broadcast fan-out of live readings to subscribers
//! - **Wire time formats**: the JSON / CSV / query timestamp conventions
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       pyrowatch-core                       │
//! │                                                            │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────────┐   │
//! │  │   Device    │   │   Reading   │   │   ReadingBus    │   │
//! │  │ (registry)  │   │ (append-    │   │  (broadcast)    │   │
//! │  │             │   │  only)      │   │                 │   │
//! │  └─────────────┘   └─────────────┘   └─────────────────┘   │
//! │          │                │                   │            │
//! │          ▼                ▼                   ▼            │
//! │      store crate     buffer/store       api websocket      │
//! └────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod bus;
pub mod error;
pub mod timefmt;
pub mod types;

pub use bus::{BusStats, ReadingBus, ReadingSubscriber, DEFAULT_STREAM_CAPACITY};
pub use error::{BusError, ValidationError};
pub use types::{
    BaudRate, DecodeLayout, Device, DeviceId, NewDevice, Reading, ReadingStatus, RegisterFunction,
    TEMP_MAX_C, TEMP_MIN_C,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
