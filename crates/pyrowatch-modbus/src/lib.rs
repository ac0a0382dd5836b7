// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # pyrowatch-modbus
//!
//! Modbus RTU protocol plumbing for PYROWATCH.
//!
//! This crate owns everything between a decoded temperature and the RS-485
//! wire:
//!
//! - **Codec** ([`frame`]): frame construction, CRC-16/Modbus, response
//!   parsing, register decoding
//! - **Transport** ([`transport`]): one serial handle per bus, inter-frame
//!   silence, deadline reads
//! - **Arbiter** ([`arbiter`]): FIFO serialisation of every transaction on
//!   one bus behind an exclusive worker
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        BusArbiter                           │
//! │            (one worker per bus, FIFO queue)                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SerialTransport                        │
//! │        (tokio-serial, inter-frame gap, deadline read)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        frame codec                          │
//! │         (build / CRC-16 / parse / decode, pure fns)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The transport is NOT safe for concurrent callers; the arbiter is the only
//! component that touches it, which is what guarantees single-master
//! exclusivity on the segment.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod arbiter;
pub mod error;
pub mod frame;
pub mod transport;

pub use arbiter::{ArbiterStats, BusArbiter, BusHandle, Transaction, TxnKind};
pub use error::{ModbusError, ModbusResult};
pub use frame::{
    build_read_request, build_write_single, crc16, decode_temperature, encode_float32,
    parse_read_response, parse_write_response, read_reply_len, DecodedTemperature,
    FUNC_WRITE_SINGLE, WRITE_REPLY_LEN,
};
pub use transport::{RtuTransport, SerialSettings, SerialTransport};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
