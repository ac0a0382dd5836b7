// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus error taxonomy.
//!
//! Every failure between the scheduler and the wire maps onto one of these
//! variants. None of them is fatal to a polling loop; the scheduler records
//! the failure as a `Reading` with status `Err` (or `Stale`) and moves on.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Modbus operations.
pub type ModbusResult<T> = Result<T, ModbusError>;

// =============================================================================
// ModbusError
// =============================================================================

/// Errors from the Modbus RTU stack.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModbusError {
    /// The serial port could not be opened.
    #[error("cannot open serial port '{port}': {message}")]
    Open {
        /// Port name.
        port: String,
        /// OS-level detail.
        message: String,
    },

    /// Read or write on the serial handle failed.
    #[error("serial I/O error: {message}")]
    Io {
        /// OS-level detail.
        message: String,
    },

    /// No (complete) reply arrived before the deadline.
    #[error("no reply within {timeout:?}")]
    Timeout {
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The reply was shorter than the frame demands.
    #[error("short frame: expected {expected} bytes, got {got}")]
    FrameShort {
        /// Bytes the full frame would have.
        expected: usize,
        /// Bytes actually received.
        got: usize,
    },

    /// The reply's CRC did not match its contents.
    #[error("CRC mismatch: computed {expected:#06x}, received {received:#06x}")]
    CrcMismatch {
        /// CRC computed over the received frame.
        expected: u16,
        /// CRC carried by the frame.
        received: u16,
    },

    /// The reply echoed a different slave, function or byte count.
    #[error("echo mismatch: {detail}")]
    EchoMismatch {
        /// What differed.
        detail: String,
    },

    /// The device answered with a Modbus exception.
    #[error("modbus exception {code:#04x} ({})", exception_name(*.code))]
    Exception {
        /// The exception code from the reply.
        code: u8,
    },

    /// The decoded value is outside the physical range.
    #[error("decoded temperature {value} °C outside physical range")]
    DecodeRange {
        /// The out-of-range value.
        value: f32,
    },

    /// The bus arbiter has shut down.
    #[error("bus arbiter closed")]
    BusClosed,
}

impl ModbusError {
    /// Returns `true` for a deadline expiry (the only failure the stale
    /// rule distinguishes from hard errors).
    pub fn is_timeout(&self) -> bool {
        matches!(self, ModbusError::Timeout { .. })
    }

    /// Returns `true` when the transport should drop and reopen its handle.
    pub fn needs_reopen(&self) -> bool {
        matches!(self, ModbusError::Open { .. } | ModbusError::Io { .. })
    }
}

/// Human-readable name for a Modbus exception code.
pub fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "IllegalFunction",
        0x02 => "IllegalDataAddress",
        0x03 => "IllegalDataValue",
        0x04 => "ServerDeviceFailure",
        0x05 => "Acknowledge",
        0x06 => "ServerDeviceBusy",
        0x08 => "MemoryParityError",
        0x0A => "GatewayPathUnavailable",
        0x0B => "GatewayTargetDevice",
        _ => "Unknown",
    }
}

// =============================================================================
// Tests
// =============================================================================
