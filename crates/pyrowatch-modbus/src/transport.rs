// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Serial transport for Modbus RTU.
//!
//! One [`SerialTransport`] owns one serial handle, configured per
//! (port, baud, parity, stop-bits) tuple — 8N1 unless a device profile
//! overrides. The transport is NOT safe for concurrent callers; the bus
//! arbiter is its only caller.
//!
//! A transaction is: flush stale input, honour the inter-frame silence,
//! write the request atomically, then read until the expected reply length
//! or the deadline. Once bytes start arriving, a reply that stalls for the
//! intra-frame idle is returned short (the codec then reports the short
//! frame or the embedded exception).

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{
    ClearBuffer, DataBits, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};

use crate::error::{ModbusError, ModbusResult};

// =============================================================================
// RtuTransport trait
// =============================================================================

/// One in-order request/response exchange on a bus.
///
/// The trait seam exists so the arbiter and scheduler can be exercised
/// against scripted transports in tests.
#[async_trait]
pub trait RtuTransport: Send {
    /// Executes one transaction: writes `request`, reads up to
    /// `expected_len` reply bytes within `timeout`.
    ///
    /// Returns the bytes received — possibly fewer than `expected_len` when
    /// the device answers short (e.g. an exception frame). Zero bytes within
    /// the deadline is [`ModbusError::Timeout`].
    async fn transaction(
        &mut self,
        request: &[u8],
        expected_len: usize,
        timeout: Duration,
    ) -> ModbusResult<Vec<u8>>;

    /// Human-readable transport identity for logging.
    fn display_name(&self) -> String;
}

// =============================================================================
// SerialSettings
// =============================================================================

/// Serial line settings for one bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// OS port name (e.g. `COM3`, `/dev/ttyUSB0`).
    pub port: String,
    /// Baud rate in bits per second.
    pub baud_rate: u32,
    /// Data bits; the pyrometers speak 8N1.
    pub data_bits: DataBits,
    /// Parity.
    pub parity: Parity,
    /// Stop bits.
    pub stop_bits: StopBits,
}

impl SerialSettings {
    /// Creates 8N1 settings for a port and baud rate.
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }

    /// One character time on the wire (start + 8 data + parity/stop = 11 bits).
    pub fn char_time(&self) -> Duration {
        Duration::from_secs_f64(11.0 / self.baud_rate as f64)
    }

    /// Required silence between frames: 3.5 character times, with the fixed
    /// 1.75 ms floor the Modbus spec mandates above 19200 baud.
    pub fn inter_frame_gap(&self) -> Duration {
        if self.baud_rate > 19_200 {
            Duration::from_micros(1750)
        } else {
            self.char_time().mul_f64(3.5)
        }
    }

    /// Maximum idle inside a frame: 1.5 character times (750 µs floor).
    pub fn intra_frame_idle(&self) -> Duration {
        if self.baud_rate > 19_200 {
            Duration::from_micros(750)
        } else {
            self.char_time().mul_f64(1.5)
        }
    }
}

// =============================================================================
// SerialTransport
// =============================================================================

/// Modbus RTU transport over one serial handle.
pub struct SerialTransport {
    settings: SerialSettings,
    stream: Option<SerialStream>,
    last_txn_end: Option<Instant>,
}

impl SerialTransport {
    /// Creates a transport; the port is opened lazily on first use.
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            stream: None,
            last_txn_end: None,
        }
    }

    /// Returns the serial settings.
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Opens the port. Idempotent.
    pub fn open(&mut self) -> ModbusResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = tokio_serial::new(&self.settings.port, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .parity(self.settings.parity)
            .stop_bits(self.settings.stop_bits)
            .open_native_async()
            .map_err(|e| ModbusError::Open {
                port: self.settings.port.clone(),
                message: e.to_string(),
            })?;

        tracing::info!(
            port = %self.settings.port,
            baud_rate = self.settings.baud_rate,
            "serial port opened"
        );
        self.stream = Some(stream);
        Ok(())
    }

    /// Closes the port. Idempotent.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(port = %self.settings.port, "serial port closed");
        }
    }

    /// Returns `true` while the port handle is open.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn read_reply(
        stream: &mut SerialStream,
        expected_len: usize,
        deadline: Instant,
        intra_frame_idle: Duration,
    ) -> ModbusResult<Vec<u8>> {
        let mut buf = vec![0u8; expected_len];
        let mut filled = 0usize;

        while filled < expected_len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            // Before the first byte the full deadline applies; afterwards a
            // stall longer than the intra-frame idle ends the frame.
            let wait = if filled == 0 {
                remaining
            } else {
                remaining.min(intra_frame_idle)
            };

            match tokio::time::timeout(wait, stream.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => {
                    return Err(ModbusError::Io {
                        message: "serial stream closed".to_string(),
                    })
                }
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => {
                    return Err(ModbusError::Io {
                        message: e.to_string(),
                    })
                }
                Err(_) => break,
            }
        }

        buf.truncate(filled);
        Ok(buf)
    }
}

impl SerialTransport {
    async fn exchange(
        &mut self,
        request: &[u8],
        expected_len: usize,
        timeout: Duration,
    ) -> ModbusResult<Vec<u8>> {
        self.open()?;

        let gap = self.settings.inter_frame_gap();
        let intra_frame_idle = self.settings.intra_frame_idle();
        let last_txn_end = self.last_txn_end;

        let stream = self.stream.as_mut().ok_or(ModbusError::Io {
            message: "serial stream missing".to_string(),
        })?;

        // Discard anything a late or chatty device left in the buffer.
        stream
            .clear(ClearBuffer::Input)
            .map_err(|e| ModbusError::Io {
                message: e.to_string(),
            })?;

        // Inter-frame silence since the previous transaction end.
        if let Some(end) = last_txn_end {
            let since = end.elapsed();
            if since < gap {
                tokio::time::sleep(gap - since).await;
            }
        }

        let deadline = Instant::now() + timeout;

        stream.write_all(request).await.map_err(|e| ModbusError::Io {
            message: e.to_string(),
        })?;

        let reply = Self::read_reply(stream, expected_len, deadline, intra_frame_idle).await?;
        if reply.is_empty() {
            return Err(ModbusError::Timeout { timeout });
        }
        Ok(reply)
    }
}

#[async_trait]
impl RtuTransport for SerialTransport {
    async fn transaction(
        &mut self,
        request: &[u8],
        expected_len: usize,
        timeout: Duration,
    ) -> ModbusResult<Vec<u8>> {
        let result = self.exchange(request, expected_len, timeout).await;

        self.last_txn_end = Some(Instant::now());

        if let Err(ref e) = result {
            if e.needs_reopen() {
                tracing::warn!(
                    port = %self.settings.port,
                    error = %e,
                    "serial I/O failure, reopening on next transaction"
                );
                self.close();
            }
        }

        result
    }

    fn display_name(&self) -> String {
        format!("{}@{}", self.settings.port, self.settings.baud_rate)
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.settings.port)
            .field("baud_rate", &self.settings.baud_rate)
            .field("open", &self.is_open())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
