// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data types for PYROWATCH.
//!
//! This module provides the device and reading models that form the
//! foundation of all data handling in the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

// =============================================================================
// Physical range
// =============================================================================

/// Lowest temperature the pyrometers can plausibly report, in °C.
pub const TEMP_MIN_C: f32 = -50.0;

/// Highest temperature the pyrometers can plausibly report, in °C.
pub const TEMP_MAX_C: f32 = 1500.0;

// =============================================================================
// Identifiers
// =============================================================================

/// A unique identifier for a device.
///
/// Device IDs are assigned by the store on creation and are stable across
/// restarts.
///
/// # Examples
///
/// ```
/// use pyrowatch_core::types::DeviceId;
///
/// let id = DeviceId::new(3);
/// assert_eq!(id.value(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(i64);

impl DeviceId {
    /// Creates a new device ID.
    #[inline]
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw integer value.
    #[inline]
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DeviceId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Serial line speed of an RS-485 segment.
///
/// Only the enumerated rates are accepted; anything else is rejected at
/// validation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BaudRate {
    /// 1200 bps
    B1200,
    /// 2400 bps
    B2400,
    /// 4800 bps
    B4800,
    /// 9600 bps (the pyrometers' factory default)
    B9600,
    /// 19200 bps
    B19200,
    /// 38400 bps
    B38400,
    /// 57600 bps
    B57600,
    /// 115200 bps
    B115200,
}

impl BaudRate {
    /// All accepted rates, ascending.
    pub const ALL: [BaudRate; 8] = [
        BaudRate::B1200,
        BaudRate::B2400,
        BaudRate::B4800,
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
    ];

    /// Returns the rate in bits per second.
    pub fn value(&self) -> u32 {
        match self {
            BaudRate::B1200 => 1200,
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        BaudRate::B9600
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        BaudRate::ALL
            .into_iter()
            .find(|b| b.value() == value)
            .ok_or_else(|| format!("unsupported baud rate: {}", value))
    }
}

impl From<BaudRate> for u32 {
    fn from(rate: BaudRate) -> Self {
        rate.value()
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Modbus function used to read the temperature registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RegisterFunction {
    /// Function 3 — read holding registers.
    ReadHolding,
    /// Function 4 — read input registers.
    ReadInput,
}

impl RegisterFunction {
    /// Returns the Modbus function code.
    pub fn code(&self) -> u8 {
        match self {
            RegisterFunction::ReadHolding => 3,
            RegisterFunction::ReadInput => 4,
        }
    }
}

impl TryFrom<u8> for RegisterFunction {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(RegisterFunction::ReadHolding),
            4 => Ok(RegisterFunction::ReadInput),
            other => Err(format!("unsupported function code: {}", other)),
        }
    }
}

impl From<RegisterFunction> for u8 {
    fn from(func: RegisterFunction) -> Self {
        func.code()
    }
}

/// How a device's register window decodes into temperatures.
///
/// The register map differs between pyrometer models, so the decode rule is
/// part of the device configuration rather than a global convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeLayout {
    /// One register: signed 16-bit value in tenths of a degree.
    Int16Scaled,
    /// Two registers: big-endian IEEE-754 float spanning both.
    Float32,
    /// Two registers: process temperature in the first, ambient in the
    /// second, each a signed 16-bit value in tenths of a degree.
    Int16WithAmbient,
}

impl DecodeLayout {
    /// Number of registers this layout occupies.
    pub fn register_count(&self) -> u16 {
        match self {
            DecodeLayout::Int16Scaled => 1,
            DecodeLayout::Float32 | DecodeLayout::Int16WithAmbient => 2,
        }
    }

    /// The conventional layout for a register count.
    pub fn default_for(register_count: u16) -> Option<Self> {
        match register_count {
            1 => Some(DecodeLayout::Int16Scaled),
            2 => Some(DecodeLayout::Float32),
            _ => None,
        }
    }

    /// Returns the layout as its wire/storage string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeLayout::Int16Scaled => "int16_scaled",
            DecodeLayout::Float32 => "float32",
            DecodeLayout::Int16WithAmbient => "int16_with_ambient",
        }
    }

    /// Parses the wire/storage string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "int16_scaled" => Some(DecodeLayout::Int16Scaled),
            "float32" => Some(DecodeLayout::Float32),
            "int16_with_ambient" => Some(DecodeLayout::Int16WithAmbient),
            _ => None,
        }
    }
}

// =============================================================================
// Device
// =============================================================================

/// A configured pyrometer on one of the RS-485 buses.
///
/// Devices are durable records owned by the device registry; the polling
/// scheduler reads them at start and on reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Store-assigned identifier.
    pub id: DeviceId,
    /// Unique user-visible name.
    pub name: String,
    /// OS serial-port name (e.g. `COM3`, `/dev/ttyUSB0`).
    pub com_port: String,
    /// Bus speed.
    pub baud_rate: BaudRate,
    /// Modbus unit address, 1..=247, unique within a bus.
    pub slave_id: u8,
    /// Read function for the temperature window.
    pub function_code: RegisterFunction,
    /// First register of the temperature window.
    pub start_register: u16,
    /// Number of registers in the window (1 or 2).
    pub register_count: u16,
    /// Decode rule for the register window.
    pub layout: DecodeLayout,
    /// Whether the scheduler polls this device.
    pub enabled: bool,
    /// Whether the dashboard charts this device.
    pub show_in_graph: bool,
    /// Lower bound of the chart's y axis.
    pub graph_y_min: f64,
    /// Upper bound of the chart's y axis.
    pub graph_y_max: f64,
    /// When the record was created (UTC).
    #[serde(with = "crate::timefmt::serde_micros")]
    pub created_at: DateTime<Utc>,
    /// When the record was last updated (UTC).
    #[serde(with = "crate::timefmt::serde_micros")]
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Bus key this device polls on.
    pub fn bus_key(&self) -> (String, BaudRate) {
        (self.com_port.clone(), self.baud_rate)
    }
}

/// Payload for creating or replacing a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDevice {
    /// Unique user-visible name.
    pub name: String,
    /// OS serial-port name.
    pub com_port: String,
    /// Bus speed.
    #[serde(default)]
    pub baud_rate: BaudRate,
    /// Modbus unit address.
    pub slave_id: u8,
    /// Read function for the temperature window.
    pub function_code: RegisterFunction,
    /// First register of the temperature window.
    #[serde(default)]
    pub start_register: u16,
    /// Number of registers in the window.
    #[serde(default = "default_register_count")]
    pub register_count: u16,
    /// Decode rule; defaults from `register_count` when omitted.
    #[serde(default)]
    pub layout: Option<DecodeLayout>,
    /// Whether the scheduler polls this device.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Whether the dashboard charts this device.
    #[serde(default)]
    pub show_in_graph: bool,
    /// Lower bound of the chart's y axis.
    #[serde(default = "default_graph_y_min")]
    pub graph_y_min: f64,
    /// Upper bound of the chart's y axis.
    #[serde(default = "default_graph_y_max")]
    pub graph_y_max: f64,
}

fn default_register_count() -> u16 {
    2
}

fn default_enabled() -> bool {
    true
}

fn default_graph_y_min() -> f64 {
    0.0
}

fn default_graph_y_max() -> f64 {
    100.0
}

impl NewDevice {
    /// Validates the payload and resolves the decode layout.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the offending field when any
    /// invariant is violated:
    ///
    /// - name must be non-empty
    /// - com port must be non-empty
    /// - slave id must be in 1..=247
    /// - register count must be 1 or 2 and match the layout
    /// - graph y-min must be strictly below y-max
    pub fn validate(&self) -> Result<DecodeLayout, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("name", "must not be empty"));
        }
        if self.com_port.trim().is_empty() {
            return Err(ValidationError::new("com_port", "must not be empty"));
        }
        if !(1..=247).contains(&self.slave_id) {
            return Err(ValidationError::new("slave_id", "must be in 1..=247"));
        }
        let layout = match self.layout {
            Some(layout) => {
                if layout.register_count() != self.register_count {
                    return Err(ValidationError::new(
                        "register_count",
                        format!(
                            "layout {:?} requires {} register(s)",
                            layout,
                            layout.register_count()
                        ),
                    ));
                }
                layout
            }
            None => DecodeLayout::default_for(self.register_count).ok_or_else(|| {
                ValidationError::new("register_count", "must be 1 or 2")
            })?,
        };
        if self.graph_y_min >= self.graph_y_max {
            return Err(ValidationError::new(
                "graph_y_min",
                "must be strictly below graph_y_max",
            ));
        }
        Ok(layout)
    }
}

// =============================================================================
// Reading
// =============================================================================

/// Terminal status of a poll attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadingStatus {
    /// Decoded and within physical range.
    #[serde(rename = "OK")]
    Ok,
    /// The attempt timed out, and the last good read is older than the
    /// stale window.
    Stale,
    /// The attempt failed at some layer (transport, framing, protocol or
    /// decode).
    Err,
}

impl ReadingStatus {
    /// Returns the status as the wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::Ok => "OK",
            ReadingStatus::Stale => "Stale",
            ReadingStatus::Err => "Err",
        }
    }

    /// Parses the wire string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OK" => Some(ReadingStatus::Ok),
            "Stale" => Some(ReadingStatus::Stale),
            "Err" => Some(ReadingStatus::Err),
            _ => None,
        }
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One temperature reading, produced per poll attempt.
///
/// Readings are append-only: once persisted they are immutable. A failed
/// attempt is still recorded, with `value` absent and the diagnostic in
/// `error_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Store-assigned row id; absent until persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Device the reading belongs to.
    pub device_id: DeviceId,
    /// Device name, denormalised for export.
    pub device_name: String,
    /// UTC instant of acquisition, microsecond precision.
    #[serde(with = "crate::timefmt::serde_micros")]
    pub timestamp: DateTime<Utc>,
    /// Process temperature in °C; absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f32>,
    /// Ambient temperature in °C, when the device layout carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambient_temp: Option<f32>,
    /// Terminal status of the attempt.
    pub status: ReadingStatus,
    /// Verbatim response bytes as spaced uppercase hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_hex: Option<String>,
    /// Human-readable diagnostic on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Reading {
    /// Creates a successful reading.
    pub fn ok(
        device: &Device,
        value: f32,
        ambient_temp: Option<f32>,
        raw_hex: String,
    ) -> Self {
        Self {
            id: None,
            device_id: device.id,
            device_name: device.name.clone(),
            timestamp: Utc::now(),
            value: Some(value),
            ambient_temp,
            status: ReadingStatus::Ok,
            raw_hex: Some(raw_hex),
            error_message: None,
        }
    }

    /// Creates a failed reading.
    pub fn failed(
        device: &Device,
        status: ReadingStatus,
        raw_hex: Option<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            device_id: device.id,
            device_name: device.name.clone(),
            timestamp: Utc::now(),
            value: None,
            ambient_temp: None,
            status,
            raw_hex,
            error_message: Some(error_message.into()),
        }
    }
}

/// Formats raw response bytes as spaced uppercase hex.
pub fn format_raw_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> NewDevice {
        NewDevice {
            name: "Furnace A".to_string(),
            com_port: "COM3".to_string(),
            baud_rate: BaudRate::B9600,
            slave_id: 1,
            function_code: RegisterFunction::ReadHolding,
            start_register: 0,
            register_count: 2,
            layout: None,
            enabled: true,
            show_in_graph: false,
            graph_y_min: 0.0,
            graph_y_max: 100.0,
        }
    }

    #[test]
    fn test_baud_rate_round_trip() {
        for rate in BaudRate::ALL {
            assert_eq!(BaudRate::try_from(rate.value()).unwrap(), rate);
        }
        assert!(BaudRate::try_from(14400).is_err());
    }

    #[test]
    fn test_function_code_round_trip() {
        assert_eq!(RegisterFunction::try_from(3).unwrap().code(), 3);
        assert_eq!(RegisterFunction::try_from(4).unwrap().code(), 4);
        assert!(RegisterFunction::try_from(6).is_err());
    }

    #[test]
    fn test_layout_register_counts() {
        assert_eq!(DecodeLayout::Int16Scaled.register_count(), 1);
        assert_eq!(DecodeLayout::Float32.register_count(), 2);
        assert_eq!(DecodeLayout::Int16WithAmbient.register_count(), 2);
        assert_eq!(DecodeLayout::default_for(1), Some(DecodeLayout::Int16Scaled));
        assert_eq!(DecodeLayout::default_for(2), Some(DecodeLayout::Float32));
        assert_eq!(DecodeLayout::default_for(3), None);
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert_eq!(draft().validate().unwrap(), DecodeLayout::Float32);
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let mut d = draft();
        d.name = "  ".to_string();
        assert_eq!(d.validate().unwrap_err().field, "name");
    }

    #[test]
    fn test_validate_rejects_bad_slave_id() {
        let mut d = draft();
        d.slave_id = 0;
        assert_eq!(d.validate().unwrap_err().field, "slave_id");
    }

    #[test]
    fn test_validate_rejects_bad_register_count() {
        let mut d = draft();
        d.register_count = 3;
        assert_eq!(d.validate().unwrap_err().field, "register_count");
    }

    #[test]
    fn test_validate_rejects_layout_count_mismatch() {
        let mut d = draft();
        d.register_count = 1;
        d.layout = Some(DecodeLayout::Float32);
        assert_eq!(d.validate().unwrap_err().field, "register_count");
    }

    #[test]
    fn test_validate_rejects_inverted_graph_bounds() {
        let mut d = draft();
        d.graph_y_min = 500.0;
        d.graph_y_max = 100.0;
        assert_eq!(d.validate().unwrap_err().field, "graph_y_min");
    }

    #[test]
    fn test_status_wire_strings() {
        assert_eq!(ReadingStatus::Ok.as_str(), "OK");
        assert_eq!(ReadingStatus::parse("Stale"), Some(ReadingStatus::Stale));
        assert_eq!(ReadingStatus::parse("bogus"), None);

        let json = serde_json::to_string(&ReadingStatus::Ok).unwrap();
        assert_eq!(json, "\"OK\"");
    }

    #[test]
    fn test_format_raw_hex() {
        assert_eq!(format_raw_hex(&[0x01, 0x03, 0x02, 0x01, 0x2C]), "01 03 02 01 2C");
        assert_eq!(format_raw_hex(&[]), "");
    }

    #[test]
    fn test_reading_serializes_without_null_fields() {
        let device = Device {
            id: DeviceId::new(1),
            name: "Furnace A".to_string(),
            com_port: "COM3".to_string(),
            baud_rate: BaudRate::B9600,
            slave_id: 1,
            function_code: RegisterFunction::ReadHolding,
            start_register: 0,
            register_count: 1,
            layout: DecodeLayout::Int16Scaled,
            enabled: true,
            show_in_graph: false,
            graph_y_min: 0.0,
            graph_y_max: 100.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let reading = Reading::failed(&device, ReadingStatus::Err, None, "timeout");
        let json = serde_json::to_value(&reading).unwrap();
        assert!(json.get("value").is_none());
        assert!(json.get("raw_hex").is_none());
        assert_eq!(json["status"], "Err");
    }
}
