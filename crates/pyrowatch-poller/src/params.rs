// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Pyrometer parameter service.
//!
//! Reads and writes the pyrometers' runtime registers (emissivity, slope,
//! measurement mode, time interval, temperature limits) over the same bus
//! arbiters the scheduler polls through. Every operation runs inside a
//! pause bracket: take the scheduler's pause lease, run the control
//! transactions, resume. If the pause cannot be granted within its budget
//! the call fails with `Busy` and no parameter I/O is attempted.
//!
//! Writes are verified: after the register write the device gets a settle
//! delay to commit the value to non-volatile memory, then the register is
//! read back and the read-back value is returned.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use pyrowatch_buffer::ReadingSink;
use pyrowatch_core::error::ValidationError;
use pyrowatch_modbus::{
    build_read_request, build_write_single, parse_read_response, parse_write_response,
    read_reply_len, BusHandle, Transaction, TxnKind, WRITE_REPLY_LEN,
};

use crate::error::ParamError;
use crate::scheduler::PollingScheduler;

/// Function code the parameter registers answer to.
const FUNC_READ_HOLDING: u8 = 0x03;

// =============================================================================
// Parameter
// =============================================================================

/// A writable pyrometer runtime register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    /// Colorimetric slope, register 3, hundredths.
    Slope,
    /// Emissivity, register 4, hundredths.
    Emissivity,
    /// Measurement mode, register 6 (0 or 1).
    MeasurementMode,
    /// Reporting interval in seconds, register 7.
    TimeInterval,
    /// User temperature lower limit in °C, register 8.
    TempLowerLimit,
    /// User temperature upper limit in °C, register 9.
    TempUpperLimit,
}

impl Parameter {
    /// Holding-register address of the parameter.
    pub fn register(&self) -> u16 {
        match self {
            Parameter::Slope => 3,
            Parameter::Emissivity => 4,
            Parameter::MeasurementMode => 6,
            Parameter::TimeInterval => 7,
            Parameter::TempLowerLimit => 8,
            Parameter::TempUpperLimit => 9,
        }
    }

    /// Field name used in validation errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::Slope => "slope",
            Parameter::Emissivity => "emissivity",
            Parameter::MeasurementMode => "measurement_mode",
            Parameter::TimeInterval => "time_interval",
            Parameter::TempLowerLimit => "temp_lower_limit",
            Parameter::TempUpperLimit => "temp_upper_limit",
        }
    }

    /// Validates `value` and encodes it for the wire.
    ///
    /// Out-of-range values are rejected, never clamped.
    pub fn encode(&self, value: f64) -> Result<u16, ValidationError> {
        match self {
            Parameter::Emissivity | Parameter::Slope => {
                if !(0.20..=1.00).contains(&value) {
                    return Err(ValidationError::new(
                        self.name(),
                        "must be between 0.20 and 1.00",
                    ));
                }
                Ok((value * 100.0).round() as u16)
            }
            Parameter::MeasurementMode => {
                if value != 0.0 && value != 1.0 {
                    return Err(ValidationError::new(self.name(), "must be 0 or 1"));
                }
                Ok(value as u16)
            }
            Parameter::TimeInterval => {
                if value.fract() != 0.0 || !(1.0..=3600.0).contains(&value) {
                    return Err(ValidationError::new(
                        self.name(),
                        "must be an integer between 1 and 3600 seconds",
                    ));
                }
                Ok(value as u16)
            }
            Parameter::TempLowerLimit | Parameter::TempUpperLimit => {
                if value.fract() != 0.0 || !(0.0..=3000.0).contains(&value) {
                    return Err(ValidationError::new(
                        self.name(),
                        "must be an integer between 0 and 3000 °C",
                    ));
                }
                Ok(value as u16)
            }
        }
    }

    /// Decodes a raw register value.
    pub fn decode(&self, raw: u16) -> f64 {
        match self {
            Parameter::Emissivity | Parameter::Slope => raw as f64 / 100.0,
            _ => raw as f64,
        }
    }
}

/// All runtime parameters, read under one pause bracket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllParameters {
    /// Colorimetric slope.
    pub slope: f64,
    /// Emissivity.
    pub emissivity: f64,
    /// Measurement mode (0 or 1).
    pub measurement_mode: u16,
    /// Reporting interval in seconds.
    pub time_interval: u16,
    /// User temperature lower limit in °C.
    pub temp_lower_limit: u16,
    /// User temperature upper limit in °C.
    pub temp_upper_limit: u16,
}

// =============================================================================
// ParameterService
// =============================================================================

/// Bridges operator parameter intents to the bus arbiters.
pub struct ParameterService<S: ReadingSink> {
    scheduler: PollingScheduler<S>,
    modbus_timeout: Duration,
    settle_delay: Duration,
}

impl<S: ReadingSink> Clone for ParameterService<S> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            modbus_timeout: self.modbus_timeout,
            settle_delay: self.settle_delay,
        }
    }
}

impl<S: ReadingSink> ParameterService<S> {
    /// Creates the service over the scheduler whose polling it pauses.
    ///
    /// `settle_delay` is the wait between a register write and its
    /// verification read; the pyrometers need about a second to commit to
    /// non-volatile memory.
    pub fn new(
        scheduler: PollingScheduler<S>,
        modbus_timeout: Duration,
        settle_delay: Duration,
    ) -> Self {
        Self {
            scheduler,
            modbus_timeout,
            settle_delay,
        }
    }

    /// Reads one parameter.
    pub async fn read(
        &self,
        com_port: &str,
        slave_id: u8,
        param: Parameter,
    ) -> Result<f64, ParamError> {
        debug!(port = com_port, slave_id, param = param.name(), "parameter read");
        let lease = self.scheduler.pause().await?;
        let handle = self.scheduler.control_arbiter(com_port);

        let result = self.read_register(&handle, slave_id, param).await;

        let _ = self.scheduler.resume(lease).await;
        result.map(|raw| param.decode(raw))
    }

    /// Writes one parameter and returns the verified read-back value.
    pub async fn write(
        &self,
        com_port: &str,
        slave_id: u8,
        param: Parameter,
        value: f64,
    ) -> Result<f64, ParamError> {
        let raw = param.encode(value)?;
        info!(port = com_port, slave_id, param = param.name(), value, "parameter write");

        let lease = self.scheduler.pause().await?;
        let handle = self.scheduler.control_arbiter(com_port);

        let result = self
            .write_and_verify(&handle, slave_id, param, raw)
            .await;

        let _ = self.scheduler.resume(lease).await;
        result
    }

    /// Reads every parameter in fixed order under one pause bracket.
    pub async fn read_all(
        &self,
        com_port: &str,
        slave_id: u8,
    ) -> Result<AllParameters, ParamError> {
        debug!(port = com_port, slave_id, "reading all parameters");
        let lease = self.scheduler.pause().await?;
        let handle = self.scheduler.control_arbiter(com_port);

        let result = self.read_all_registers(&handle, slave_id).await;

        let _ = self.scheduler.resume(lease).await;
        result
    }

    async fn read_all_registers(
        &self,
        handle: &BusHandle,
        slave_id: u8,
    ) -> Result<AllParameters, ParamError> {
        let slope = self.read_register(handle, slave_id, Parameter::Slope).await?;
        let emissivity = self
            .read_register(handle, slave_id, Parameter::Emissivity)
            .await?;
        let mode = self
            .read_register(handle, slave_id, Parameter::MeasurementMode)
            .await?;
        let interval = self
            .read_register(handle, slave_id, Parameter::TimeInterval)
            .await?;
        let lower = self
            .read_register(handle, slave_id, Parameter::TempLowerLimit)
            .await?;
        let upper = self
            .read_register(handle, slave_id, Parameter::TempUpperLimit)
            .await?;

        Ok(AllParameters {
            slope: Parameter::Slope.decode(slope),
            emissivity: Parameter::Emissivity.decode(emissivity),
            measurement_mode: mode,
            time_interval: interval,
            temp_lower_limit: lower,
            temp_upper_limit: upper,
        })
    }

    async fn write_and_verify(
        &self,
        handle: &BusHandle,
        slave_id: u8,
        param: Parameter,
        raw: u16,
    ) -> Result<f64, ParamError> {
        // Temperature limits are cross-checked against their counterpart
        // inside the same bracket.
        match param {
            Parameter::TempLowerLimit => {
                let upper = self
                    .read_register(handle, slave_id, Parameter::TempUpperLimit)
                    .await?;
                if raw >= upper {
                    return Err(ValidationError::new(
                        param.name(),
                        format!("must stay below the upper limit ({upper} °C)"),
                    )
                    .into());
                }
            }
            Parameter::TempUpperLimit => {
                let lower = self
                    .read_register(handle, slave_id, Parameter::TempLowerLimit)
                    .await?;
                if raw <= lower {
                    return Err(ValidationError::new(
                        param.name(),
                        format!("must stay above the lower limit ({lower} °C)"),
                    )
                    .into());
                }
            }
            _ => {}
        }

        let request = build_write_single(slave_id, param.register(), raw);
        let reply = handle
            .submit(Transaction {
                kind: TxnKind::Control,
                slave_id,
                request,
                expected_len: WRITE_REPLY_LEN,
                deadline: self.modbus_timeout,
            })
            .await?;
        parse_write_response(&reply, slave_id, param.register(), raw)?;

        // Let the device commit before verifying.
        tokio::time::sleep(self.settle_delay).await;

        let verified = self.read_register(handle, slave_id, param).await?;
        Ok(param.decode(verified))
    }

    async fn read_register(
        &self,
        handle: &BusHandle,
        slave_id: u8,
        param: Parameter,
    ) -> Result<u16, ParamError> {
        let request = build_read_request(slave_id, FUNC_READ_HOLDING, param.register(), 1);
        let reply = handle
            .submit(Transaction {
                kind: TxnKind::Control,
                slave_id,
                request,
                expected_len: read_reply_len(1),
                deadline: self.modbus_timeout,
            })
            .await?;

        let payload = parse_read_response(&reply, slave_id, FUNC_READ_HOLDING, 2)?;
        Ok(u16::from_be_bytes([payload[0], payload[1]]))
    }
}

// =============================================================================
// Tests
// =============================================================================
