// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Simulated RS-485 bus.
//!
//! [`BusSim`] models a segment of Modbus RTU slaves with real register
//! maps: requests are CRC-checked and parsed, responses are framed exactly
//! like a device would frame them. Slaves can be silenced to simulate
//! cable breaks, so timeout and recovery paths run end-to-end.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use pyrowatch_modbus::transport::RtuTransport;
use pyrowatch_modbus::{crc16, ModbusError, ModbusResult};
use pyrowatch_poller::TransportFactory;

// =============================================================================
// BusSim
// =============================================================================

/// A simulated bus of Modbus RTU slaves.
#[derive(Debug, Default)]
pub struct BusSim {
    /// Register maps per slave id.
    slaves: Mutex<HashMap<u8, HashMap<u16, u16>>>,
    /// Slaves that currently do not answer.
    silent: Mutex<HashSet<u8>>,
    /// Every request frame observed, in arrival order.
    requests: Mutex<Vec<Vec<u8>>>,
}

impl BusSim {
    /// Creates an empty bus.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sets one register on a slave (creating the slave if needed).
    pub fn set_register(&self, slave_id: u8, register: u16, value: u16) {
        self.slaves
            .lock()
            .unwrap()
            .entry(slave_id)
            .or_default()
            .insert(register, value);
    }

    /// Reads one register back (for write verification in tests).
    pub fn register(&self, slave_id: u8, register: u16) -> Option<u16> {
        self.slaves
            .lock()
            .unwrap()
            .get(&slave_id)
            .and_then(|regs| regs.get(&register).copied())
    }

    /// Stores a big-endian float across `register` and `register + 1`.
    pub fn set_float(&self, slave_id: u8, register: u16, value: f32) {
        let bits = value.to_bits();
        self.set_register(slave_id, register, (bits >> 16) as u16);
        self.set_register(slave_id, register + 1, (bits & 0xFFFF) as u16);
    }

    /// Silences or unsilences a slave.
    pub fn set_silent(&self, slave_id: u8, silent: bool) {
        let mut set = self.silent.lock().unwrap();
        if silent {
            set.insert(slave_id);
        } else {
            set.remove(&slave_id);
        }
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Builds a device's reply for a request frame, or `None` for silence.
    fn respond(&self, request: &[u8]) -> Option<Vec<u8>> {
        if request.len() < 4 {
            return None;
        }
        let body = &request[..request.len() - 2];
        let carried = u16::from_le_bytes([request[request.len() - 2], request[request.len() - 1]]);
        if crc16(body) != carried {
            // A garbled frame gets no answer, like on a real segment.
            return None;
        }

        let slave_id = request[0];
        if self.silent.lock().unwrap().contains(&slave_id) {
            return None;
        }

        let slaves = self.slaves.lock().unwrap();
        let registers = slaves.get(&slave_id)?;
        let function = request[1];

        match function {
            0x03 | 0x04 => {
                let start = u16::from_be_bytes([request[2], request[3]]);
                let count = u16::from_be_bytes([request[4], request[5]]);

                let mut frame = vec![slave_id, function, (count * 2) as u8];
                for offset in 0..count {
                    let value = registers.get(&(start + offset)).copied().unwrap_or(0);
                    frame.extend_from_slice(&value.to_be_bytes());
                }
                Some(finish_frame(frame))
            }
            0x06 => {
                let register = u16::from_be_bytes([request[2], request[3]]);
                let value = u16::from_be_bytes([request[4], request[5]]);
                drop(slaves);
                self.set_register(slave_id, register, value);
                // Write responses echo the request.
                Some(request.to_vec())
            }
            _ => {
                // Unsupported function: exception 0x01.
                Some(finish_frame(vec![slave_id, function | 0x80, 0x01]))
            }
        }
    }
}

fn finish_frame(mut frame: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&frame);
    frame.push((crc & 0xFF) as u8);
    frame.push((crc >> 8) as u8);
    frame
}

// =============================================================================
// SimTransport / SimFactory
// =============================================================================

/// Transport backed by a [`BusSim`].
pub struct SimTransport {
    bus: Arc<BusSim>,
}

#[async_trait]
impl RtuTransport for SimTransport {
    async fn transaction(
        &mut self,
        request: &[u8],
        _expected_len: usize,
        timeout: Duration,
    ) -> ModbusResult<Vec<u8>> {
        self.bus.requests.lock().unwrap().push(request.to_vec());
        match self.bus.respond(request) {
            Some(reply) => Ok(reply),
            None => Err(ModbusError::Timeout { timeout }),
        }
    }

    fn display_name(&self) -> String {
        "sim-bus".to_string()
    }
}

/// Transport factory handing out transports onto one shared [`BusSim`].
pub struct SimFactory {
    bus: Arc<BusSim>,
}

impl SimFactory {
    /// Creates a factory over the shared bus.
    pub fn new(bus: Arc<BusSim>) -> Self {
        Self { bus }
    }
}

impl TransportFactory for SimFactory {
    fn create(&self, _port: &str, _baud_rate: u32) -> Box<dyn RtuTransport> {
        Box::new(SimTransport {
            bus: self.bus.clone(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pyrowatch_modbus::{build_read_request, build_write_single, parse_read_response};

    #[test]
    fn test_sim_answers_reads() {
        let bus = BusSim::new();
        bus.set_register(1, 0, 300);

        let request = build_read_request(1, 3, 0, 1);
        let reply = bus.respond(&request).expect("slave should answer");
        let payload = parse_read_response(&reply, 1, 3, 2).unwrap();
        assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), 300);
    }

    #[test]
    fn test_sim_applies_writes() {
        let bus = BusSim::new();
        bus.set_register(1, 4, 95);

        let request = build_write_single(1, 4, 70);
        let reply = bus.respond(&request).expect("slave should answer");
        assert_eq!(reply, request);
        assert_eq!(bus.register(1, 4), Some(70));
    }

    #[test]
    fn test_silent_slave_gives_no_answer() {
        let bus = BusSim::new();
        bus.set_register(1, 0, 300);
        bus.set_silent(1, true);

        assert!(bus.respond(&build_read_request(1, 3, 0, 1)).is_none());

        bus.set_silent(1, false);
        assert!(bus.respond(&build_read_request(1, 3, 0, 1)).is_some());
    }

    #[test]
    fn test_unknown_slave_is_silent() {
        let bus = BusSim::new();
        assert!(bus.respond(&build_read_request(9, 3, 0, 1)).is_none());
    }

    #[test]
    fn test_float_registers() {
        let bus = BusSim::new();
        bus.set_float(2, 0, 30.0);
        assert_eq!(bus.register(2, 0), Some(0x41F0));
        assert_eq!(bus.register(2, 1), Some(0x0000));
    }
}
