// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration endpoints: serial-port discovery, PIN check, registry wipe.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_serial::SerialPortType;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// One discovered serial port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComPortInfo {
    /// OS port name.
    pub port: String,
    /// Human-readable description, when the OS provides one.
    pub description: String,
}

/// GET /api/config/com-ports
pub async fn com_ports(State(_state): State<AppState>) -> ApiResult<Json<Value>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| ApiError::Internal(format!("serial port enumeration failed: {}", e)))?;

    let ports: Vec<ComPortInfo> = ports
        .into_iter()
        .map(|info| {
            let description = match info.port_type {
                SerialPortType::UsbPort(usb) => usb
                    .product
                    .unwrap_or_else(|| "USB serial device".to_string()),
                SerialPortType::PciPort => "PCI serial device".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth serial device".to_string(),
                SerialPortType::Unknown => "Serial device".to_string(),
            };
            ComPortInfo {
                port: info.port_name,
                description,
            }
        })
        .collect();

    Ok(Json(json!({ "ports": ports })))
}

/// PIN verification body.
#[derive(Debug, Deserialize)]
pub struct PinRequest {
    /// The PIN to check.
    pub pin: String,
}

/// POST /api/config/verify-pin
pub async fn verify_pin(
    State(state): State<AppState>,
    Json(body): Json<PinRequest>,
) -> Json<Value> {
    let valid = constant_time_eq(&body.pin, &state.config.config_pin);
    Json(json!({ "valid": valid }))
}

/// POST /api/config/clear-settings
pub async fn clear_settings(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let removed = state.registry.clear().await?;
    tracing::warn!(removed, "device registry wiped via API");
    Ok(Json(json!({ "ok": true })))
}

/// Compares two strings without an early exit, so the comparison time does
/// not reveal the matching prefix length.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= (x ^ y) as usize;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("1234", "1234"));
        assert!(!constant_time_eq("1234", "1235"));
        assert!(!constant_time_eq("1234", "123"));
        assert!(!constant_time_eq("", "1234"));
        assert!(constant_time_eq("", ""));
    }
}
