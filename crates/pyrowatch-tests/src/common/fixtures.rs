// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Pre-built test data.

use chrono::Utc;
use pyrowatch_core::types::{
    BaudRate, DecodeLayout, Device, DeviceId, NewDevice, Reading, ReadingStatus, RegisterFunction,
};

/// A device draft polling one scaled register on COM3.
pub fn scaled_device_draft(name: &str, slave_id: u8) -> NewDevice {
    NewDevice {
        name: name.to_string(),
        com_port: "COM3".to_string(),
        baud_rate: BaudRate::B9600,
        slave_id,
        function_code: RegisterFunction::ReadHolding,
        start_register: 0,
        register_count: 1,
        layout: Some(DecodeLayout::Int16Scaled),
        enabled: true,
        show_in_graph: false,
        graph_y_min: 0.0,
        graph_y_max: 100.0,
    }
}

/// A device draft polling a two-register float on COM3.
pub fn float_device_draft(name: &str, slave_id: u8) -> NewDevice {
    NewDevice {
        register_count: 2,
        layout: Some(DecodeLayout::Float32),
        ..scaled_device_draft(name, slave_id)
    }
}

/// A standalone device record (not persisted) for buffer/bus tests.
pub fn standalone_device(id: i64, name: &str) -> Device {
    Device {
        id: DeviceId::new(id),
        name: name.to_string(),
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
    }
}

/// A successful reading for the given device.
pub fn ok_reading(device: &Device, value: f32) -> Reading {
    Reading::ok(device, value, None, "01 03 02 01 2C B8 09".to_string())
}

/// A failed reading for the given device.
pub fn err_reading(device: &Device, message: &str) -> Reading {
    Reading::failed(device, ReadingStatus::Err, None, message)
}
