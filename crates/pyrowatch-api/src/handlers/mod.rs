// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Request handlers.

pub mod config;
pub mod devices;
pub mod health;
pub mod polling;
pub mod pyrometer;
pub mod readings;
pub mod stream;

pub use config::{clear_settings, com_ports, verify_pin};
pub use devices::{create_device, delete_device, get_device, list_devices, update_device};
pub use health::health;
pub use polling::{pause_polling, polling_stats, restart_polling, resume_polling};
pub use pyrometer::{
    all_parameters, get_emissivity, get_measurement_mode, get_slope, get_temp_lower_limit,
    get_temp_upper_limit, get_time_interval, set_emissivity, set_measurement_mode, set_slope,
    set_temp_lower_limit, set_temp_upper_limit, set_time_interval,
};
pub use readings::{export_csv, filter_readings, latest_readings, reading_stats, recent_readings};
pub use stream::ws_handler;
