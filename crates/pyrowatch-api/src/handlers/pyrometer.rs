// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Pyrometer parameter handlers.
//!
//! Every operation targets one device by `(com_port, slave_id)` and runs
//! under the parameter service's pause bracket. Writes respond with the
//! device's verified read-back value, not the requested one.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use pyrowatch_poller::Parameter;

use crate::error::ApiResult;
use crate::state::AppState;

fn default_slave_id() -> u8 {
    1
}

fn default_com_port() -> String {
    "COM3".to_string()
}

/// Query parameters for parameter reads.
#[derive(Debug, Deserialize)]
pub struct ParamQuery {
    /// Target unit address.
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    /// Target bus port.
    #[serde(default = "default_com_port")]
    pub com_port: String,
}

/// Body for emissivity writes.
#[derive(Debug, Deserialize)]
pub struct EmissivityRequest {
    /// Emissivity to set (0.20–1.00).
    pub emissivity: f64,
    /// Target unit address.
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    /// Target bus port.
    #[serde(default = "default_com_port")]
    pub com_port: String,
}

/// Body for the remaining parameter writes.
#[derive(Debug, Deserialize)]
pub struct ParameterRequest {
    /// Value to set.
    pub value: f64,
    /// Target unit address.
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    /// Target bus port.
    #[serde(default = "default_com_port")]
    pub com_port: String,
}

/// Emissivity responses keep their historical field name.
#[derive(Debug, Serialize)]
pub struct EmissivityResponse {
    /// Current emissivity.
    pub emissivity: f64,
    /// Outcome description.
    pub message: String,
}

/// Generic parameter response.
#[derive(Debug, Serialize)]
pub struct ParameterResponse {
    /// Current value.
    pub value: f64,
    /// Outcome description.
    pub message: String,
}

/// All parameters in one response.
#[derive(Debug, Serialize)]
pub struct AllParametersResponse {
    /// Colorimetric slope.
    pub slope: f64,
    /// Emissivity.
    pub emissivity: f64,
    /// Measurement mode.
    pub measurement_mode: u16,
    /// Measurement mode label.
    pub measurement_mode_name: &'static str,
    /// Reporting interval in seconds.
    pub time_interval: u16,
    /// Lower temperature limit in °C.
    pub temp_lower_limit: u16,
    /// Upper temperature limit in °C.
    pub temp_upper_limit: u16,
    /// Outcome description.
    pub message: String,
}

fn mode_name(mode: u16) -> &'static str {
    match mode {
        0 => "One-color",
        1 => "Two-color",
        _ => "Unknown",
    }
}

async fn read_param(state: &AppState, query: &ParamQuery, param: Parameter) -> ApiResult<f64> {
    Ok(state
        .params
        .read(&query.com_port, query.slave_id, param)
        .await?)
}

async fn write_param(
    state: &AppState,
    com_port: &str,
    slave_id: u8,
    param: Parameter,
    value: f64,
) -> ApiResult<f64> {
    Ok(state.params.write(com_port, slave_id, param, value).await?)
}

// =============================================================================
// Emissivity
// =============================================================================

/// GET /api/pyrometer/emissivity
pub async fn get_emissivity(
    State(state): State<AppState>,
    Query(query): Query<ParamQuery>,
) -> ApiResult<Json<EmissivityResponse>> {
    let emissivity = read_param(&state, &query, Parameter::Emissivity).await?;
    Ok(Json(EmissivityResponse {
        emissivity,
        message: format!("Emissivity read successfully from device {}", query.slave_id),
    }))
}

/// POST /api/pyrometer/emissivity
pub async fn set_emissivity(
    State(state): State<AppState>,
    Json(body): Json<EmissivityRequest>,
) -> ApiResult<Json<EmissivityResponse>> {
    let emissivity = write_param(
        &state,
        &body.com_port,
        body.slave_id,
        Parameter::Emissivity,
        body.emissivity,
    )
    .await?;
    Ok(Json(EmissivityResponse {
        emissivity,
        message: format!("Emissivity set successfully on device {}", body.slave_id),
    }))
}

// =============================================================================
// Generic single-parameter endpoints
// =============================================================================

macro_rules! parameter_endpoints {
    ($get_name:ident, $set_name:ident, $param:expr, $label:literal) => {
        #[doc = concat!("GET /api/pyrometer/", $label)]
        pub async fn $get_name(
            State(state): State<AppState>,
            Query(query): Query<ParamQuery>,
        ) -> ApiResult<Json<ParameterResponse>> {
            let value = read_param(&state, &query, $param).await?;
            Ok(Json(ParameterResponse {
                value,
                message: format!(
                    concat!($label, " read successfully from device {}"),
                    query.slave_id
                ),
            }))
        }

        #[doc = concat!("POST /api/pyrometer/", $label)]
        pub async fn $set_name(
            State(state): State<AppState>,
            Json(body): Json<ParameterRequest>,
        ) -> ApiResult<Json<ParameterResponse>> {
            let value = write_param(&state, &body.com_port, body.slave_id, $param, body.value)
                .await?;
            Ok(Json(ParameterResponse {
                value,
                message: format!(
                    concat!($label, " set successfully on device {}"),
                    body.slave_id
                ),
            }))
        }
    };
}

parameter_endpoints!(get_slope, set_slope, Parameter::Slope, "slope");
parameter_endpoints!(
    get_measurement_mode,
    set_measurement_mode,
    Parameter::MeasurementMode,
    "measurement-mode"
);
parameter_endpoints!(
    get_time_interval,
    set_time_interval,
    Parameter::TimeInterval,
    "time-interval"
);
parameter_endpoints!(
    get_temp_lower_limit,
    set_temp_lower_limit,
    Parameter::TempLowerLimit,
    "temp-lower-limit"
);
parameter_endpoints!(
    get_temp_upper_limit,
    set_temp_upper_limit,
    Parameter::TempUpperLimit,
    "temp-upper-limit"
);

// =============================================================================
// All parameters
// =============================================================================

/// GET /api/pyrometer/all-parameters
pub async fn all_parameters(
    State(state): State<AppState>,
    Query(query): Query<ParamQuery>,
) -> ApiResult<Json<AllParametersResponse>> {
    let all = state
        .params
        .read_all(&query.com_port, query.slave_id)
        .await?;

    Ok(Json(AllParametersResponse {
        slope: all.slope,
        emissivity: all.emissivity,
        measurement_mode: all.measurement_mode,
        measurement_mode_name: mode_name(all.measurement_mode),
        time_interval: all.time_interval,
        temp_lower_limit: all.temp_lower_limit,
        temp_upper_limit: all.temp_upper_limit,
        message: "All parameters read successfully".to_string(),
    }))
}
