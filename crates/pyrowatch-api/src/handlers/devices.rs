// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Device CRUD handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use pyrowatch_core::types::{Device, DeviceId, NewDevice};

use crate::error::ApiResult;
use crate::state::AppState;

/// Query parameters for the device list.
#[derive(Debug, Default, Deserialize)]
pub struct ListDevicesQuery {
    /// Restrict to enabled devices.
    #[serde(default)]
    pub enabled_only: bool,
}

/// GET /api/devices
pub async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<ListDevicesQuery>,
) -> ApiResult<Json<Vec<Device>>> {
    Ok(Json(state.registry.list(query.enabled_only).await?))
}

/// POST /api/devices
pub async fn create_device(
    State(state): State<AppState>,
    Json(draft): Json<NewDevice>,
) -> ApiResult<(StatusCode, Json<Device>)> {
    let device = state.registry.create(&draft).await?;
    Ok((StatusCode::CREATED, Json(device)))
}

/// GET /api/devices/{id}
pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Device>> {
    Ok(Json(state.registry.get(DeviceId::new(id)).await?))
}

/// PUT /api/devices/{id}
pub async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(draft): Json<NewDevice>,
) -> ApiResult<Json<Device>> {
    Ok(Json(state.registry.update(DeviceId::new(id), &draft).await?))
}

/// DELETE /api/devices/{id}
pub async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.registry.delete(DeviceId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
