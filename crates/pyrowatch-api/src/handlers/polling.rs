// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Polling control handlers.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use pyrowatch_poller::PollingStats;

use crate::error::ApiResult;
use crate::state::AppState;

/// GET /api/polling/stats
pub async fn polling_stats(State(state): State<AppState>) -> Json<PollingStats> {
    Json(state.scheduler.stats())
}

/// POST /api/polling/restart
///
/// Reloads the registry from scratch (picking up new buses) and resumes
/// polling.
pub async fn restart_polling(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    // A restart discards any operator pause.
    state.operator_lease.lock().await.take();
    state.scheduler.restart().await?;
    Ok(Json(json!({ "ok": true })))
}

/// POST /api/polling/pause
///
/// Idempotent: pausing while already paused by the operator succeeds.
pub async fn pause_polling(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut held = state.operator_lease.lock().await;
    if held.is_none() {
        let lease = state.scheduler.pause().await?;
        *held = Some(lease);
    }
    Ok(Json(json!({ "ok": true })))
}

/// POST /api/polling/resume
///
/// Idempotent: resuming while not paused succeeds.
pub async fn resume_polling(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    if let Some(lease) = state.operator_lease.lock().await.take() {
        state.scheduler.resume(lease).await?;
    }
    Ok(Json(json!({ "ok": true })))
}
