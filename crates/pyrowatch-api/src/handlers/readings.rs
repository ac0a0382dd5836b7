// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reading query and export handlers.

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::stream;
use serde::{Deserialize, Serialize};

use pyrowatch_core::timefmt;
use pyrowatch_core::types::{DeviceId, Reading};
use pyrowatch_store::{DeviceLatest, ReadingStats};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/reading/latest
pub async fn latest_readings(State(state): State<AppState>) -> ApiResult<Json<Vec<DeviceLatest>>> {
    Ok(Json(state.readings.latest().await?))
}

/// Query parameters for recent readings.
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    /// Maximum rows to return, newest first.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /api/reading/device/{id}
pub async fn recent_readings(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<Vec<Reading>>> {
    if query.limit < 1 {
        return Err(ApiError::Validation("limit must be at least 1".to_string()));
    }
    Ok(Json(
        state.readings.recent(DeviceId::new(id), query.limit).await?,
    ))
}

/// Query parameters for range endpoints (`filter`, `export/csv`).
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    /// Device to query.
    pub device_id: i64,
    /// Range start, `YYYY-MM-DDTHH:MM:SS`, UTC.
    pub start_date: String,
    /// Range end, `YYYY-MM-DDTHH:MM:SS`, UTC.
    pub end_date: String,
}

impl RangeQuery {
    fn parse(&self) -> ApiResult<(DeviceId, DateTime<Utc>, DateTime<Utc>)> {
        let start = timefmt::parse_query(&self.start_date).map_err(|_| {
            ApiError::Validation(format!(
                "start_date '{}' is not YYYY-MM-DDTHH:MM:SS",
                self.start_date
            ))
        })?;
        let end = timefmt::parse_query(&self.end_date).map_err(|_| {
            ApiError::Validation(format!(
                "end_date '{}' is not YYYY-MM-DDTHH:MM:SS",
                self.end_date
            ))
        })?;
        if start > end {
            return Err(ApiError::Validation(
                "start_date must not be after end_date".to_string(),
            ));
        }
        Ok((DeviceId::new(self.device_id), start, end))
    }
}

/// Response envelope for the filter endpoint.
#[derive(Debug, Serialize)]
pub struct FilterResponse {
    /// Matching readings, oldest first.
    pub readings: Vec<Reading>,
}

/// GET /api/reading/filter
pub async fn filter_readings(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<FilterResponse>> {
    let (device_id, start, end) = query.parse()?;
    let readings = state.readings.history(device_id, start, end, None).await?;
    Ok(Json(FilterResponse { readings }))
}

/// GET /api/reading/export/csv
///
/// Streams the export line by line; header row first, data rows ascending
/// by timestamp.
pub async fn export_csv(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Response> {
    let (device_id, start, end) = query.parse()?;
    let lines = state.readings.export_csv(device_id, start, end).await?;

    let body = Body::from_stream(stream::iter(
        lines
            .into_iter()
            .map(|line| Ok::<_, std::convert::Infallible>(Bytes::from(line))),
    ));

    let filename = format!("readings_device_{}.csv", device_id);
    Response::builder()
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// GET /api/reading/stats
pub async fn reading_stats(State(state): State<AppState>) -> ApiResult<Json<ReadingStats>> {
    Ok(Json(state.readings.stats().await?))
}
