// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API error type and HTTP mapping.
//!
//! Service errors translate into structured JSON bodies of the form
//! `{"detail": "..."}` with the status codes of the error taxonomy:
//! 404 not-found, 409 conflict, 422 validation, 503 device/scheduler busy,
//! 500 everything else.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use pyrowatch_core::error::ValidationError;
use pyrowatch_poller::{ParamError, SchedulerError};
use pyrowatch_store::StoreError;

/// Result type alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// ApiError
// =============================================================================

/// API error with HTTP status mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 404.
    #[error("{0}")]
    NotFound(String),

    /// 400.
    #[error("{0}")]
    BadRequest(String),

    /// 422.
    #[error("{0}")]
    Validation(String),

    /// 409.
    #[error("{0}")]
    Conflict(String),

    /// 503.
    #[error("{0}")]
    ServiceUnavailable(String),

    /// 500. The message is logged, not leaked.
    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref message) = self {
            tracing::error!(error = %message, "internal error");
        }
        let status = self.status_code();
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            StoreError::Validation(e) => ApiError::Validation(e.to_string()),
            StoreError::Decode { .. } | StoreError::Database(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Busy { .. } => ApiError::ServiceUnavailable(err.to_string()),
            SchedulerError::InvalidLease => ApiError::Conflict(err.to_string()),
            SchedulerError::Store(e) => e.into(),
        }
    }
}

impl From<ParamError> for ApiError {
    fn from(err: ParamError) -> Self {
        match err {
            ParamError::Validation(e) => ApiError::Validation(e.to_string()),
            ParamError::Busy { .. } => ApiError::ServiceUnavailable(err.to_string()),
            ParamError::Modbus(_) => ApiError::ServiceUnavailable(format!(
                "failed to communicate with pyrometer device: {}",
                err
            )),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::NotFound("device 7 not found".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("name taken".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Validation("bad baud".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::ServiceUnavailable("busy".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_store_error_translation() {
        let err: ApiError = StoreError::not_found("device 7").into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = StoreError::conflict("duplicate name").into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_param_busy_is_503() {
        let err: ApiError = ParamError::Busy {
            reason: "pause timed out".into(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_internal_hides_detail() {
        let err = ApiError::Internal("secret dsn".into());
        assert_eq!(err.to_string(), "internal server error");
    }
}
