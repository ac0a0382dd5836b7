// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Scheduler and parameter-service errors.

use pyrowatch_core::error::ValidationError;
use pyrowatch_modbus::ModbusError;
use pyrowatch_store::StoreError;
use thiserror::Error;

/// Errors from the polling scheduler's control surface.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A pause could not be granted in time, or one is already held.
    #[error("scheduler busy: {reason}")]
    Busy {
        /// Why the pause was refused.
        reason: String,
    },

    /// A resume presented a lease that is not the one outstanding.
    #[error("invalid pause lease")]
    InvalidLease,

    /// The device registry could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchedulerError {
    /// Creates a busy error.
    pub fn busy(reason: impl Into<String>) -> Self {
        Self::Busy {
            reason: reason.into(),
        }
    }
}

/// Errors from the parameter service.
#[derive(Debug, Error)]
pub enum ParamError {
    /// The requested value is outside the parameter's range.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Polling could not be paused within the bracket budget (HTTP 503).
    #[error("device bus busy: {reason}")]
    Busy {
        /// Why the bracket was refused.
        reason: String,
    },

    /// The device transaction failed (HTTP 503).
    #[error(transparent)]
    Modbus(#[from] ModbusError),
}

impl From<SchedulerError> for ParamError {
    fn from(err: SchedulerError) -> Self {
        ParamError::Busy {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_busy_maps_to_param_busy() {
        let err: ParamError = SchedulerError::busy("pause timed out").into();
        assert!(matches!(err, ParamError::Busy { .. }));
    }
}
