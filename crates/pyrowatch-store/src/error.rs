// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Store error types.

use pyrowatch_core::error::ValidationError;
use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the device registry and reading store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist (HTTP 404).
    #[error("{what} not found")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// A uniqueness constraint was violated (HTTP 409).
    #[error("conflict: {message}")]
    Conflict {
        /// What collided.
        message: String,
    },

    /// The payload failed validation (HTTP 422).
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A stored value could not be decoded back into its domain type.
    #[error("corrupt record: {message}")]
    Decode {
        /// What failed to decode.
        message: String,
    },

    /// The database rejected the operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns `true` when a retry may succeed (the write-back buffer's
    /// retry policy keys off this).
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                !db.is_unique_violation() && !db.is_foreign_key_violation()
            }
            StoreError::Database(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        assert_eq!(StoreError::not_found("device 7").to_string(), "device 7 not found");
    }

    #[test]
    fn test_validation_is_not_transient() {
        let err = StoreError::Validation(ValidationError::new("name", "must not be empty"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
    }
}
