// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core error types shared across the workspace.

use thiserror::Error;

// =============================================================================
// ValidationError
// =============================================================================

/// A field-level validation failure.
///
/// Surfaced by the API layer as HTTP 422.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed for '{field}': {message}")]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// What was wrong with it.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// BusError
// =============================================================================

/// Errors from the reading bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The bus has been closed (all senders dropped).
    #[error("reading bus closed")]
    Closed,
}
