// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured error taxonomy for store operations.
//!
//! Every store error falls into one of five kinds so callers can react
//! programmatically: retry on `Conflict`, surface `Validation` to the user,
//! treat `Storage` as fatal.

use thiserror::Error;

/// Errors surfaced by the element store and the operations built on it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced id does not exist (or is tombstoned where live data is required).
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate name, duplicate dependency, or concurrent-modification failure.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Immutable element, type mismatch, invalid status transition, cycle, or
    /// membership rule violation.
    #[error("constraint: {0}")]
    Constraint(String),

    /// Bad input: missing required field, out-of-range value, malformed patch.
    #[error("validation: {0}")]
    Validation(String),

    /// Corrupt row, unavailable FTS, or an underlying engine failure.
    #[error("storage: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(id.to_string())
    }

    /// True when retrying the same call could succeed (optimistic-concurrency
    /// failures and similar races).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(format!("json: {e}"))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
