//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic, local failure. Nothing here is transient,
/// so callers should translate rather than retry (except `Conflict`, which means
/// "reload and try again").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (negative quantity/price, missing required field, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Operation not allowed in the current state (e.g. editing a sent invoice).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Lifecycle transition not present in the transition table.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Payment amount differs from the outstanding total.
    #[error("payment amount {actual} does not match outstanding total {expected}")]
    AmountMismatch { expected: Decimal, actual: Decimal },

    /// Referenced invoice/deliverable/phase does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Concurrent modification or duplicate creation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_transition(from: impl core::fmt::Display, to: impl core::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn amount_mismatch(expected: Decimal, actual: Decimal) -> Self {
        Self::AmountMismatch { expected, actual }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
