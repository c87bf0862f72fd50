//! Error types for the parking pricing system.

use crate::types::{LotId, TimestampMs};
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the parking pricing system.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range observation field.
    #[error("Input validation error: {0}")]
    InputValidation(String),

    /// Observation older than the lot's last committed timestamp.
    #[error("Ordering violation for lot {lot_id}: timestamp {timestamp} precedes {last_timestamp}")]
    OrderingViolation {
        lot_id: LotId,
        timestamp: TimestampMs,
        last_timestamp: TimestampMs,
    },

    /// Configuration error (missing option, missing canonical column, bad value).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pricing formula produced a non-finite or non-positive value.
    #[error("Computation overflow: {0}")]
    ComputationOverflow(String),

    /// Observation source failure (unreadable file, broken row framing).
    #[error("Source error: {0}")]
    Source(String),

    /// Results export failure.
    #[error("Export error: {0}")]
    Export(String),

    /// Engine used outside its lifecycle (e.g. processing after Done).
    #[error("Invalid engine state: {0}")]
    State(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Create an input validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::InputValidation(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a computation overflow error.
    pub fn overflow(msg: impl Into<String>) -> Self {
        Error::ComputationOverflow(msg.into())
    }

    /// Create a source error.
    pub fn reader(msg: impl Into<String>) -> Self {
        Error::Source(msg.into())
    }

    /// Create an export error.
    pub fn export(msg: impl Into<String>) -> Self {
        Error::Export(msg.into())
    }

    /// Create an engine state error.
    pub fn state(msg: impl Into<String>) -> Self {
        Error::State(msg.into())
    }

    /// Whether the error only affects a single observation.
    ///
    /// Recoverable errors are counted and the replay continues; everything
    /// else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InputValidation(_)
                | Error::OrderingViolation { .. }
                | Error::ComputationOverflow(_)
        )
    }
}
