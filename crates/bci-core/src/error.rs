//! Error handling for the BCI pipeline
//!
//! The signal-processing core recovers degenerate statistics locally, so the
//! variants here describe boundary and persistence failures only.

use thiserror::Error;

/// Result type alias for BCI operations
pub type BciResult<T> = Result<T, BciError>;

/// Error type shared by every crate in the workspace
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BciError {
    /// Request rejected before reaching the core (bad shapes, missing fields)
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Description of the rejected input
        reason: String,
    },

    /// Configuration value outside its valid range
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error
        reason: String,
    },

    /// Persisted entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity looked up ("session", "trial", ...)
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Persistence operation could not be completed
    #[error("Operation failed: {reason}")]
    OperationFailed {
        /// Failure description
        reason: String,
    },
}

impl BciError {
    /// Shorthand for boundary validation failures
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        BciError::InvalidInput { reason: reason.into() }
    }

    /// Shorthand for configuration failures
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        BciError::InvalidConfig { reason: reason.into() }
    }

    /// True for the "not found" persistence condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, BciError::NotFound { .. })
    }
}

/// Convenience macro for creating input validation errors
#[macro_export]
macro_rules! input_error {
    ($($arg:tt)*) => {
        $crate::error::BciError::InvalidInput {
            reason: format!($($arg)*),
        }
    };
}
