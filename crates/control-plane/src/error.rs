//! Error types for `toolgate-control-plane`.
//!
//! Classification happens at the transport boundary: callers above this layer
//! branch on typed variants (`NotFound`, `Conflict`) instead of matching
//! message strings.

use thiserror::Error;

/// Main error type for control-plane operations.
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    /// Transient transport failures (connection refused, timeout). The only
    /// retryable category.
    #[error("transport error: {0}")]
    Transport(String),

    /// The addressed resource does not exist. Drives the create path in
    /// reconcilers, never surfaced as a failure.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Creation raced with another creator. Drives re-locate, never surfaced
    /// as a failure.
    #[error("{resource} already exists")]
    Conflict { resource: String },

    /// The control plane rejected the request with a structured error code.
    #[error("{operation} rejected by control plane ({code}): {message}")]
    Api {
        operation: String,
        code: String,
        message: String,
    },

    /// Non-JSON response or a required field missing from an otherwise
    /// successful response.
    #[error("malformed response from {operation}: {message}")]
    Malformed { operation: String, message: String },

    /// IO errors (spawning the CLI proxy, reading its output).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ControlPlaneError {
    /// Whether a bounded retry may help. Only transport-level failures
    /// qualify; classification results are terminal decisions.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ControlPlaneError::Transport(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControlPlaneError::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControlPlaneError::Conflict { .. })
    }
}

/// Result type alias for control-plane operations.
pub type Result<T> = std::result::Result<T, ControlPlaneError>;
