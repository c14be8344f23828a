//! Error types for `toolgate-provisioner`.

use thiserror::Error;
use toolgate_control_plane::ControlPlaneError;
use toolgate_tool_config::ToolConfigError;

/// Main error type for provisioning operations.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Control-plane failures that were not absorbed as reconcile control
    /// flow.
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    /// Converter or document failures.
    #[error(transparent)]
    ToolConfig(#[from] ToolConfigError),

    /// Registry document problems (unreadable, wrong shape, no units).
    #[error("registry error: {0}")]
    Registry(String),

    /// OpenAPI spec fetch failures for one tool unit.
    #[error("failed to fetch OpenAPI spec from '{url}': {message}")]
    SpecFetch { url: String, message: String },

    /// A run-level precondition could not be resolved before per-unit
    /// processing began; aborts the whole run.
    #[error("precondition failed: {0}")]
    Precondition(String),
}

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;
