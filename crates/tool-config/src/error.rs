//! Error types for `toolgate-tool-config`.

use thiserror::Error;

/// Main error type for tool-configuration handling.
#[derive(Error, Debug)]
pub enum ToolConfigError {
    /// The external converter failed: nonzero exit, timeout, or a missing
    /// output artifact after a clean exit.
    #[error("converter error: {0}")]
    ExternalTool(String),

    /// A document is missing sections the pipeline requires.
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// IO errors (temp staging, reading converter output).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for tool-configuration operations.
pub type Result<T> = std::result::Result<T, ToolConfigError>;
