//! Drives the external OpenAPI→tool-config converter.
//!
//! The converter is an opaque subprocess; its exit code alone is not trusted
//! as proof of success. A clean exit with no output artifact is still a
//! failure.

use crate::document::ToolConfigDocument;
use crate::error::{Result, ToolConfigError};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub struct Converter {
    program: PathBuf,
    timeout: Duration,
}

impl Converter {
    #[must_use]
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    /// Stages the OpenAPI document, runs the converter, and parses the
    /// produced tool-configuration document.
    pub async fn compile(&self, spec: &Value, server_name: &str) -> Result<ToolConfigDocument> {
        let staging = tempfile::Builder::new()
            .prefix(&format!("toolgate-{server_name}-"))
            .tempdir()?;
        let input = staging.path().join(format!("{server_name}.json"));
        let output = staging.path().join(format!("{server_name}.yaml"));
        tokio::fs::write(&input, serde_json::to_vec_pretty(spec)?).await?;

        tracing::debug!(
            converter = %self.program.display(),
            input = %input.display(),
            output = %output.display(),
            "running converter"
        );

        let child = Command::new(&self.program)
            .arg("--input")
            .arg(&input)
            .arg("--output")
            .arg(&output)
            .arg("--server-name")
            .arg(server_name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ToolConfigError::ExternalTool(format!(
                    "spawn '{}': {e}",
                    self.program.display()
                ))
            })?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ToolConfigError::ExternalTool(format!(
                    "converter timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ToolConfigError::ExternalTool(format!(
                "converter exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        // A clean exit without the artifact is still a converter failure.
        let yaml = match tokio::fs::read_to_string(&output).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolConfigError::ExternalTool(format!(
                    "converter exited cleanly but produced no output at {}",
                    output.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let doc = ToolConfigDocument::from_yaml_str(&yaml)?;
        if doc.tools.is_empty() {
            return Err(ToolConfigError::ConfigValidation(format!(
                "converter produced no tools for '{server_name}'"
            )));
        }
        Ok(doc)
    }
}
