//! Cloud transport: shell out to the vendor CLI.
//!
//! The cloud control plane is reached through the vendor's command-line
//! client (`<program> apig <METHOD> <endpoint> …`) rather than direct HTTP.
//! Stdout carries the JSON response; a nonzero exit is classified from
//! stderr at this boundary so callers never match on message strings.

use crate::error::{ControlPlaneError, Result};
use crate::transport::{ApiRequest, Transport};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub struct CliTransport {
    program: PathBuf,
    region: String,
    timeout: Duration,
}

impl CliTransport {
    #[must_use]
    pub fn new(program: PathBuf, region: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program,
            region: region.into(),
            timeout,
        }
    }

    fn command(&self, req: &ApiRequest) -> Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("apig")
            .arg(req.method.as_str())
            .arg(&req.path)
            .arg("--endpoint")
            .arg(format!("apig.{}.aliyuncs.com", self.region));
        for (key, value) in &req.query {
            cmd.arg(format!("--{key}")).arg(value);
        }
        if let Some(body) = &req.body {
            cmd.arg("--body").arg(serde_json::to_string(body)?);
        }
        cmd.arg("--header").arg("Content-Type=application/json;");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }

    fn classify_failure(req: &ApiRequest, stderr: &str) -> ControlPlaneError {
        let lower = stderr.to_lowercase();
        if lower.contains("already exist") || stderr.contains("Conflict.") {
            return ControlPlaneError::Conflict {
                resource: req.path.clone(),
            };
        }
        if stderr.contains("NotFound") {
            return ControlPlaneError::NotFound {
                resource: req.path.clone(),
            };
        }
        ControlPlaneError::Api {
            operation: req.to_string(),
            code: "CliError".to_string(),
            message: stderr.trim().to_string(),
        }
    }
}

#[async_trait]
impl Transport for CliTransport {
    async fn execute(&self, req: ApiRequest) -> Result<Value> {
        let mut cmd = self.command(&req)?;
        tracing::debug!(request = %req, program = %self.program.display(), "cloud CLI request");

        let child = cmd.spawn().map_err(|e| {
            ControlPlaneError::Transport(format!(
                "spawn '{}': {e}",
                self.program.display()
            ))
        })?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ControlPlaneError::Transport(format!(
                    "{req}: CLI call timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| ControlPlaneError::Transport(format!("{req}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::classify_failure(&req, &stderr));
        }

        if output.stdout.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&output.stdout).map_err(|e| ControlPlaneError::Malformed {
            operation: req.to_string(),
            message: format!("CLI stdout is not valid JSON: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ApiRequest;

    #[test]
    fn conflict_classified_from_stderr() {
        let req = ApiRequest::post("/v1/domains", serde_json::json!({"name": "*"}));
        let err = CliTransport::classify_failure(&req, "ErrorCode: Conflict.DomainExisted");
        assert!(err.is_conflict());

        let err = CliTransport::classify_failure(&req, "the domain already exists");
        assert!(err.is_conflict());
    }

    #[test]
    fn not_found_classified_from_stderr() {
        let req = ApiRequest::get("/v1/domains/d-123");
        let err = CliTransport::classify_failure(&req, "ErrorCode: NotFound.Domain");
        assert!(err.is_not_found());
    }

    #[test]
    fn other_failures_are_api_errors() {
        let req = ApiRequest::get("/v1/domains");
        let err = CliTransport::classify_failure(&req, "ErrorCode: Forbidden");
        assert!(matches!(err, ControlPlaneError::Api { .. }));
    }

    #[tokio::test]
    async fn timeout_kills_the_hung_cli() {
        use std::io::Write as _;
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempfile::tempdir().expect("tempdir");
        let pid_file = dir.path().join("pid");
        let script = dir.path().join("aliyun");
        let mut f = std::fs::File::create(&script).expect("create script");
        writeln!(f, "#!/bin/sh\necho $$ > {}\nsleep 30", pid_file.display()).expect("write script");
        drop(f);
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");

        let transport = CliTransport::new(script, "cn-hangzhou", Duration::from_millis(200));
        let err = transport.execute(ApiRequest::get("/v1/domains")).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .expect("pid file")
            .trim()
            .parse()
            .expect("pid");
        // The kill lands when the dropped child is reaped; poll briefly.
        for _ in 0..50 {
            match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                Err(_) => return,
                Ok(stat) if stat.contains(") Z ") => return,
                Ok(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
        panic!("CLI process survived the timeout");
    }
}
