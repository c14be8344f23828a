//! In-memory control-plane fakes and fixtures for provisioner tests.
//!
//! The fakes implement the real [`Transport`] trait with state behind a
//! mutex, enforce the console's version discipline, and allow failure and
//! race injection, so pipeline tests exercise the genuine reconcile logic
//! end to end without a gateway.
//!
//! [`Transport`]: toolgate_control_plane::Transport

pub mod fake_cloud;
pub mod fake_console;
pub mod specs;

pub use fake_cloud::FakeCloud;
pub use fake_console::FakeConsole;
pub use specs::StaticSpecSource;

use serde_json::Value;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// One request as seen by a fake transport, for assertions on wire traffic.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
}

/// Writes an executable stand-in for the OpenAPI converter into `dir`.
///
/// The script honors the real argument contract (`--input`, `--output`,
/// `--server-name`) and emits a minimal tool-configuration document with one
/// tool whose request URL is absolute, so the patcher has something to
/// rewrite.
pub fn write_fake_converter(dir: &Path) -> std::io::Result<PathBuf> {
    let path = dir.join("openapi-to-mcp");
    let mut f = std::fs::File::create(&path)?;
    f.write_all(
        br#"#!/bin/sh
out=""
name=""
prev=""
for arg in "$@"; do
  case "$prev" in
    --output) out="$arg" ;;
    --server-name) name="$arg" ;;
  esac
  prev="$arg"
done
cat > "$out" <<EOF
server:
  name: $name
tools:
  - name: call_$name
    requestTemplate:
      url: https://upstream.example.com/v1/$name
EOF
"#,
    )?;
    drop(f);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(path)
}
