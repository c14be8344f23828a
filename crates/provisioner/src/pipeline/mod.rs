//! Pipeline orchestrators.
//!
//! One pipeline per control-plane flavor; both share the same contract:
//! run-level preconditions are resolved first and abort the whole run when
//! unmet, after which each tool unit is processed independently and a
//! failure in one unit never halts its siblings.

pub mod cloud;
pub mod standalone;

pub use cloud::{CleanupReport, CloudPipeline, CloudPipelineOptions, cleanup};
pub use standalone::{StandalonePipeline, StandalonePipelineOptions};

use crate::report::{ReconcileOutcome, ToolResult};

/// Plugin class name of the gateway's tool-config plugin.
pub const TOOL_PLUGIN_CLASS: &str = "mcp-server";

const DEFAULT_BACKEND_PORT: u16 = 8000;

/// Backend addresses default to the tool server port when the operator gave
/// a bare host.
pub(crate) fn with_default_port(host: &str) -> String {
    if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:{DEFAULT_BACKEND_PORT}")
    }
}

/// Records a unit failure: the first stage that produced no outcome gets the
/// `Failed` marker, and the unit's error string is set.
pub(crate) fn record_unit_failure(result: &mut ToolResult, reason: String) {
    let failed = ReconcileOutcome::Failed {
        reason: reason.clone(),
    };
    if result.service.is_none() {
        result.service = Some(failed);
    } else if result.route.is_none() {
        result.route = Some(failed);
    } else if result.plugin.is_none() {
        result.plugin = Some(failed);
    }
    result.error = Some(reason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_default_port() {
        assert_eq!(with_default_port("10.0.0.7"), "10.0.0.7:8000");
        assert_eq!(with_default_port("10.0.0.7:9000"), "10.0.0.7:9000");
    }

    #[test]
    fn failure_lands_in_first_open_stage() {
        let mut result = ToolResult::new("weather");
        result.service = Some(ReconcileOutcome::Created {
            id: "svc-1".to_string(),
        });
        record_unit_failure(&mut result, "route create denied".to_string());
        assert!(result.route.as_ref().is_some_and(ReconcileOutcome::is_failed));
        assert!(result.plugin.is_none());
        assert!(!result.succeeded());
    }
}
