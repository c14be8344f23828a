//! Reconcile outcomes and the per-run report.

use serde::Serialize;
use std::fmt;

/// Result of one reconciler call. Exactly one outcome is recorded per call;
/// errors escaping a reconciler are converted to `Failed` at the unit
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ReconcileOutcome {
    Created { id: String },
    /// `new_version` is `None` for resource kinds whose control plane does
    /// not expose a client-visible version (cloud routes, attachments).
    Updated {
        id: String,
        new_version: Option<i64>,
    },
    Unchanged { id: String },
    Failed { reason: String },
}

impl ReconcileOutcome {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, ReconcileOutcome::Failed { .. })
    }

    /// Resource id, when the outcome carries one.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            ReconcileOutcome::Created { id }
            | ReconcileOutcome::Updated { id, .. }
            | ReconcileOutcome::Unchanged { id } => Some(id),
            ReconcileOutcome::Failed { .. } => None,
        }
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Created { id } => write!(f, "created ({id})"),
            ReconcileOutcome::Updated {
                id,
                new_version: Some(v),
            } => write!(f, "updated ({id} v{v})"),
            ReconcileOutcome::Updated {
                id,
                new_version: None,
            } => write!(f, "updated ({id})"),
            ReconcileOutcome::Unchanged { id } => write!(f, "unchanged ({id})"),
            ReconcileOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// One tool unit's full pipeline outcome.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub name: String,
    pub service: Option<ReconcileOutcome>,
    pub route: Option<ReconcileOutcome>,
    pub plugin: Option<ReconcileOutcome>,
    pub error: Option<String>,
}

impl ToolResult {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Overall run status derived from the per-unit results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    AllSucceeded,
    Partial,
    AllFailed,
    NoUnits,
}

/// Ordered sequence of tool results for one run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub results: Vec<ToolResult>,
}

impl RunReport {
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.len() - self.succeeded_count()
    }

    #[must_use]
    pub fn status(&self) -> RunStatus {
        if self.results.is_empty() {
            return RunStatus::NoUnits;
        }
        match (self.succeeded_count(), self.failed_count()) {
            (_, 0) => RunStatus::AllSucceeded,
            (0, _) => RunStatus::AllFailed,
            _ => RunStatus::Partial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reflects_counts() {
        let mut report = RunReport::default();
        assert_eq!(report.status(), RunStatus::NoUnits);

        report.results.push(ToolResult::new("weather"));
        assert_eq!(report.status(), RunStatus::AllSucceeded);

        let mut failed = ToolResult::new("translate");
        failed.error = Some("fetch failed".to_string());
        report.results.push(failed);
        assert_eq!(report.status(), RunStatus::Partial);
        assert_eq!(report.succeeded_count(), 1);
        assert_eq!(report.failed_count(), 1);

        report.results.remove(0);
        assert_eq!(report.status(), RunStatus::AllFailed);
    }
}
