//! Idempotent reconciliation engine that exposes registry-declared tool
//! APIs through a gateway.
//!
//! The registry names the tool units; for each one the pipeline reconciles
//! the gateway resources the unit depends on (service, route, plugin
//! configuration) with create-or-update semantics, tolerating concurrent
//! creators and isolating failures to the unit they occurred in.

pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod spec_source;

pub use error::{ProvisionError, Result};
pub use pipeline::{
    CleanupReport, CloudPipeline, CloudPipelineOptions, StandalonePipeline,
    StandalonePipelineOptions, TOOL_PLUGIN_CLASS, cleanup,
};
pub use registry::{ToolUnit, load_units, units_from_str};
pub use report::{ReconcileOutcome, RunReport, RunStatus, ToolResult};
pub use spec_source::{HttpSpecSource, SpecSource};
