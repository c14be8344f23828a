//! Canned OpenAPI spec source with per-unit failure injection.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use toolgate_provisioner::registry::ToolUnit;
use toolgate_provisioner::spec_source::SpecSource;
use toolgate_provisioner::{ProvisionError, Result};

#[derive(Default)]
pub struct StaticSpecSource {
    specs: Mutex<BTreeMap<String, Value>>,
    failing: Mutex<HashSet<String>>,
}

impl StaticSpecSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, unit_name: &str, spec: Value) {
        self.specs.lock().insert(unit_name.to_string(), spec);
    }

    /// Registers a unit with a minimal valid OpenAPI document.
    pub fn insert_minimal(&self, unit_name: &str) {
        self.insert(
            unit_name,
            json!({
                "openapi": "3.0.0",
                "info": {"title": unit_name, "version": "1.0.0"},
                "paths": {format!("/v1/{unit_name}"): {"get": {"operationId": format!("call_{unit_name}")}}},
            }),
        );
    }

    /// Every fetch for this unit fails as if the spec server returned 404.
    pub fn fail_unit(&self, unit_name: &str) {
        self.failing.lock().insert(unit_name.to_string());
    }
}

#[async_trait]
impl SpecSource for StaticSpecSource {
    async fn fetch(&self, unit: &ToolUnit) -> Result<Value> {
        if self.failing.lock().contains(&unit.name) {
            return Err(ProvisionError::SpecFetch {
                url: unit.openapi_spec_url.clone(),
                message: "HTTP status client error (404 Not Found)".to_string(),
            });
        }
        self.specs
            .lock()
            .get(&unit.name)
            .cloned()
            .ok_or_else(|| ProvisionError::SpecFetch {
                url: unit.openapi_spec_url.clone(),
                message: "no spec registered for unit".to_string(),
            })
    }
}
