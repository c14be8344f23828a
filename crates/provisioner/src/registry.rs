//! Registry document parsing.
//!
//! The registry is a JSON object with an `mcpServers` map; only the keys
//! matter here. Each key becomes one tool unit. JSON object keys are unique,
//! which is what guarantees unit-name uniqueness within a run; the map is
//! read into a `BTreeMap` so unit order is deterministic.

use crate::error::{ProvisionError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// One named entry from the registry: a single tool API to expose.
/// Immutable once derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUnit {
    pub name: String,
    pub openapi_spec_url: String,
}

#[derive(Debug, Deserialize)]
struct RegistryDocument {
    #[serde(rename = "mcpServers", default)]
    mcp_servers: BTreeMap<String, serde_json::Value>,
}

/// Derives the run's tool units from a registry document string.
pub fn units_from_str(registry_json: &str, openapi_base_url: &str) -> Result<Vec<ToolUnit>> {
    let doc: RegistryDocument = serde_json::from_str(registry_json)
        .map_err(|e| ProvisionError::Registry(format!("invalid registry document: {e}")))?;
    let base = openapi_base_url.trim_end_matches('/');
    Ok(doc
        .mcp_servers
        .into_keys()
        .map(|name| {
            let openapi_spec_url = format!("{base}/{name}/openapi.json");
            ToolUnit {
                name,
                openapi_spec_url,
            }
        })
        .collect())
}

/// Reads and parses the registry file.
pub fn load_units(path: &Path, openapi_base_url: &str) -> Result<Vec<ToolUnit>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ProvisionError::Registry(format!("read registry '{}': {e}", path.display()))
    })?;
    let units = units_from_str(&raw, openapi_base_url)?;
    tracing::info!(
        registry = %path.display(),
        count = units.len(),
        "loaded tool units"
    );
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerates_registry_keys_in_order() {
        let units = units_from_str(
            r#"{"mcpServers": {"weather": {"command": "ignored"}, "translate": {}}}"#,
            "http://127.0.0.1:8000/",
        )
        .expect("units");
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "translate");
        assert_eq!(
            units[0].openapi_spec_url,
            "http://127.0.0.1:8000/translate/openapi.json"
        );
        assert_eq!(units[1].name, "weather");
    }

    #[test]
    fn missing_section_yields_no_units() {
        let units = units_from_str(r#"{"other": {}}"#, "http://h").expect("units");
        assert!(units.is_empty());
    }

    #[test]
    fn invalid_json_is_a_registry_error() {
        let err = units_from_str("not json", "http://h").unwrap_err();
        assert!(matches!(err, ProvisionError::Registry(_)));
    }
}
