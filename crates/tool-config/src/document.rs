//! The compiled tool-configuration document.
//!
//! Only the fields the patcher touches are modeled; everything else the
//! converter emits round-trips untouched through the `extra` maps. The
//! patcher must never destroy converter output it does not understand.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSection>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolEntry>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Server-level key/value configuration the gateway exposes to request
    /// templates as `{{.config.<key>}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, serde_yaml::Value>>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(
        rename = "requestTemplate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_template: Option<RequestTemplate>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderEntry>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

impl ToolConfigDocument {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Base64 of the YAML rendering, as the cloud attachment payload expects.
    pub fn to_base64(&self) -> Result<String> {
        use base64::Engine as _;
        let yaml = self.to_yaml_string()?;
        Ok(base64::engine::general_purpose::STANDARD.encode(yaml))
    }
}
