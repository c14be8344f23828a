//! OpenAPI spec retrieval for tool units.

use crate::error::{ProvisionError, Result};
use crate::registry::ToolUnit;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Fetches the OpenAPI document for one tool unit. A trait seam so pipelines
/// can be driven without a live spec server in tests.
#[async_trait]
pub trait SpecSource: Send + Sync {
    async fn fetch(&self, unit: &ToolUnit) -> Result<Value>;
}

/// Production source: plain HTTP GET of `<base>/<name>/openapi.json`.
pub struct HttpSpecSource {
    http: reqwest::Client,
}

impl HttpSpecSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProvisionError::SpecFetch {
                url: String::new(),
                message: format!("build http client: {e}"),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SpecSource for HttpSpecSource {
    async fn fetch(&self, unit: &ToolUnit) -> Result<Value> {
        let url = &unit.openapi_spec_url;
        tracing::debug!(unit = %unit.name, url, "fetching OpenAPI spec");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProvisionError::SpecFetch {
                url: url.clone(),
                message: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| ProvisionError::SpecFetch {
                url: url.clone(),
                message: e.to_string(),
            })?;
        resp.json().await.map_err(|e| ProvisionError::SpecFetch {
            url: url.clone(),
            message: format!("body is not valid JSON: {e}"),
        })
    }
}
