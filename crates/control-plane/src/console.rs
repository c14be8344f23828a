//! Typed operations against the self-hosted gateway console.
//!
//! Every locate returns an explicit `Option<RemoteState>`: a `NotFound` from
//! the transport is discriminated absence, not an error. Updates always carry
//! the most recently observed version incremented by one; the console rejects
//! anything else.

use crate::error::{ControlPlaneError, Result};
use crate::retry::RetryPolicy;
use crate::transport::{ApiRequest, Transport};
use serde::Serialize;
use serde_json::{Value, json};

/// Remote resource state as observed at locate time. `version` is opaque and
/// control-plane-owned; it is only ever echoed back incremented by one.
#[derive(Debug, Clone)]
pub struct RemoteState {
    pub id: String,
    pub version: i64,
    pub fields: Value,
}

impl RemoteState {
    /// Extracts state from a console response body, unwrapping the `data`
    /// envelope some endpoints use.
    #[must_use]
    pub fn from_response(body: Value, fallback_id: &str) -> Option<Self> {
        let fields = match body {
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Object(inner)) => Value::Object(inner),
                Some(Value::Null) | None => Value::Object(map),
                Some(_) => return None,
            },
            _ => return None,
        };
        let id = fields
            .get("name")
            .or_else(|| fields.get("id"))
            .and_then(Value::as_str)
            .unwrap_or(fallback_id)
            .to_string();
        let version = fields.get("version").and_then(Value::as_i64).unwrap_or(0);
        Some(Self {
            id,
            version,
            fields,
        })
    }
}

/// Desired consumer credential, fixed to the bearer key-auth shape the
/// gateway plugin expects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerCredential {
    pub values: Vec<String>,
    pub source: String,
    #[serde(rename = "type")]
    pub credential_type: String,
}

impl ConsumerCredential {
    #[must_use]
    pub fn bearer_key(token: impl Into<String>) -> Self {
        Self {
            values: vec![token.into()],
            source: "BEARER".to_string(),
            credential_type: "key-auth".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerSpec {
    pub name: String,
    pub credentials: Vec<ConsumerCredential>,
}

#[derive(Debug, Clone)]
pub struct ServiceSourceSpec {
    pub name: String,
    /// Backend address including port (`host:port`).
    pub domain: String,
    pub protocol: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ConsoleRouteSpec {
    pub name: String,
    pub path_prefix: String,
    pub auth_enabled: bool,
    pub allowed_consumers: Vec<String>,
    /// Backend service reference, e.g. `weather.static:80`.
    pub service_ref: String,
}

#[derive(Debug, Clone)]
pub struct PluginInstanceSpec {
    pub route: String,
    pub plugin_name: String,
    pub raw_configurations: String,
}

/// Typed console client over any [`Transport`], with bounded retry for
/// transient failures on every call.
pub struct ConsoleApi<'a> {
    transport: &'a dyn Transport,
    retry: RetryPolicy,
}

impl<'a> ConsoleApi<'a> {
    #[must_use]
    pub fn new(transport: &'a dyn Transport, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    async fn run(&self, req: ApiRequest) -> Result<Value> {
        let label = req.to_string();
        self.retry
            .run(&label, || self.transport.execute(req.clone()))
            .await
    }

    async fn locate(&self, req: ApiRequest, id: &str) -> Result<Option<RemoteState>> {
        match self.run(req).await {
            Ok(body) => Ok(RemoteState::from_response(body, id)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_consumer(&self, name: &str) -> Result<Option<RemoteState>> {
        self.locate(ApiRequest::get(format!("/v1/consumers/{name}")), name)
            .await
    }

    pub async fn create_consumer(&self, spec: &ConsumerSpec) -> Result<Value> {
        let body = json!({
            "name": spec.name,
            "credentials": spec.credentials,
            "version": 0,
        });
        self.run(ApiRequest::post("/v1/consumers", body)).await
    }

    pub async fn update_consumer(&self, spec: &ConsumerSpec, current_version: i64) -> Result<Value> {
        let body = json!({
            "name": spec.name,
            "credentials": spec.credentials,
            "version": current_version + 1,
        });
        self.run(ApiRequest::put(format!("/v1/consumers/{}", spec.name), body))
            .await
    }

    pub async fn get_service_source(&self, name: &str) -> Result<Option<RemoteState>> {
        self.locate(ApiRequest::get(format!("/v1/service-sources/{name}")), name)
            .await
    }

    fn service_source_body(spec: &ServiceSourceSpec, version: Option<i64>) -> Value {
        let mut body = json!({
            "type": "static",
            "name": spec.name,
            "domain": spec.domain,
            "domainForEdit": spec.domain,
            "protocol": spec.protocol,
            "port": spec.port,
            "sni": null,
        });
        if let (Some(v), Some(map)) = (version, body.as_object_mut()) {
            map.insert("version".to_string(), json!(v));
        }
        body
    }

    pub async fn create_service_source(&self, spec: &ServiceSourceSpec) -> Result<Value> {
        let body = Self::service_source_body(spec, None);
        self.run(ApiRequest::post("/v1/service-sources", body)).await
    }

    pub async fn update_service_source(
        &self,
        spec: &ServiceSourceSpec,
        current_version: i64,
    ) -> Result<Value> {
        let body = Self::service_source_body(spec, Some(current_version + 1));
        self.run(ApiRequest::put(
            format!("/v1/service-sources/{}", spec.name),
            body,
        ))
        .await
    }

    pub async fn get_route(&self, name: &str) -> Result<Option<RemoteState>> {
        self.locate(ApiRequest::get(format!("/v1/routes/{name}")), name)
            .await
    }

    fn route_body(spec: &ConsoleRouteSpec, version: Option<i64>) -> Value {
        let mut body = json!({
            "name": spec.name,
            "path": {
                "matchType": "PRE",
                "matchValue": spec.path_prefix,
                "caseSensitive": true,
            },
            "authConfig": {
                "enabled": spec.auth_enabled,
                "allowedConsumers": spec.allowed_consumers,
            },
            "services": [{ "name": spec.service_ref }],
        });
        if let (Some(v), Some(map)) = (version, body.as_object_mut()) {
            map.insert("version".to_string(), json!(v));
        }
        body
    }

    pub async fn create_route(&self, spec: &ConsoleRouteSpec) -> Result<Value> {
        self.run(ApiRequest::post("/v1/routes", Self::route_body(spec, None)))
            .await
    }

    pub async fn update_route(&self, spec: &ConsoleRouteSpec, current_version: i64) -> Result<Value> {
        self.run(ApiRequest::put(
            format!("/v1/routes/{}", spec.name),
            Self::route_body(spec, Some(current_version + 1)),
        ))
        .await
    }

    pub async fn get_plugin_instance(
        &self,
        route: &str,
        plugin_name: &str,
    ) -> Result<Option<RemoteState>> {
        self.locate(
            ApiRequest::get(format!("/v1/routes/{route}/plugin-instances/{plugin_name}")),
            plugin_name,
        )
        .await
    }

    /// Creates or updates the plugin instance; the same PUT endpoint serves
    /// both, distinguished only by the carried version.
    pub async fn put_plugin_instance(
        &self,
        spec: &PluginInstanceSpec,
        version: Option<i64>,
    ) -> Result<Value> {
        let body = json!({
            "version": version,
            "scope": "ROUTE",
            "target": spec.route,
            "targets": { "ROUTE": spec.route },
            "pluginName": spec.plugin_name,
            "enabled": true,
            "rawConfigurations": spec.raw_configurations,
        });
        self.run(ApiRequest::put(
            format!("/v1/routes/{}/plugin-instances/{}", spec.route, spec.plugin_name),
            body,
        ))
        .await
    }
}

/// Fails when a successful response is missing a field the caller requires.
pub fn require_str(body: &Value, field: &str, operation: &str) -> Result<String> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ControlPlaneError::Malformed {
            operation: operation.to_string(),
            message: format!("response is missing '{field}'"),
        })
}
