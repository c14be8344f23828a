//! Typed operations against the cloud gateway API.
//!
//! Cloud responses wrap everything in a `{ code, message, data }` envelope;
//! [`CloudApi`] unwraps it once and classifies non-OK codes so reconcilers
//! only ever see typed errors. All list lookups are scoped to one gateway.

use crate::error::{ControlPlaneError, Result};
use crate::retry::RetryPolicy;
use crate::transport::{ApiRequest, Transport};
use serde_json::{Value, json};

/// Desired cloud service: a VIP-sourced backend with explicit addresses.
#[derive(Debug, Clone)]
pub struct CloudServiceSpec {
    pub name: String,
    pub addresses: Vec<String>,
}

/// Desired cloud route within an HTTP-API/environment scope.
#[derive(Debug, Clone)]
pub struct CloudRouteSpec {
    pub name: String,
    pub path_prefix: String,
    pub domain_id: String,
    pub environment_id: String,
    pub service_id: String,
}

pub struct CloudApi<'a> {
    transport: &'a dyn Transport,
    retry: RetryPolicy,
    gateway_id: String,
}

impl<'a> CloudApi<'a> {
    #[must_use]
    pub fn new(transport: &'a dyn Transport, retry: RetryPolicy, gateway_id: impl Into<String>) -> Self {
        Self {
            transport,
            retry,
            gateway_id: gateway_id.into(),
        }
    }

    #[must_use]
    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    async fn run(&self, req: ApiRequest) -> Result<Value> {
        let label = req.to_string();
        let body = self
            .retry
            .run(&label, || self.transport.execute(req.clone()))
            .await?;
        Self::unwrap_envelope(body, &label, &req.path)
    }

    /// Unwraps the `{ code, message, data }` envelope, classifying non-OK
    /// codes into typed errors.
    fn unwrap_envelope(body: Value, operation: &str, resource: &str) -> Result<Value> {
        let Some(obj) = body.as_object() else {
            return Err(ControlPlaneError::Malformed {
                operation: operation.to_string(),
                message: "response envelope is not a JSON object".to_string(),
            });
        };
        let code = obj.get("code").and_then(Value::as_str).unwrap_or("");
        if code == "Ok" || code == "200" {
            return Ok(obj.get("data").cloned().unwrap_or(Value::Null));
        }
        let message = obj
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if code.contains("NotFound") {
            return Err(ControlPlaneError::NotFound {
                resource: resource.to_string(),
            });
        }
        if code.starts_with("Conflict") || message.to_lowercase().contains("already exist") {
            return Err(ControlPlaneError::Conflict {
                resource: resource.to_string(),
            });
        }
        Err(ControlPlaneError::Api {
            operation: operation.to_string(),
            code: code.to_string(),
            message,
        })
    }

    fn items(data: &Value) -> Vec<Value> {
        data.get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    /// Generic name-scoped lookup used by all `find_*_by_name` operations.
    async fn find_items_by_name(
        &self,
        path: &str,
        name: &str,
        extra: &[(&str, &str)],
    ) -> Result<Vec<Value>> {
        let mut req = ApiRequest::get(path)
            .query("gatewayId", &self.gateway_id)
            .query("gatewayType", "AI")
            .query("name", name);
        for (k, v) in extra {
            req = req.query(*k, *v);
        }
        match self.run(req).await {
            Ok(data) => Ok(Self::items(&data)),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Scans the plugin catalog for the gateway's tool-config plugin.
    pub async fn find_plugin_id(&self, plugin_class: &str) -> Result<Option<String>> {
        let req = ApiRequest::get("/v1/plugins")
            .query("gatewayType", "AI")
            .query("includeBuiltinAiGateway", "true")
            .query("pageNumber", "0")
            .query("pageSize", "10");
        let data = self.run(req).await?;
        for item in Self::items(&data) {
            let class = item
                .pointer("/pluginClassInfo/name")
                .and_then(Value::as_str);
            if class == Some(plugin_class) {
                return Ok(item
                    .get("pluginId")
                    .and_then(Value::as_str)
                    .map(str::to_string));
            }
        }
        Ok(None)
    }

    /// Finds the MCP-typed HTTP API that all tool routes live under.
    pub async fn find_http_api_id(&self) -> Result<Option<String>> {
        let req = ApiRequest::get("/v1/http-apis")
            .query("gatewayId", &self.gateway_id)
            .query("gatewayType", "AI");
        let data = self.run(req).await?;
        for item in Self::items(&data) {
            if item.get("type").and_then(Value::as_str) != Some("MCP") {
                continue;
            }
            let versioned = item
                .get("versionedHttpApis")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for api in versioned {
                if api.get("type").and_then(Value::as_str) == Some("MCP") {
                    return Ok(api
                        .get("httpApiId")
                        .and_then(Value::as_str)
                        .map(str::to_string));
                }
            }
        }
        Ok(None)
    }

    /// Picks the default environment, falling back to the first one listed.
    pub async fn find_environment_id(&self) -> Result<Option<String>> {
        let req = ApiRequest::get("/v1/environments")
            .query("gatewayId", &self.gateway_id)
            .query("gatewayType", "AI");
        let data = self.run(req).await?;
        let items = Self::items(&data);
        let env = items
            .iter()
            .find(|e| e.get("default").and_then(Value::as_bool) == Some(true))
            .or_else(|| items.first());
        Ok(env.and_then(|e| {
            e.get("environmentId")
                .and_then(Value::as_str)
                .map(str::to_string)
        }))
    }

    pub async fn get_domain(&self, domain_id: &str) -> Result<Value> {
        self.run(ApiRequest::get(format!("/v1/domains/{domain_id}")))
            .await
    }

    pub async fn find_domain_id_by_name(&self, name: &str) -> Result<Option<String>> {
        let req = ApiRequest::get("/v1/domains")
            .query("gatewayType", "AI")
            .query("nameLike", name)
            .query("pageSize", "10")
            .query("pageNumber", "1");
        let data = self.run(req).await?;
        for item in Self::items(&data) {
            if item.get("name").and_then(Value::as_str) == Some(name) {
                return Ok(item
                    .get("domainId")
                    .and_then(Value::as_str)
                    .map(str::to_string));
            }
        }
        Ok(None)
    }

    pub async fn create_domain(&self, name: &str) -> Result<Value> {
        let body = json!({
            "name": name,
            "protocol": "HTTP",
            "gatewayType": "AI",
        });
        self.run(ApiRequest::post("/v1/domains", body)).await
    }

    pub async fn find_service_by_name(&self, name: &str) -> Result<Option<Value>> {
        let services = self.find_items_by_name("/v1/services", name, &[]).await?;
        Ok(services
            .into_iter()
            .find(|s| s.get("name").and_then(Value::as_str) == Some(name)))
    }

    /// Creates a service and returns its id. There is no service update
    /// endpoint; addresses are write-once from this client's point of view.
    pub async fn create_service(&self, spec: &CloudServiceSpec) -> Result<String> {
        let body = json!({
            "gatewayId": self.gateway_id,
            "sourceType": "VIP",
            "serviceConfigs": [{ "name": spec.name, "addresses": spec.addresses }],
        });
        let data = self.run(ApiRequest::post("/v1/services", body)).await?;
        data.get("serviceIds")
            .and_then(Value::as_array)
            .and_then(|ids| ids.first())
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ControlPlaneError::Malformed {
                operation: "POST /v1/services".to_string(),
                message: "create succeeded but no service id was returned".to_string(),
            })
    }

    pub async fn find_route_by_name(
        &self,
        http_api_id: &str,
        environment_id: &str,
        name: &str,
    ) -> Result<Option<Value>> {
        let routes = self
            .find_items_by_name(
                &format!("/v1/http-apis/{http_api_id}/routes"),
                name,
                &[("environmentId", environment_id)],
            )
            .await?;
        Ok(routes
            .into_iter()
            .find(|r| r.get("name").and_then(Value::as_str) == Some(name)))
    }

    pub async fn get_route(&self, http_api_id: &str, route_id: &str) -> Result<Value> {
        self.run(ApiRequest::get(format!(
            "/v1/http-apis/{http_api_id}/routes/{route_id}"
        )))
        .await
    }

    pub async fn list_routes(&self, http_api_id: &str, environment_id: &str) -> Result<Vec<Value>> {
        let req = ApiRequest::get(format!("/v1/http-apis/{http_api_id}/routes"))
            .query("gatewayId", &self.gateway_id)
            .query("gatewayType", "AI")
            .query("environmentId", environment_id);
        let data = self.run(req).await?;
        Ok(Self::items(&data))
    }

    pub async fn create_route(&self, http_api_id: &str, spec: &CloudRouteSpec) -> Result<String> {
        let body = json!({
            "domainIds": [spec.domain_id],
            "environmentId": spec.environment_id,
            "match": { "path": { "type": "Prefix", "value": spec.path_prefix } },
            "backendConfig": {
                "scene": "SingleService",
                "services": [{ "serviceId": spec.service_id }],
            },
            "mcpRouteConfig": { "protocol": "HTTP" },
            "name": spec.name,
            "description": spec.name,
        });
        let data = self
            .run(ApiRequest::post(
                format!("/v1/http-apis/{http_api_id}/routes"),
                body,
            ))
            .await?;
        data.get("routeId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ControlPlaneError::Malformed {
                operation: format!("POST /v1/http-apis/{http_api_id}/routes"),
                message: "create succeeded but no route id was returned".to_string(),
            })
    }

    /// Full-body route update. The caller carries forward the fields it read
    /// from the prior GET so unrelated settings survive the write.
    pub async fn update_route(
        &self,
        http_api_id: &str,
        route_id: &str,
        body: Value,
    ) -> Result<Value> {
        self.run(ApiRequest::put(
            format!("/v1/http-apis/{http_api_id}/routes/{route_id}"),
            body,
        ))
        .await
    }

    pub async fn delete_route(&self, http_api_id: &str, route_id: &str) -> Result<()> {
        self.run(ApiRequest::delete(format!(
            "/v1/http-apis/{http_api_id}/routes/{route_id}"
        )))
        .await?;
        Ok(())
    }

    pub async fn list_plugin_attachments(&self, plugin_id: &str) -> Result<Vec<Value>> {
        let req = ApiRequest::get("/v1/plugin-attachments")
            .query("gatewayId", &self.gateway_id)
            .query("gatewayType", "AI")
            .query("pluginId", plugin_id)
            .query("pageSize", "100")
            .query("pageNumber", "1");
        let data = self.run(req).await?;
        Ok(Self::items(&data))
    }

    pub async fn create_plugin_attachment(
        &self,
        plugin_id: &str,
        route_id: &str,
        plugin_config_b64: &str,
    ) -> Result<Value> {
        let body = json!({
            "pluginId": plugin_id,
            "pluginConfig": plugin_config_b64,
            "attachResourceType": "GatewayRoute",
            "attachResourceIds": [route_id],
            "gatewayId": self.gateway_id,
        });
        self.run(ApiRequest::post("/v1/plugin-attachments", body))
            .await
    }

    pub async fn update_plugin_attachment(
        &self,
        attachment_id: &str,
        route_ids: &[String],
        plugin_config_b64: &str,
    ) -> Result<Value> {
        let body = json!({
            "attachResourceIds": route_ids,
            "pluginConfig": plugin_config_b64,
            "enable": true,
        });
        self.run(ApiRequest::put(
            format!("/v1/plugin-attachments/{attachment_id}"),
            body,
        ))
        .await
    }

    pub async fn delete_plugin_attachment(&self, attachment_id: &str) -> Result<()> {
        self.run(ApiRequest::delete(format!(
            "/v1/plugin-attachments/{attachment_id}"
        )))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_unwraps_ok_codes() {
        let body = json!({"code": "Ok", "data": {"items": [1, 2]}});
        let data = CloudApi::unwrap_envelope(body, "op", "res").expect("ok");
        assert_eq!(data["items"][0], 1);

        let body = json!({"code": "200", "data": null});
        assert!(CloudApi::unwrap_envelope(body, "op", "res").expect("ok").is_null());
    }

    #[test]
    fn envelope_classifies_conflict() {
        let body = json!({"code": "Conflict.DomainExisted", "message": "domain * exists"});
        let err = CloudApi::unwrap_envelope(body, "op", "/v1/domains").unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn envelope_classifies_not_found() {
        let body = json!({"code": "NotFound.Route", "message": "no such route"});
        let err = CloudApi::unwrap_envelope(body, "op", "/v1/routes/x").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn not_found_wins_over_exist_phrasing() {
        // "does not exist" phrasing must not read as a create conflict.
        let body = json!({
            "code": "NotFound.Service",
            "message": "The specified service does not exist"
        });
        let err = CloudApi::unwrap_envelope(body, "op", "/v1/services").unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }

    #[test]
    fn bare_exist_phrasing_is_not_a_conflict() {
        let body = json!({"code": "InvalidParameter", "message": "domain may not exist"});
        let err = CloudApi::unwrap_envelope(body, "op", "/v1/domains").unwrap_err();
        assert!(matches!(err, ControlPlaneError::Api { .. }));
    }

    #[test]
    fn envelope_surfaces_other_codes_as_api_errors() {
        let body = json!({"code": "Forbidden", "message": "denied"});
        let err = CloudApi::unwrap_envelope(body, "op", "res").unwrap_err();
        assert!(matches!(err, ControlPlaneError::Api { .. }));
    }

    #[test]
    fn envelope_rejects_non_object() {
        let err = CloudApi::unwrap_envelope(json!([1, 2]), "op", "res").unwrap_err();
        assert!(matches!(err, ControlPlaneError::Malformed { .. }));
    }
}
