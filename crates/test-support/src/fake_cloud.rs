//! Fake of the cloud gateway API.
//!
//! Answers every request with the cloud `{ code, message, data }` envelope,
//! so the real envelope classification in the client is exercised. Seeds one
//! gateway with a tool plugin, an MCP HTTP API and a default environment.

use crate::RecordedRequest;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use toolgate_control_plane::{ApiRequest, Method, Result, Transport};

pub const PLUGIN_ID: &str = "plugin-mcp-1";
pub const HTTP_API_ID: &str = "api-1";
pub const ENVIRONMENT_ID: &str = "env-1";

#[derive(Default)]
struct State {
    domains: Vec<Value>,
    services: Vec<Value>,
    routes: Vec<Value>,
    attachments: Vec<Value>,
    requests: Vec<RecordedRequest>,
    race_once: HashSet<String>,
    fail_paths: BTreeMap<String, String>,
    next_id: u64,
}

#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<State>,
}

fn ok(data: Value) -> Value {
    json!({"code": "Ok", "data": data})
}

fn conflict(resource: &str) -> Value {
    json!({
        "code": format!("Conflict.{resource}Existed"),
        "message": format!("{resource} already exist"),
    })
}

fn not_found(resource: &str) -> Value {
    json!({
        "code": "NotFound.Resource",
        "message": format!("{resource} not found"),
    })
}

fn items(list: Vec<Value>) -> Value {
    ok(json!({"items": list}))
}

fn query<'a>(req: &'a ApiRequest, key: &str) -> Option<&'a str> {
    req.query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

impl FakeCloud {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot create race on a collection path; see
    /// [`crate::FakeConsole::race_next_create`].
    pub fn race_next_create(&self, collection_path: &str) {
        self.state.lock().race_once.insert(collection_path.to_string());
    }

    pub fn fail_path(&self, fragment: &str, message: &str) {
        self.state
            .lock()
            .fail_paths
            .insert(fragment.to_string(), message.to_string());
    }

    #[must_use]
    pub fn services(&self) -> Vec<Value> {
        self.state.lock().services.clone()
    }

    #[must_use]
    pub fn routes(&self) -> Vec<Value> {
        self.state.lock().routes.clone()
    }

    #[must_use]
    pub fn attachments(&self) -> Vec<Value> {
        self.state.lock().attachments.clone()
    }

    #[must_use]
    pub fn domains(&self) -> Vec<Value> {
        self.state.lock().domains.clone()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    fn next_id(state: &mut State, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }

    fn handle(&self, req: &ApiRequest) -> Value {
        let mut state = self.state.lock();
        for (fragment, message) in &state.fail_paths {
            if req.path.contains(fragment.as_str()) {
                return json!({"code": "InternalError", "message": message});
            }
        }
        let segments: Vec<&str> = req.path.trim_start_matches('/').split('/').collect();
        match (req.method, segments.as_slice()) {
            (Method::Get, ["v1", "plugins"]) => items(vec![
                json!({
                    "pluginId": PLUGIN_ID,
                    "pluginClassInfo": {"name": "mcp-server", "version": "1.0.0"},
                }),
                json!({
                    "pluginId": "plugin-waf-1",
                    "pluginClassInfo": {"name": "waf", "version": "2.1.0"},
                }),
            ]),
            (Method::Get, ["v1", "http-apis"]) => items(vec![json!({
                "httpApiId": "api-group-1",
                "type": "MCP",
                "versionedHttpApis": [{"httpApiId": HTTP_API_ID, "type": "MCP"}],
            })]),
            (Method::Get, ["v1", "environments"]) => items(vec![json!({
                "environmentId": ENVIRONMENT_ID,
                "default": true,
            })]),

            (Method::Get, ["v1", "domains"]) => items(state.domains.clone()),
            (Method::Get, ["v1", "domains", id]) => {
                match state
                    .domains
                    .iter()
                    .find(|d| d["domainId"].as_str() == Some(id))
                {
                    Some(domain) => ok(domain.clone()),
                    None => not_found("domain"),
                }
            }
            (Method::Post, ["v1", "domains"]) => {
                let name = req.body.as_ref().and_then(|b| b["name"].as_str()).unwrap_or("");
                let raced = state.race_once.remove(&req.path);
                if state.domains.iter().any(|d| d["name"].as_str() == Some(name)) {
                    return conflict("Domain");
                }
                let id = Self::next_id(&mut state, "dom");
                state.domains.push(json!({"domainId": id, "name": name}));
                if raced {
                    return conflict("Domain");
                }
                ok(json!({"domainId": id}))
            }

            (Method::Get, ["v1", "services"]) => {
                let name = query(req, "name");
                let matched = state
                    .services
                    .iter()
                    .filter(|s| name.is_none() || s["name"].as_str() == name)
                    .cloned()
                    .collect();
                items(matched)
            }
            (Method::Post, ["v1", "services"]) => {
                let config = req
                    .body
                    .as_ref()
                    .map(|b| b["serviceConfigs"][0].clone())
                    .unwrap_or(Value::Null);
                let name = config["name"].as_str().unwrap_or("").to_string();
                let raced = state.race_once.remove(&req.path);
                if state.services.iter().any(|s| s["name"].as_str() == Some(name.as_str())) {
                    return conflict("Service");
                }
                let id = Self::next_id(&mut state, "svc");
                state.services.push(json!({
                    "serviceId": id,
                    "name": name,
                    "addresses": config["addresses"],
                    "sourceType": "VIP",
                }));
                if raced {
                    return conflict("Service");
                }
                ok(json!({"serviceIds": [id]}))
            }

            (Method::Get, ["v1", "http-apis", _, "routes"]) => {
                let name = query(req, "name");
                let matched = state
                    .routes
                    .iter()
                    .filter(|r| name.is_none() || r["name"].as_str() == name)
                    .cloned()
                    .collect();
                items(matched)
            }
            (Method::Post, ["v1", "http-apis", _, "routes"]) => {
                let body = req.body.clone().unwrap_or(Value::Null);
                let name = body["name"].as_str().unwrap_or("").to_string();
                let raced = state.race_once.remove(&req.path);
                if state.routes.iter().any(|r| r["name"].as_str() == Some(name.as_str())) {
                    return conflict("Route");
                }
                let id = Self::next_id(&mut state, "rt");
                let mut route = body;
                route["routeId"] = json!(id);
                state.routes.push(route);
                if raced {
                    return conflict("Route");
                }
                ok(json!({"routeId": id}))
            }
            (Method::Get, ["v1", "http-apis", _, "routes", id]) => {
                match state
                    .routes
                    .iter()
                    .find(|r| r["routeId"].as_str() == Some(id))
                {
                    Some(route) => ok(route.clone()),
                    None => not_found("route"),
                }
            }
            (Method::Put, ["v1", "http-apis", _, "routes", id]) => {
                let Some(route) = state
                    .routes
                    .iter_mut()
                    .find(|r| r["routeId"].as_str() == Some(id))
                else {
                    return not_found("route");
                };
                let mut updated = req.body.clone().unwrap_or(Value::Null);
                updated["routeId"] = json!(id);
                *route = updated;
                ok(Value::Null)
            }
            (Method::Delete, ["v1", "http-apis", _, "routes", id]) => {
                let before = state.routes.len();
                state.routes.retain(|r| r["routeId"].as_str() != Some(id));
                if state.routes.len() == before {
                    not_found("route")
                } else {
                    ok(Value::Null)
                }
            }

            (Method::Get, ["v1", "plugin-attachments"]) => {
                let plugin = query(req, "pluginId");
                let matched = state
                    .attachments
                    .iter()
                    .filter(|a| plugin.is_none() || a["pluginId"].as_str() == plugin)
                    .cloned()
                    .collect();
                items(matched)
            }
            (Method::Post, ["v1", "plugin-attachments"]) => {
                let body = req.body.clone().unwrap_or(Value::Null);
                let raced = state.race_once.remove(&req.path);
                let target = body["attachResourceIds"][0].clone();
                if state.attachments.iter().any(|a| a["attachResourceIds"]
                    .as_array()
                    .is_some_and(|ids| ids.contains(&target)))
                {
                    return conflict("PluginAttachment");
                }
                let id = Self::next_id(&mut state, "att");
                let mut attachment = body;
                attachment["attachmentId"] = json!(id);
                state.attachments.push(attachment);
                if raced {
                    return conflict("PluginAttachment");
                }
                ok(json!({"attachmentId": id}))
            }
            (Method::Put, ["v1", "plugin-attachments", id]) => {
                let Some(attachment) = state
                    .attachments
                    .iter_mut()
                    .find(|a| a["attachmentId"].as_str() == Some(id))
                else {
                    return not_found("plugin attachment");
                };
                if let Some(body) = &req.body {
                    attachment["attachResourceIds"] = body["attachResourceIds"].clone();
                    attachment["pluginConfig"] = body["pluginConfig"].clone();
                }
                ok(Value::Null)
            }
            (Method::Delete, ["v1", "plugin-attachments", id]) => {
                let before = state.attachments.len();
                state
                    .attachments
                    .retain(|a| a["attachmentId"].as_str() != Some(id));
                if state.attachments.len() == before {
                    not_found("plugin attachment")
                } else {
                    ok(Value::Null)
                }
            }

            _ => json!({
                "code": "NotImplemented",
                "message": format!("unhandled request: {req}"),
            }),
        }
    }
}

#[async_trait]
impl Transport for FakeCloud {
    async fn execute(&self, req: ApiRequest) -> Result<Value> {
        self.state.lock().requests.push(RecordedRequest {
            method: req.method.as_str().to_string(),
            path: req.path.clone(),
            body: req.body.clone(),
        });
        Ok(self.handle(&req))
    }
}
