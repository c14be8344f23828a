//! Fake of the self-hosted gateway console.
//!
//! Resources live in a map keyed by their canonical path. Updates enforce
//! the console's version rule: a PUT must carry exactly the stored version
//! plus one, anything else is rejected. That makes version-monotonicity
//! violations loud in tests instead of silently absorbed.

use crate::RecordedRequest;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use toolgate_control_plane::{ApiRequest, ControlPlaneError, Method, Result, Transport};

#[derive(Debug, Clone)]
struct Stored {
    version: i64,
    body: Value,
}

#[derive(Default)]
struct State {
    resources: BTreeMap<String, Stored>,
    requests: Vec<RecordedRequest>,
    race_once: HashSet<String>,
    fail_paths: BTreeMap<String, String>,
}

#[derive(Default)]
pub struct FakeConsole {
    state: Mutex<State>,
}

impl FakeConsole {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot create race on a collection path: the next POST there
    /// stores the resource and still answers "already exists", as if a
    /// concurrent creator won.
    pub fn race_next_create(&self, collection_path: &str) {
        self.state.lock().race_once.insert(collection_path.to_string());
    }

    /// Any request whose path contains `fragment` fails with a control-plane
    /// rejection carrying `message`.
    pub fn fail_path(&self, fragment: &str, message: &str) {
        self.state
            .lock()
            .fail_paths
            .insert(fragment.to_string(), message.to_string());
    }

    #[must_use]
    pub fn resource(&self, path: &str) -> Option<Value> {
        self.state.lock().resources.get(path).map(|s| s.body.clone())
    }

    #[must_use]
    pub fn version_of(&self, path: &str) -> Option<i64> {
        self.state.lock().resources.get(path).map(|s| s.version)
    }

    #[must_use]
    pub fn resource_count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .resources
            .keys()
            .filter(|k| k.starts_with(prefix))
            .count()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Versions carried by the PUT bodies sent to `path`, in order.
    #[must_use]
    pub fn put_versions(&self, path: &str) -> Vec<i64> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == "PUT" && r.path == path)
            .filter_map(|r| r.body.as_ref()?.get("version")?.as_i64())
            .collect()
    }

    fn not_found(path: &str) -> ControlPlaneError {
        ControlPlaneError::NotFound {
            resource: path.to_string(),
        }
    }

    fn handle(&self, req: &ApiRequest) -> Result<Value> {
        let mut state = self.state.lock();
        for (fragment, message) in &state.fail_paths {
            if req.path.contains(fragment.as_str()) {
                return Err(ControlPlaneError::Api {
                    operation: req.to_string(),
                    code: "InternalError".to_string(),
                    message: message.clone(),
                });
            }
        }
        match req.method {
            Method::Get => state
                .resources
                .get(&req.path)
                .map(|s| s.body.clone())
                .ok_or_else(|| Self::not_found(&req.path)),
            Method::Post => {
                let body = req.body.clone().unwrap_or(Value::Null);
                let name = body
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ControlPlaneError::Api {
                        operation: req.to_string(),
                        code: "BadRequest".to_string(),
                        message: "create body has no name".to_string(),
                    })?
                    .to_string();
                let child = format!("{}/{name}", req.path);
                let raced = state.race_once.remove(&req.path);
                if state.resources.contains_key(&child) {
                    return Err(ControlPlaneError::Conflict { resource: child });
                }
                let version = body.get("version").and_then(Value::as_i64).unwrap_or(1);
                let mut stored_body = body;
                stored_body["version"] = json!(version);
                state.resources.insert(
                    child.clone(),
                    Stored {
                        version,
                        body: stored_body,
                    },
                );
                if raced {
                    return Err(ControlPlaneError::Conflict { resource: child });
                }
                Ok(Value::Null)
            }
            Method::Put => {
                let body = req.body.clone().unwrap_or(Value::Null);
                let carried = body.get("version").and_then(Value::as_i64);
                let upsert = req.path.contains("/plugin-instances/");
                match state.resources.get(&req.path) {
                    None if upsert && carried.is_none() => {
                        let mut stored_body = body;
                        stored_body["version"] = json!(1);
                        state.resources.insert(
                            req.path.clone(),
                            Stored {
                                version: 1,
                                body: stored_body,
                            },
                        );
                        Ok(Value::Null)
                    }
                    None => Err(Self::not_found(&req.path)),
                    Some(current) => {
                        let expected = current.version + 1;
                        if carried != Some(expected) {
                            return Err(ControlPlaneError::Api {
                                operation: req.to_string(),
                                code: "VersionMismatch".to_string(),
                                message: format!(
                                    "expected version {expected}, got {carried:?}"
                                ),
                            });
                        }
                        state.resources.insert(
                            req.path.clone(),
                            Stored {
                                version: expected,
                                body,
                            },
                        );
                        Ok(Value::Null)
                    }
                }
            }
            Method::Delete => state
                .resources
                .remove(&req.path)
                .map(|_| Value::Null)
                .ok_or_else(|| Self::not_found(&req.path)),
        }
    }
}

#[async_trait]
impl Transport for FakeConsole {
    async fn execute(&self, req: ApiRequest) -> Result<Value> {
        self.state.lock().requests.push(RecordedRequest {
            method: req.method.as_str().to_string(),
            path: req.path.clone(),
            body: req.body.clone(),
        });
        self.handle(&req)
    }
}
