//! Reconcilers for the self-hosted console resource kinds.

use super::vanished_after_conflict;
use crate::error::Result;
use crate::report::ReconcileOutcome;
use serde_json::Value;
use toolgate_control_plane::{
    ConsoleApi, ConsoleRouteSpec, ConsumerSpec, PluginInstanceSpec, ServiceSourceSpec,
};

/// Consumer reconciliation is create-first: consumers are rarely
/// pre-enumerated, so the create call's own conflict signal doubles as the
/// existence check.
pub async fn reconcile_consumer(
    api: &ConsoleApi<'_>,
    spec: &ConsumerSpec,
) -> Result<ReconcileOutcome> {
    match api.create_consumer(spec).await {
        Ok(_) => {
            tracing::info!(consumer = %spec.name, "created consumer");
            Ok(ReconcileOutcome::Created {
                id: spec.name.clone(),
            })
        }
        Err(e) if e.is_conflict() => {
            tracing::debug!(consumer = %spec.name, "consumer exists, updating");
            let current = api
                .get_consumer(&spec.name)
                .await?
                .ok_or_else(|| vanished_after_conflict(&format!("consumer '{}'", spec.name)))?;
            api.update_consumer(spec, current.version).await?;
            Ok(ReconcileOutcome::Updated {
                id: spec.name.clone(),
                new_version: Some(current.version + 1),
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn service_source_matches(fields: &Value, spec: &ServiceSourceSpec) -> bool {
    fields.get("domain").and_then(Value::as_str) == Some(spec.domain.as_str())
        && fields.get("protocol").and_then(Value::as_str) == Some(spec.protocol.as_str())
        && fields.get("port").and_then(Value::as_u64) == Some(u64::from(spec.port))
}

pub async fn reconcile_service_source(
    api: &ConsoleApi<'_>,
    spec: &ServiceSourceSpec,
    force_update: bool,
) -> Result<ReconcileOutcome> {
    let located = match api.get_service_source(&spec.name).await? {
        Some(current) => Some(current),
        None => match api.create_service_source(spec).await {
            Ok(_) => {
                tracing::info!(source = %spec.name, domain = %spec.domain, "created service source");
                return Ok(ReconcileOutcome::Created {
                    id: spec.name.clone(),
                });
            }
            // Race-lost create: the resource existing is not a failure.
            Err(e) if e.is_conflict() => api.get_service_source(&spec.name).await?,
            Err(e) => return Err(e.into()),
        },
    };
    let current = located
        .ok_or_else(|| vanished_after_conflict(&format!("service source '{}'", spec.name)))?;

    if !force_update && service_source_matches(&current.fields, spec) {
        return Ok(ReconcileOutcome::Unchanged { id: current.id });
    }
    api.update_service_source(spec, current.version).await?;
    tracing::info!(source = %spec.name, version = current.version + 1, "updated service source");
    Ok(ReconcileOutcome::Updated {
        id: current.id,
        new_version: Some(current.version + 1),
    })
}

fn route_matches(fields: &Value, spec: &ConsoleRouteSpec) -> bool {
    let path_ok =
        fields.pointer("/path/matchValue").and_then(Value::as_str) == Some(spec.path_prefix.as_str());
    let service_ok = fields
        .pointer("/services/0/name")
        .and_then(Value::as_str)
        == Some(spec.service_ref.as_str());
    let consumers: Vec<&str> = fields
        .pointer("/authConfig/allowedConsumers")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let auth_ok = fields
        .pointer("/authConfig/enabled")
        .and_then(Value::as_bool)
        == Some(spec.auth_enabled)
        && consumers == spec.allowed_consumers.iter().map(String::as_str).collect::<Vec<_>>();
    path_ok && service_ok && auth_ok
}

pub async fn reconcile_route(
    api: &ConsoleApi<'_>,
    spec: &ConsoleRouteSpec,
    force_update: bool,
) -> Result<ReconcileOutcome> {
    let located = match api.get_route(&spec.name).await? {
        Some(current) => Some(current),
        None => match api.create_route(spec).await {
            Ok(_) => {
                tracing::info!(route = %spec.name, path = %spec.path_prefix, "created route");
                return Ok(ReconcileOutcome::Created {
                    id: spec.name.clone(),
                });
            }
            Err(e) if e.is_conflict() => api.get_route(&spec.name).await?,
            Err(e) => return Err(e.into()),
        },
    };
    let current =
        located.ok_or_else(|| vanished_after_conflict(&format!("route '{}'", spec.name)))?;

    if !force_update && route_matches(&current.fields, spec) {
        return Ok(ReconcileOutcome::Unchanged { id: current.id });
    }
    api.update_route(spec, current.version).await?;
    tracing::info!(route = %spec.name, version = current.version + 1, "updated route");
    Ok(ReconcileOutcome::Updated {
        id: current.id,
        new_version: Some(current.version + 1),
    })
}

/// The plugin instance endpoint is PUT for create and update alike; only the
/// carried version differs.
pub async fn reconcile_plugin_instance(
    api: &ConsoleApi<'_>,
    spec: &PluginInstanceSpec,
    force_update: bool,
) -> Result<ReconcileOutcome> {
    match api.get_plugin_instance(&spec.route, &spec.plugin_name).await? {
        None => {
            api.put_plugin_instance(spec, None).await?;
            tracing::info!(route = %spec.route, plugin = %spec.plugin_name, "attached plugin instance");
            Ok(ReconcileOutcome::Created {
                id: spec.plugin_name.clone(),
            })
        }
        Some(current) => {
            let unchanged = current
                .fields
                .get("rawConfigurations")
                .and_then(Value::as_str)
                == Some(spec.raw_configurations.as_str());
            if unchanged && !force_update {
                return Ok(ReconcileOutcome::Unchanged { id: current.id });
            }
            api.put_plugin_instance(spec, Some(current.version + 1)).await?;
            tracing::info!(
                route = %spec.route,
                plugin = %spec.plugin_name,
                version = current.version + 1,
                "updated plugin instance"
            );
            Ok(ReconcileOutcome::Updated {
                id: current.id,
                new_version: Some(current.version + 1),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn route_spec() -> ConsoleRouteSpec {
        ConsoleRouteSpec {
            name: "weather".to_string(),
            path_prefix: "/weather".to_string(),
            auth_enabled: true,
            allowed_consumers: vec!["toolgate".to_string()],
            service_ref: "weather.static:80".to_string(),
        }
    }

    #[test]
    fn route_comparison_covers_owned_fields() {
        let fields = json!({
            "path": {"matchType": "PRE", "matchValue": "/weather"},
            "authConfig": {"enabled": true, "allowedConsumers": ["toolgate"]},
            "services": [{"name": "weather.static:80"}],
        });
        assert!(route_matches(&fields, &route_spec()));

        let mut moved = fields.clone();
        moved["path"]["matchValue"] = json!("/forecast");
        assert!(!route_matches(&moved, &route_spec()));

        let mut consumers = fields.clone();
        consumers["authConfig"]["allowedConsumers"] = json!(["someone-else"]);
        assert!(!route_matches(&consumers, &route_spec()));
    }

    #[test]
    fn service_source_comparison_covers_owned_fields() {
        let spec = ServiceSourceSpec {
            name: "weather".to_string(),
            domain: "10.0.0.1:8000".to_string(),
            protocol: "http".to_string(),
            port: 80,
        };
        let fields = json!({"domain": "10.0.0.1:8000", "protocol": "http", "port": 80});
        assert!(service_source_matches(&fields, &spec));
        let drifted = json!({"domain": "10.0.0.9:8000", "protocol": "http", "port": 80});
        assert!(!service_source_matches(&drifted, &spec));
    }
}
