//! Reconcilers for the cloud gateway resource kinds.

use super::vanished_after_conflict;
use crate::error::{ProvisionError, Result};
use crate::report::ReconcileOutcome;
use serde_json::{Value, json};
use toolgate_control_plane::{CloudApi, CloudRouteSpec, CloudServiceSpec};

/// The gateway's wildcard domain name.
pub const WILDCARD_DOMAIN: &str = "*";

#[derive(Debug, Clone)]
pub struct DomainHandle {
    pub id: String,
    pub outcome: ReconcileOutcome,
}

/// The wildcard domain is a per-gateway singleton. A caller-supplied domain
/// id is verified and used as-is; otherwise locate-then-create, re-querying
/// when the create races with a concurrent creator.
pub async fn reconcile_domain(
    api: &CloudApi<'_>,
    requested_id: Option<&str>,
) -> Result<DomainHandle> {
    if let Some(id) = requested_id {
        let domain = api.get_domain(id).await.map_err(|e| {
            ProvisionError::Precondition(format!("requested domain id '{id}' is not usable: {e}"))
        })?;
        let name = domain.get("name").and_then(Value::as_str).unwrap_or("?");
        tracing::info!(domain_id = id, name, "using requested domain");
        return Ok(DomainHandle {
            id: id.to_string(),
            outcome: ReconcileOutcome::Unchanged { id: id.to_string() },
        });
    }

    if let Some(id) = api.find_domain_id_by_name(WILDCARD_DOMAIN).await? {
        tracing::debug!(domain_id = %id, "found existing wildcard domain");
        return Ok(DomainHandle {
            id: id.clone(),
            outcome: ReconcileOutcome::Unchanged { id },
        });
    }

    match api.create_domain(WILDCARD_DOMAIN).await {
        Ok(data) => {
            let id = data
                .get("domainId")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    ProvisionError::Precondition(
                        "wildcard domain created but no domain id was returned".to_string(),
                    )
                })?;
            tracing::info!(domain_id = %id, "created wildcard domain");
            Ok(DomainHandle {
                id: id.clone(),
                outcome: ReconcileOutcome::Created { id },
            })
        }
        Err(e) if e.is_conflict() => {
            // Race-lost create: someone else made the singleton first.
            tracing::warn!("wildcard domain creation raced, re-querying");
            let id = api
                .find_domain_id_by_name(WILDCARD_DOMAIN)
                .await?
                .ok_or_else(|| vanished_after_conflict("wildcard domain"))?;
            Ok(DomainHandle {
                id: id.clone(),
                outcome: ReconcileOutcome::Unchanged { id },
            })
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone)]
pub struct ServiceHandle {
    pub id: String,
    pub outcome: ReconcileOutcome,
}

fn service_id_of(service: &Value) -> Option<String> {
    service
        .get("serviceId")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn addresses_of(service: &Value) -> Vec<String> {
    service
        .get("addresses")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Services have no update endpoint: address drift on an existing service is
/// logged and carried, never mutated and never a failure.
pub async fn reconcile_service(
    api: &CloudApi<'_>,
    spec: &CloudServiceSpec,
) -> Result<ServiceHandle> {
    let existing = match api.find_service_by_name(&spec.name).await? {
        Some(service) => Some(service),
        None => match api.create_service(spec).await {
            Ok(id) => {
                tracing::info!(service = %spec.name, id = %id, "created service");
                return Ok(ServiceHandle {
                    id: id.clone(),
                    outcome: ReconcileOutcome::Created { id },
                });
            }
            Err(e) if e.is_conflict() => api.find_service_by_name(&spec.name).await?,
            Err(e) => return Err(e.into()),
        },
    };
    let service =
        existing.ok_or_else(|| vanished_after_conflict(&format!("service '{}'", spec.name)))?;
    let id = service_id_of(&service)
        .ok_or_else(|| vanished_after_conflict(&format!("service '{}'", spec.name)))?;

    let current_addresses = addresses_of(&service);
    if !current_addresses.is_empty() && current_addresses != spec.addresses {
        tracing::warn!(
            service = %spec.name,
            current = ?current_addresses,
            desired = ?spec.addresses,
            "service backend address drift detected; the control plane offers no service update"
        );
    }
    Ok(ServiceHandle {
        id: id.clone(),
        outcome: ReconcileOutcome::Unchanged { id },
    })
}

#[derive(Debug, Clone)]
pub struct RouteHandle {
    pub id: String,
    /// Whether the route existed before this run touched it. Feeds the
    /// pipeline's decision to skip recompiling an unchanged unit.
    pub pre_existing: bool,
    pub outcome: ReconcileOutcome,
}

fn route_id_of(route: &Value) -> Option<String> {
    route
        .get("routeId")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Checks the located route's domain binding and issues a targeted update
/// when it does not include the desired domain. Returns whether an update
/// was written. Carried route fields come from the fresh GET so unrelated
/// settings survive.
async fn ensure_route_domain(
    api: &CloudApi<'_>,
    http_api_id: &str,
    route_id: &str,
    spec: &CloudRouteSpec,
) -> Result<bool> {
    let detail = api.get_route(http_api_id, route_id).await?;
    let bound: Vec<&str> = detail
        .get("domainIds")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if bound.contains(&spec.domain_id.as_str()) {
        return Ok(false);
    }
    tracing::info!(route = %spec.name, domain_id = %spec.domain_id, "rebinding route domain");
    let body = json!({
        "domainIds": [spec.domain_id],
        "environmentId": spec.environment_id,
        "match": detail.get("match"),
        "backendConfig": detail.get("backendConfig"),
        "mcpRouteConfig": detail.get("mcpRouteConfig"),
        "name": spec.name,
        "description": detail.get("description").and_then(Value::as_str).unwrap_or(&spec.name),
    });
    api.update_route(http_api_id, route_id, body).await?;
    Ok(true)
}

pub async fn reconcile_route(
    api: &CloudApi<'_>,
    http_api_id: &str,
    spec: &CloudRouteSpec,
) -> Result<RouteHandle> {
    let located = match api
        .find_route_by_name(http_api_id, &spec.environment_id, &spec.name)
        .await?
    {
        Some(route) => Some(route),
        None => match api.create_route(http_api_id, spec).await {
            Ok(id) => {
                tracing::info!(route = %spec.name, id = %id, "created route");
                return Ok(RouteHandle {
                    id: id.clone(),
                    pre_existing: false,
                    outcome: ReconcileOutcome::Created { id },
                });
            }
            Err(e) if e.is_conflict() => {
                api.find_route_by_name(http_api_id, &spec.environment_id, &spec.name)
                    .await?
            }
            Err(e) => return Err(e.into()),
        },
    };
    let route =
        located.ok_or_else(|| vanished_after_conflict(&format!("route '{}'", spec.name)))?;
    let id = route_id_of(&route)
        .ok_or_else(|| vanished_after_conflict(&format!("route '{}'", spec.name)))?;

    // Domain binding is checked independently of other fields; a failure
    // here degrades to a warning rather than failing the unit.
    let outcome = match ensure_route_domain(api, http_api_id, &id, spec).await {
        Ok(true) => ReconcileOutcome::Updated {
            id: id.clone(),
            new_version: None,
        },
        Ok(false) => ReconcileOutcome::Unchanged { id: id.clone() },
        Err(e) => {
            tracing::warn!(route = %spec.name, error = %e, "route domain check failed; keeping existing binding");
            ReconcileOutcome::Unchanged { id: id.clone() }
        }
    };
    Ok(RouteHandle {
        id,
        pre_existing: true,
        outcome,
    })
}

/// A plugin attachment as discovered by scanning the plugin's attachment
/// list; there is no direct get-by-route endpoint.
#[derive(Debug, Clone)]
pub struct AttachmentState {
    pub id: String,
    pub route_ids: Vec<String>,
    pub config_b64: Option<String>,
}

pub(crate) fn attachment_id_of(attachment: &Value) -> Option<String> {
    attachment
        .get("attachmentId")
        .or_else(|| attachment.get("pluginAttachmentId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn attachment_route_ids(attachment: &Value) -> Vec<String> {
    attachment
        .get("attachResourceIds")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Scans the plugin's attachments for one referencing the route.
pub async fn find_attachment(
    api: &CloudApi<'_>,
    plugin_id: &str,
    route_id: &str,
) -> Result<Option<AttachmentState>> {
    for attachment in api.list_plugin_attachments(plugin_id).await? {
        let route_ids = attachment_route_ids(&attachment);
        if !route_ids.iter().any(|r| r == route_id) {
            continue;
        }
        let Some(id) = attachment_id_of(&attachment) else {
            continue;
        };
        return Ok(Some(AttachmentState {
            id,
            route_ids,
            config_b64: attachment
                .get("pluginConfig")
                .and_then(Value::as_str)
                .map(str::to_string),
        }));
    }
    Ok(None)
}

pub async fn reconcile_attachment(
    api: &CloudApi<'_>,
    plugin_id: &str,
    route_id: &str,
    config_b64: &str,
    existing: Option<&AttachmentState>,
    force_update: bool,
) -> Result<ReconcileOutcome> {
    if let Some(attachment) = existing {
        if !force_update && attachment.config_b64.as_deref() == Some(config_b64) {
            return Ok(ReconcileOutcome::Unchanged {
                id: attachment.id.clone(),
            });
        }
        let mut route_ids = attachment.route_ids.clone();
        if !route_ids.iter().any(|r| r == route_id) {
            route_ids.push(route_id.to_string());
        }
        api.update_plugin_attachment(&attachment.id, &route_ids, config_b64)
            .await?;
        tracing::info!(attachment = %attachment.id, route = route_id, "updated plugin attachment");
        return Ok(ReconcileOutcome::Updated {
            id: attachment.id.clone(),
            new_version: None,
        });
    }

    match api
        .create_plugin_attachment(plugin_id, route_id, config_b64)
        .await
    {
        Ok(data) => {
            let id = attachment_id_of(&data).unwrap_or_else(|| route_id.to_string());
            tracing::info!(attachment = %id, route = route_id, "created plugin attachment");
            Ok(ReconcileOutcome::Created { id })
        }
        Err(e) if e.is_conflict() => {
            // The net effect (attachment exists) satisfies the goal.
            tracing::warn!(route = route_id, error = %e, "plugin attachment already exists");
            match find_attachment(api, plugin_id, route_id).await? {
                Some(attachment) => Ok(ReconcileOutcome::Unchanged { id: attachment.id }),
                None => Ok(ReconcileOutcome::Unchanged {
                    id: route_id.to_string(),
                }),
            }
        }
        Err(e) => Err(e.into()),
    }
}
