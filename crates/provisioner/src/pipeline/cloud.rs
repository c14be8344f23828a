//! Orchestrator for the cloud gateway, plus teardown.

use super::{TOOL_PLUGIN_CLASS, record_unit_failure, with_default_port};
use crate::error::{ProvisionError, Result};
use crate::registry::ToolUnit;
use crate::report::{ReconcileOutcome, RunReport, ToolResult};
use crate::spec_source::SpecSource;
use crate::reconcile::cloud::{
    DomainHandle, attachment_id_of, attachment_route_ids, find_attachment, reconcile_attachment,
    reconcile_domain, reconcile_route, reconcile_service,
};
use serde_json::Value;
use toolgate_control_plane::{CloudApi, CloudRouteSpec, CloudServiceSpec};
use toolgate_tool_config::{Converter, PatchOptions, patch};

#[derive(Debug, Clone)]
pub struct CloudPipelineOptions {
    /// Host (optionally `host:port`) where the tool backends listen.
    pub backend_host: String,
    /// Base URL the patched request templates resolve against.
    pub openapi_base_url: String,
    pub api_key: String,
    pub skip_auth: bool,
    pub force_update: bool,
    /// Pre-resolved ids; discovered from the control plane when omitted.
    pub domain_id: Option<String>,
    pub plugin_id: Option<String>,
}

/// Run-scoped ids every unit needs. Resolved once; any failure here aborts
/// the run before per-unit processing starts.
struct CloudPreconditions {
    plugin_id: String,
    http_api_id: String,
    environment_id: String,
    domain: DomainHandle,
}

pub struct CloudPipeline<'a> {
    api: &'a CloudApi<'a>,
    specs: &'a dyn SpecSource,
    converter: &'a Converter,
    options: CloudPipelineOptions,
}

impl<'a> CloudPipeline<'a> {
    #[must_use]
    pub fn new(
        api: &'a CloudApi<'a>,
        specs: &'a dyn SpecSource,
        converter: &'a Converter,
        options: CloudPipelineOptions,
    ) -> Self {
        Self {
            api,
            specs,
            converter,
            options,
        }
    }

    async fn resolve_preconditions(&self) -> Result<CloudPreconditions> {
        let plugin_id = match &self.options.plugin_id {
            Some(id) => id.clone(),
            None => self
                .api
                .find_plugin_id(TOOL_PLUGIN_CLASS)
                .await?
                .ok_or_else(|| {
                    ProvisionError::Precondition(format!(
                        "gateway '{}' has no '{TOOL_PLUGIN_CLASS}' plugin",
                        self.api.gateway_id()
                    ))
                })?,
        };
        let http_api_id = self.api.find_http_api_id().await?.ok_or_else(|| {
            ProvisionError::Precondition(format!(
                "gateway '{}' has no MCP HTTP API",
                self.api.gateway_id()
            ))
        })?;
        let environment_id = self.api.find_environment_id().await?.ok_or_else(|| {
            ProvisionError::Precondition(format!(
                "gateway '{}' has no environment",
                self.api.gateway_id()
            ))
        })?;
        let domain = reconcile_domain(self.api, self.options.domain_id.as_deref()).await?;
        tracing::info!(
            plugin_id = %plugin_id,
            http_api_id = %http_api_id,
            environment_id = %environment_id,
            domain_id = %domain.id,
            "resolved gateway preconditions"
        );
        Ok(CloudPreconditions {
            plugin_id,
            http_api_id,
            environment_id,
            domain,
        })
    }

    pub async fn run(&self, units: &[ToolUnit]) -> Result<RunReport> {
        let pre = self.resolve_preconditions().await.map_err(|e| match e {
            e @ ProvisionError::Precondition(_) => e,
            other => ProvisionError::Precondition(other.to_string()),
        })?;

        let mut report = RunReport::default();
        for unit in units {
            let mut result = ToolResult::new(&unit.name);
            if let Err(e) = self.provision_unit(&pre, unit, &mut result).await {
                tracing::error!(unit = %unit.name, error = %e, "tool unit failed");
                record_unit_failure(&mut result, e.to_string());
            }
            report.results.push(result);
        }
        Ok(report)
    }

    async fn provision_unit(
        &self,
        pre: &CloudPreconditions,
        unit: &ToolUnit,
        result: &mut ToolResult,
    ) -> Result<()> {
        let service = reconcile_service(
            self.api,
            &CloudServiceSpec {
                name: unit.name.clone(),
                addresses: vec![with_default_port(&self.options.backend_host)],
            },
        )
        .await?;
        result.service = Some(service.outcome.clone());

        let route = reconcile_route(
            self.api,
            &pre.http_api_id,
            &CloudRouteSpec {
                name: unit.name.clone(),
                path_prefix: format!("/{}", unit.name),
                domain_id: pre.domain.id.clone(),
                environment_id: pre.environment_id.clone(),
                service_id: service.id.clone(),
            },
        )
        .await?;
        result.route = Some(route.outcome.clone());

        let existing = find_attachment(self.api, &pre.plugin_id, &route.id).await?;
        if route.pre_existing && !self.options.force_update {
            if let Some(attachment) = &existing {
                // Nothing to recompute: the route and its attachment were
                // both already in place.
                tracing::info!(unit = %unit.name, "configuration already applied, skipping");
                result.plugin = Some(ReconcileOutcome::Unchanged {
                    id: attachment.id.clone(),
                });
                return Ok(());
            }
        }

        let spec = self.specs.fetch(unit).await?;
        let mut doc = self.converter.compile(&spec, &unit.name).await?;
        let api_key = (!self.options.skip_auth).then_some(self.options.api_key.as_str());
        patch(
            &mut doc,
            &PatchOptions {
                base_url: &self.options.openapi_base_url,
                api_key,
            },
        );
        let config_b64 = doc.to_base64()?;

        result.plugin = Some(
            reconcile_attachment(
                self.api,
                &pre.plugin_id,
                &route.id,
                &config_b64,
                existing.as_ref(),
                self.options.force_update,
            )
            .await?,
        );
        Ok(())
    }
}

/// Outcome of one teardown run, keyed by route name.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

async fn route_name(api: &CloudApi<'_>, http_api_id: &str, route_id: &str) -> String {
    match api.get_route(http_api_id, route_id).await {
        Ok(detail) => detail
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(route_id)
            .to_string(),
        Err(_) => route_id.to_string(),
    }
}

/// Removes every tool route and its plugin attachment from the gateway.
///
/// Routes are discovered through the plugin's attachments; when no
/// attachment exists, every non-`system-` route is treated as a tool route.
/// Attachments are deleted before the routes they reference. Per-route
/// failures are aggregated, never fatal.
pub async fn cleanup(api: &CloudApi<'_>, plugin_id: Option<&str>) -> Result<CleanupReport> {
    let http_api_id = api.find_http_api_id().await?.ok_or_else(|| {
        ProvisionError::Precondition(format!(
            "gateway '{}' has no MCP HTTP API",
            api.gateway_id()
        ))
    })?;
    let environment_id = api.find_environment_id().await?.ok_or_else(|| {
        ProvisionError::Precondition(format!("gateway '{}' has no environment", api.gateway_id()))
    })?;
    let plugin_id = match plugin_id {
        Some(id) => Some(id.to_string()),
        None => api.find_plugin_id(TOOL_PLUGIN_CLASS).await?,
    };

    let mut attachments = Vec::new();
    if let Some(plugin_id) = &plugin_id {
        attachments = api.list_plugin_attachments(plugin_id).await?;
    }

    let mut targets: Vec<(String, String)> = Vec::new();
    for attachment in &attachments {
        for route_id in attachment_route_ids(attachment) {
            let name = route_name(api, &http_api_id, &route_id).await;
            targets.push((route_id, name));
        }
    }
    if targets.is_empty() {
        for route in api.list_routes(&http_api_id, &environment_id).await? {
            let Some(name) = route.get("name").and_then(Value::as_str) else {
                continue;
            };
            if name.starts_with("system-") {
                continue;
            }
            if let Some(id) = route.get("routeId").and_then(Value::as_str) {
                targets.push((id.to_string(), name.to_string()));
            }
        }
    }

    let mut report = CleanupReport::default();
    for attachment in &attachments {
        let Some(id) = attachment_id_of(attachment) else {
            continue;
        };
        if let Err(e) = api.delete_plugin_attachment(&id).await {
            tracing::warn!(attachment = %id, error = %e, "failed to delete plugin attachment");
        }
    }
    for (route_id, name) in targets {
        match api.delete_route(&http_api_id, &route_id).await {
            Ok(()) => {
                tracing::info!(route = %name, "deleted route");
                report.removed.push(name);
            }
            Err(e) => {
                tracing::warn!(route = %name, error = %e, "failed to delete route");
                report.failed.push(name);
            }
        }
    }
    Ok(report)
}
