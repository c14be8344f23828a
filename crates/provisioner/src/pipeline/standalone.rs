//! Orchestrator for a self-hosted gateway console.

use super::{record_unit_failure, with_default_port};
use crate::error::{ProvisionError, Result};
use crate::registry::ToolUnit;
use crate::report::{RunReport, ToolResult};
use crate::spec_source::SpecSource;
use crate::reconcile::console::{
    reconcile_consumer, reconcile_plugin_instance, reconcile_route, reconcile_service_source,
};
use toolgate_control_plane::{
    ConsoleApi, ConsoleRouteSpec, ConsumerCredential, ConsumerSpec, PluginInstanceSpec,
    ServiceSourceSpec,
};
use toolgate_tool_config::{Converter, PatchOptions, patch};

#[derive(Debug, Clone)]
pub struct StandalonePipelineOptions {
    /// Well-known consumer identity allowed on every tool route.
    pub consumer_name: String,
    /// Bearer token backing the consumer credential and the `apikey` config
    /// entry.
    pub api_key: String,
    /// Host (optionally `host:port`) where the tool backends listen.
    pub backend_host: String,
    /// Base URL the patched request templates resolve against.
    pub openapi_base_url: String,
    pub skip_auth: bool,
    pub force_update: bool,
}

pub struct StandalonePipeline<'a> {
    api: &'a ConsoleApi<'a>,
    specs: &'a dyn SpecSource,
    converter: &'a Converter,
    options: StandalonePipelineOptions,
}

impl<'a> StandalonePipeline<'a> {
    #[must_use]
    pub fn new(
        api: &'a ConsoleApi<'a>,
        specs: &'a dyn SpecSource,
        converter: &'a Converter,
        options: StandalonePipelineOptions,
    ) -> Self {
        Self {
            api,
            specs,
            converter,
            options,
        }
    }

    /// Reconciles the consumer once, then processes every unit. Per-unit
    /// errors are recorded in the report; only the consumer precondition can
    /// fail the run as a whole.
    pub async fn run(&self, units: &[ToolUnit]) -> Result<RunReport> {
        let consumer = ConsumerSpec {
            name: self.options.consumer_name.clone(),
            credentials: vec![ConsumerCredential::bearer_key(self.options.api_key.clone())],
        };
        reconcile_consumer(self.api, &consumer).await.map_err(|e| {
            ProvisionError::Precondition(format!(
                "consumer '{}' could not be reconciled: {e}",
                consumer.name
            ))
        })?;

        let backend = with_default_port(&self.options.backend_host);
        let mut report = RunReport::default();
        for unit in units {
            let mut result = ToolResult::new(&unit.name);
            if let Err(e) = self.provision_unit(unit, &backend, &mut result).await {
                tracing::error!(unit = %unit.name, error = %e, "tool unit failed");
                record_unit_failure(&mut result, e.to_string());
            }
            report.results.push(result);
        }
        Ok(report)
    }

    async fn provision_unit(
        &self,
        unit: &ToolUnit,
        backend: &str,
        result: &mut ToolResult,
    ) -> Result<()> {
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

        let source = ServiceSourceSpec {
            name: unit.name.clone(),
            domain: backend.to_string(),
            protocol: "http".to_string(),
            port: 80,
        };
        result.service = Some(
            reconcile_service_source(self.api, &source, self.options.force_update).await?,
        );

        let route = ConsoleRouteSpec {
            name: unit.name.clone(),
            path_prefix: format!("/{}", unit.name),
            auth_enabled: !self.options.skip_auth,
            allowed_consumers: if self.options.skip_auth {
                Vec::new()
            } else {
                vec![self.options.consumer_name.clone()]
            },
            service_ref: format!("{}.static:80", unit.name),
        };
        result.route = Some(reconcile_route(self.api, &route, self.options.force_update).await?);

        let instance = PluginInstanceSpec {
            route: unit.name.clone(),
            plugin_name: super::TOOL_PLUGIN_CLASS.to_string(),
            raw_configurations: doc.to_yaml_string()?,
        };
        result.plugin = Some(
            reconcile_plugin_instance(self.api, &instance, self.options.force_update).await?,
        );
        Ok(())
    }
}
