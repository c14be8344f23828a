//! Pipeline tests against the fake cloud gateway.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::time::Duration;
use toolgate_control_plane::{CloudApi, RetryPolicy};
use toolgate_provisioner::{
    CloudPipeline, CloudPipelineOptions, ProvisionError, ReconcileOutcome, RunReport, RunStatus,
    cleanup, units_from_str,
};
use toolgate_test_support::{FakeCloud, StaticSpecSource, fake_cloud, write_fake_converter};
use toolgate_tool_config::Converter;

const REGISTRY: &str = r#"{"mcpServers": {"weather": {}, "translate": {}}}"#;
const OPENAPI_BASE: &str = "http://127.0.0.1:8000";

struct Harness {
    cloud: FakeCloud,
    specs: StaticSpecSource,
    converter: Converter,
    _staging: tempfile::TempDir,
}

fn harness() -> Harness {
    let staging = tempfile::tempdir().expect("tempdir");
    let converter_path = write_fake_converter(staging.path()).expect("fake converter");
    let specs = StaticSpecSource::new();
    specs.insert_minimal("weather");
    specs.insert_minimal("translate");
    Harness {
        cloud: FakeCloud::new(),
        specs,
        converter: Converter::new(converter_path, Duration::from_secs(10)),
        _staging: staging,
    }
}

fn options(force_update: bool) -> CloudPipelineOptions {
    CloudPipelineOptions {
        backend_host: "10.0.0.7".to_string(),
        openapi_base_url: OPENAPI_BASE.to_string(),
        api_key: "secret-token".to_string(),
        skip_auth: false,
        force_update,
        domain_id: None,
        plugin_id: None,
    }
}

async fn run(h: &Harness, registry: &str, force_update: bool) -> RunReport {
    let api = CloudApi::new(&h.cloud, RetryPolicy::none(), "gw-1");
    let pipeline = CloudPipeline::new(&api, &h.specs, &h.converter, options(force_update));
    let units = units_from_str(registry, OPENAPI_BASE).expect("units");
    pipeline.run(&units).await.expect("pipeline run")
}

fn is_created(outcome: &Option<ReconcileOutcome>) -> bool {
    matches!(outcome, Some(ReconcileOutcome::Created { .. }))
}

#[tokio::test]
async fn fresh_registry_provisions_cloud_resources() {
    let h = harness();
    let report = run(&h, REGISTRY, false).await;

    assert_eq!(report.status(), RunStatus::AllSucceeded);
    for result in &report.results {
        assert!(is_created(&result.service), "{}: {:?}", result.name, result.service);
        assert!(is_created(&result.route), "{}: {:?}", result.name, result.route);
        assert!(is_created(&result.plugin), "{}: {:?}", result.name, result.plugin);
    }

    // One shared wildcard domain plus per-unit service/route/attachment.
    assert_eq!(h.cloud.domains().len(), 1);
    assert_eq!(h.cloud.domains()[0]["name"], serde_json::json!("*"));
    assert_eq!(h.cloud.services().len(), 2);
    assert_eq!(h.cloud.routes().len(), 2);
    assert_eq!(h.cloud.attachments().len(), 2);

    let service = &h.cloud.services()[0];
    assert_eq!(service["addresses"][0], serde_json::json!("10.0.0.7:8000"));

    let attachment = &h.cloud.attachments()[0];
    let decoded = BASE64
        .decode(attachment["pluginConfig"].as_str().expect("pluginConfig"))
        .expect("base64");
    let config = String::from_utf8(decoded).expect("utf8");
    assert!(config.contains("{{.config.baseUrl}}"), "{config}");
    assert!(config.contains("Bearer {{.config.apikey}}"), "{config}");
}

#[tokio::test]
async fn second_run_short_circuits_without_refetching() {
    let h = harness();
    run(&h, REGISTRY, false).await;

    // With route and attachment in place the unit must complete without
    // touching the spec server at all.
    h.specs.fail_unit("weather");
    h.specs.fail_unit("translate");
    let report = run(&h, REGISTRY, false).await;

    assert_eq!(report.status(), RunStatus::AllSucceeded);
    for result in &report.results {
        assert!(
            matches!(result.plugin, Some(ReconcileOutcome::Unchanged { .. })),
            "{}: {:?}",
            result.name,
            result.plugin
        );
    }
    assert_eq!(h.cloud.routes().len(), 2);
    assert_eq!(h.cloud.attachments().len(), 2);
}

#[tokio::test]
async fn force_update_rewrites_the_attachment() {
    let h = harness();
    run(&h, REGISTRY, false).await;
    let report = run(&h, REGISTRY, true).await;

    assert_eq!(report.status(), RunStatus::AllSucceeded);
    for result in &report.results {
        assert!(
            matches!(result.plugin, Some(ReconcileOutcome::Updated { new_version: None, .. })),
            "{}: {:?}",
            result.name,
            result.plugin
        );
    }
    assert_eq!(h.cloud.attachments().len(), 2);
}

#[tokio::test]
async fn service_create_race_is_tolerated() {
    let h = harness();
    h.cloud.race_next_create("/v1/services");
    let report = run(&h, r#"{"mcpServers": {"weather": {}}}"#, false).await;

    assert_eq!(report.status(), RunStatus::AllSucceeded);
    let weather = &report.results[0];
    assert!(
        matches!(weather.service, Some(ReconcileOutcome::Unchanged { .. })),
        "{:?}",
        weather.service
    );
    assert_eq!(h.cloud.services().len(), 1);
}

#[tokio::test]
async fn unresolvable_precondition_aborts_before_units() {
    let h = harness();
    h.cloud.fail_path("/v1/environments", "backend unavailable");
    let api = CloudApi::new(&h.cloud, RetryPolicy::none(), "gw-1");
    let pipeline = CloudPipeline::new(&api, &h.specs, &h.converter, options(false));
    let units = units_from_str(REGISTRY, OPENAPI_BASE).expect("units");

    let err = pipeline.run(&units).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Precondition(_)), "{err}");
    assert!(h.cloud.routes().is_empty());
}

#[tokio::test]
async fn spec_failure_isolates_the_unit() {
    let h = harness();
    h.specs.fail_unit("translate");
    let report = run(&h, REGISTRY, false).await;

    assert_eq!(report.status(), RunStatus::Partial);
    let weather = report.results.iter().find(|r| r.name == "weather").expect("weather");
    assert!(weather.succeeded());
    let translate = report.results.iter().find(|r| r.name == "translate").expect("translate");
    assert!(!translate.succeeded());
    // The failed unit still got its service and route; only the plugin
    // config is missing.
    assert_eq!(h.cloud.routes().len(), 2);
    assert_eq!(h.cloud.attachments().len(), 1);
}

#[tokio::test]
async fn cleanup_removes_tool_routes_and_attachments() {
    let h = harness();
    run(&h, REGISTRY, false).await;
    assert_eq!(h.cloud.routes().len(), 2);

    let api = CloudApi::new(&h.cloud, RetryPolicy::none(), "gw-1");
    let report = cleanup(&api, Some(fake_cloud::PLUGIN_ID)).await.expect("cleanup");

    let mut removed = report.removed.clone();
    removed.sort();
    assert_eq!(removed, vec!["translate".to_string(), "weather".to_string()]);
    assert!(report.failed.is_empty());
    assert!(h.cloud.routes().is_empty());
    assert!(h.cloud.attachments().is_empty());
}
