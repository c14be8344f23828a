//! Pipeline tests against the fake self-hosted console.

use std::time::Duration;
use toolgate_control_plane::{ConsoleApi, RetryPolicy};
use toolgate_provisioner::{
    ReconcileOutcome, RunReport, RunStatus, StandalonePipeline, StandalonePipelineOptions,
    units_from_str,
};
use toolgate_test_support::{FakeConsole, StaticSpecSource, write_fake_converter};
use toolgate_tool_config::Converter;

const REGISTRY: &str = r#"{"mcpServers": {"weather": {}, "translate": {}}}"#;
const OPENAPI_BASE: &str = "http://127.0.0.1:8000";

struct Harness {
    console: FakeConsole,
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
        console: FakeConsole::new(),
        specs,
        converter: Converter::new(converter_path, Duration::from_secs(10)),
        _staging: staging,
    }
}

fn options(force_update: bool) -> StandalonePipelineOptions {
    StandalonePipelineOptions {
        consumer_name: "toolgate".to_string(),
        api_key: "secret-token".to_string(),
        backend_host: "10.0.0.7".to_string(),
        openapi_base_url: OPENAPI_BASE.to_string(),
        skip_auth: false,
        force_update,
    }
}

async fn run(h: &Harness, registry: &str, force_update: bool) -> RunReport {
    let api = ConsoleApi::new(&h.console, RetryPolicy::none());
    let pipeline = StandalonePipeline::new(&api, &h.specs, &h.converter, options(force_update));
    let units = units_from_str(registry, OPENAPI_BASE).expect("units");
    pipeline.run(&units).await.expect("pipeline run")
}

fn is_created(outcome: &Option<ReconcileOutcome>) -> bool {
    matches!(outcome, Some(ReconcileOutcome::Created { .. }))
}

fn is_unchanged(outcome: &Option<ReconcileOutcome>) -> bool {
    matches!(outcome, Some(ReconcileOutcome::Unchanged { .. }))
}

#[tokio::test]
async fn fresh_registry_creates_everything() {
    let h = harness();
    let report = run(&h, REGISTRY, false).await;

    assert_eq!(report.status(), RunStatus::AllSucceeded);
    assert_eq!(report.succeeded_count(), 2);
    for result in &report.results {
        assert!(is_created(&result.service), "{}: {:?}", result.name, result.service);
        assert!(is_created(&result.route), "{}: {:?}", result.name, result.route);
        assert!(is_created(&result.plugin), "{}: {:?}", result.name, result.plugin);
    }

    assert!(h.console.resource("/v1/consumers/toolgate").is_some());
    assert_eq!(h.console.resource_count("/v1/service-sources/"), 2);

    // The plugin configuration carries the patched document.
    let instance = h
        .console
        .resource("/v1/routes/weather/plugin-instances/mcp-server")
        .expect("plugin instance");
    let raw = instance["rawConfigurations"].as_str().expect("rawConfigurations");
    assert!(raw.contains("{{.config.baseUrl}}/v1/weather"), "{raw}");
    assert!(raw.contains("Bearer {{.config.apikey}}"), "{raw}");
    assert_eq!(raw.matches("Authorization").count(), 1);
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let h = harness();
    run(&h, REGISTRY, false).await;
    let report = run(&h, REGISTRY, false).await;

    assert_eq!(report.status(), RunStatus::AllSucceeded);
    for result in &report.results {
        assert!(is_unchanged(&result.service), "{}: {:?}", result.name, result.service);
        assert!(is_unchanged(&result.route), "{}: {:?}", result.name, result.route);
        assert!(is_unchanged(&result.plugin), "{}: {:?}", result.name, result.plugin);
    }
    assert_eq!(h.console.resource_count("/v1/service-sources/"), 2);
    assert_eq!(h.console.resource_count("/v1/routes/"), 4); // 2 routes + 2 plugin instances
}

#[tokio::test]
async fn forced_updates_bump_versions_monotonically() {
    let h = harness();
    run(&h, REGISTRY, false).await;
    run(&h, REGISTRY, true).await;
    run(&h, REGISTRY, true).await;

    // The fake rejects any PUT that does not carry observed version + 1, so
    // reaching here already proves the discipline; the sequences make the
    // expectation explicit.
    assert_eq!(h.console.put_versions("/v1/service-sources/weather"), vec![2, 3]);
    assert_eq!(h.console.put_versions("/v1/routes/weather"), vec![2, 3]);
    // Consumer updates on every run after the first (create-first pattern).
    assert_eq!(h.console.put_versions("/v1/consumers/toolgate"), vec![1, 2]);
    assert_eq!(h.console.version_of("/v1/service-sources/weather"), Some(3));
}

#[tokio::test]
async fn failing_spec_fetch_isolates_the_unit() {
    let h = harness();
    h.specs.fail_unit("translate");
    let report = run(&h, REGISTRY, false).await;

    assert_eq!(report.status(), RunStatus::Partial);
    assert_eq!(report.succeeded_count(), 1);
    assert_eq!(report.failed_count(), 1);

    let translate = report.results.iter().find(|r| r.name == "translate").expect("translate");
    assert!(!translate.succeeded());
    assert!(translate.service.as_ref().is_some_and(ReconcileOutcome::is_failed));
    assert!(translate.error.as_deref().is_some_and(|e| e.contains("404")));

    let weather = report.results.iter().find(|r| r.name == "weather").expect("weather");
    assert!(weather.succeeded());
    assert!(is_created(&weather.route));
    assert!(h.console.resource("/v1/routes/translate").is_none());
}

#[tokio::test]
async fn lost_create_race_is_not_a_failure() {
    let h = harness();
    h.console.race_next_create("/v1/routes");
    let report = run(&h, r#"{"mcpServers": {"weather": {}}}"#, false).await;

    assert_eq!(report.status(), RunStatus::AllSucceeded);
    let weather = &report.results[0];
    // The raced create left the desired state behind; the reconciler
    // re-located it and found nothing to change.
    assert!(is_unchanged(&weather.route), "{:?}", weather.route);
    assert!(h.console.resource("/v1/routes/weather").is_some());
}

#[tokio::test]
async fn consumer_failure_aborts_the_run() {
    let h = harness();
    h.console.fail_path("/v1/consumers", "backend unavailable");
    let api = ConsoleApi::new(&h.console, RetryPolicy::none());
    let pipeline = StandalonePipeline::new(&api, &h.specs, &h.converter, options(false));
    let units = units_from_str(REGISTRY, OPENAPI_BASE).expect("units");

    let err = pipeline.run(&units).await.unwrap_err();
    assert!(matches!(err, toolgate_provisioner::ProvisionError::Precondition(_)));
    assert_eq!(h.console.resource_count("/v1/routes/"), 0);
}

#[tokio::test]
async fn skip_auth_omits_credential_material() {
    let h = harness();
    let api = ConsoleApi::new(&h.console, RetryPolicy::none());
    let mut opts = options(false);
    opts.skip_auth = true;
    let pipeline = StandalonePipeline::new(&api, &h.specs, &h.converter, opts);
    let units = units_from_str(r#"{"mcpServers": {"weather": {}}}"#, OPENAPI_BASE).expect("units");
    let report = pipeline.run(&units).await.expect("run");

    assert_eq!(report.status(), RunStatus::AllSucceeded);
    let route = h.console.resource("/v1/routes/weather").expect("route");
    assert_eq!(route["authConfig"]["enabled"], serde_json::json!(false));
    let instance = h
        .console
        .resource("/v1/routes/weather/plugin-instances/mcp-server")
        .expect("plugin instance");
    let raw = instance["rawConfigurations"].as_str().expect("rawConfigurations");
    assert!(!raw.contains("apikey"), "{raw}");
    assert!(!raw.contains("Authorization"), "{raw}");
}
