//! Exporter regression tests.
//!
//! Wires every module to an in-memory datastore, runs the scheduler for a
//! round and checks what the HTTP endpoints serve.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use prometheus::Registry;
use tower::ServiceExt;
use uuid::Uuid;

use scomdb_alerts::AlertExporter;
use scomdb_api::{build_router, ApiState};
use scomdb_core::{AlertModuleConfig, ExporterModule, ModuleConfig, Scheduler, StateModuleConfig};
use scomdb_health::StateExporter;
use scomdb_metrics::PerformanceExporter;
use scomdb_store::*;

const MONITOR: &str = "System.Health.EntityState";

struct Harness {
    store: Arc<MemoryStore>,
    web01: EntityDescriptor,
}

fn seeded_store() -> Harness {
    let store = Arc::new(MemoryStore::new());

    let web01 = EntityDescriptor {
        id: Uuid::new_v4(),
        display_name: "WEB01 \"primary\"".to_string(),
        path: String::new(),
        full_name: "Microsoft.Windows.Computer:WEB01".to_string(),
    };
    store.put_entity(web01.clone());

    let disk = CounterDescriptor::new(Uuid::new_v4(), "LogicalDisk", "% Free Space");
    store.put_counter(disk.clone());
    store.push_sample(SampleRow {
        source_id: 1,
        value: 42.5,
        timestamp: Utc::now() - Duration::seconds(30),
        entity_id: web01.id,
        counter_id: disk.id,
    });

    let monitor = Uuid::new_v4();
    store.put_monitor(MONITOR, monitor);
    store.put_state(monitor, web01.id, 2);

    store.put_alert(
        AlertRecord {
            alert_id: Uuid::new_v4(),
            alert_name: "Logical disk free space is low".to_string(),
            severity: 1,
            last_modified: Utc::now(),
            entity_display_name: web01.display_name.clone(),
            entity_full_name: web01.full_name.clone(),
            ..Default::default()
        }
        .with_derived_text(),
    );

    Harness { store, web01 }
}

/// Build, init and tick every enabled module once, then return the router.
async fn exporter(harness: &Harness, mappings_dir: &std::path::Path, with_state: bool) -> Router {
    let store = Arc::clone(&harness.store) as Arc<dyn Datastore>;
    let registry = Registry::new();

    let performance = PerformanceExporter::new(
        Arc::clone(&store),
        &ModuleConfig::default(),
        mappings_dir,
        registry.clone(),
    )
    .unwrap();
    let state_config = StateModuleConfig {
        enabled: with_state,
        ..Default::default()
    };
    let state = StateExporter::new(Arc::clone(&store), &state_config);
    let alert = AlertExporter::new(store, &AlertModuleConfig::default());

    let mut api = ApiState::new(registry).with_alerts(alert.snapshot());
    if state.enabled() {
        api = api.with_states(state.snapshot());
    }

    let modules: Vec<Box<dyn ExporterModule>> =
        vec![Box::new(performance), Box::new(state), Box::new(alert)];
    let mut scheduler = Scheduler::new(modules);
    scheduler.init_all().await.unwrap();
    scheduler.run_round().await;

    build_router(api)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String, String) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();

    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn unmapped_sample_is_served_on_raw_gauge() {
    let harness = seeded_store();
    let dir = tempfile::tempdir().unwrap();
    let router = exporter(&harness, &dir.path().join("none"), true).await;

    let (status, content_type, body) = get(&router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/plain; version=0.0.4"));
    assert!(body.contains("scom_raw_value{"));
    assert!(body.contains(r#"counter="% Free Space""#));
    assert!(body.contains(r#"instance="WEB01""#));
    assert!(body.contains("} 42.5"));

    // `/` serves the same registry.
    let (status, _, root) = get(&router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(root.contains("scom_raw_value{"));
}

#[tokio::test]
async fn mapped_sample_moves_off_raw_gauge() {
    let harness = seeded_store();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("disk.json"),
        r#"{"Mappings":[{"ObjectName":"LogicalDisk","CounterName":"% Free Space",
            "MetricName":"disk_free_pct","Labels":{"host":"{instance}","env":"prod"},
            "ValueMultiplier":1.0}]}"#,
    )
    .unwrap();
    let router = exporter(&harness, dir.path(), true).await;

    let (_, _, body) = get(&router, "/metrics").await;
    assert!(body.contains(r#"disk_free_pct{env="prod",host="WEB01"} 42.5"#));
    assert!(!body.contains("scom_raw_value{"));
}

#[tokio::test]
async fn state_endpoint_serves_escaped_exposition() {
    let harness = seeded_store();
    let dir = tempfile::tempdir().unwrap();
    let router = exporter(&harness, dir.path(), true).await;

    for uri in ["/state/", "/state"] {
        let (status, content_type, body) = get(&router, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/plain; version=0.0.4");
        assert!(body.contains(
            r#"scom_entity_health_state{display_name="WEB01 \"primary\"",full_name="Microsoft.Windows.Computer:WEB01"} 2"#
        ));
        assert!(!body.contains("\r\n"));
    }
}

#[tokio::test]
async fn alerts_endpoint_serves_change_set_once() {
    let harness = seeded_store();
    let dir = tempfile::tempdir().unwrap();
    let router = exporter(&harness, dir.path(), true).await;

    let (status, content_type, body) = get(&router, "/alerts/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/json; charset=utf-8");

    let alerts: serde_json::Value = serde_json::from_str(&body).unwrap();
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["severity_text"], "Warning");
    assert_eq!(alerts[0]["entity_display_name"], harness.web01.display_name);
}

#[tokio::test]
async fn disabled_module_routes_are_not_mounted() {
    let harness = seeded_store();
    let dir = tempfile::tempdir().unwrap();
    let router = exporter(&harness, dir.path(), false).await;

    let (status, _, _) = get(&router, "/state/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = get(&router, "/alerts").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_monitor_aborts_startup() {
    let store = Arc::new(MemoryStore::new()) as Arc<dyn Datastore>;
    let state = StateExporter::new(store, &StateModuleConfig::default());

    let modules: Vec<Box<dyn ExporterModule>> = vec![Box::new(state)];
    let mut scheduler = Scheduler::new(modules);
    let err = scheduler.init_all().await.unwrap_err();
    assert!(format!("{err:#}").contains(MONITOR));
}
