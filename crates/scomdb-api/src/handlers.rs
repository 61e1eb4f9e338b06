//! HTTP handlers.
//!
//! Each handler loads a snapshot, renders it outside any lock and returns
//! the body with its content type. A render failure answers 500 for that
//! request only.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::error;

use scomdb_alerts::{render_alerts_json, ALERTS_CONTENT_TYPE};
use scomdb_core::SnapshotCell;
use scomdb_health::{render_state, STATE_CONTENT_TYPE};
use scomdb_store::{AlertRecord, EntityStateRecord};

fn render_failed(what: &str, err: &dyn std::fmt::Display) -> Response {
    error!(endpoint = what, error = %err, "render failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to render {what}\n")).into_response()
}

/// GET /metrics
pub async fn metrics(State(registry): State<Registry>) -> Response {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buf) {
        return render_failed("metrics", &e);
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        buf,
    )
        .into_response()
}

/// GET /state/
pub async fn states(State(states): State<SnapshotCell<Vec<EntityStateRecord>>>) -> Response {
    let snapshot = states.load();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, STATE_CONTENT_TYPE)],
        render_state(&snapshot),
    )
        .into_response()
}

/// GET /alerts/
pub async fn alerts(State(alerts): State<SnapshotCell<Vec<AlertRecord>>>) -> Response {
    let snapshot = alerts.load();
    match render_alerts_json(&snapshot) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, ALERTS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => render_failed("alerts", &e),
    }
}
