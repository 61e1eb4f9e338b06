//! scomdb-api: HTTP surface of the exporter.
//!
//! Handlers only read published state: the shared Prometheus registry and
//! the snapshot cells of the alert and state modules. They never touch the
//! database.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics`, `/` | Performance gauges and process metrics |
//! | GET | `/state/`, `/state` | Entity health states |
//! | GET | `/alerts/`, `/alerts` | Alerts changed in the last poll (JSON) |
//!
//! The `/state` and `/alerts` routes are only mounted when the matching
//! module is enabled.

pub mod handlers;

use axum::Router;
use axum::routing::get;
use prometheus::Registry;

use scomdb_core::SnapshotCell;
use scomdb_store::{AlertRecord, EntityStateRecord};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Registry rendered on `/metrics` and `/`.
    pub registry: Registry,
    /// `None` when the state module is disabled.
    pub states: Option<SnapshotCell<Vec<EntityStateRecord>>>,
    /// `None` when the alert module is disabled.
    pub alerts: Option<SnapshotCell<Vec<AlertRecord>>>,
}

impl ApiState {
    /// Create a new state with only the metrics routes.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            states: None,
            alerts: None,
        }
    }

    /// Mount `/state` over this snapshot.
    pub fn with_states(mut self, states: SnapshotCell<Vec<EntityStateRecord>>) -> Self {
        self.states = Some(states);
        self
    }

    /// Mount `/alerts` over this snapshot.
    pub fn with_alerts(mut self, alerts: SnapshotCell<Vec<AlertRecord>>) -> Self {
        self.alerts = Some(alerts);
        self
    }
}

/// Build the exporter router.
pub fn build_router(state: ApiState) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::metrics).with_state(state.registry.clone()))
        .route("/metrics", get(handlers::metrics).with_state(state.registry));

    if let Some(states) = state.states {
        router = router
            .route("/state", get(handlers::states).with_state(states.clone()))
            .route("/state/", get(handlers::states).with_state(states));
    }

    if let Some(alerts) = state.alerts {
        router = router
            .route("/alerts", get(handlers::alerts).with_state(alerts.clone()))
            .route("/alerts/", get(handlers::alerts).with_state(alerts));
    }

    router
}
