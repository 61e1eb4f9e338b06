//! scomdb-health: entity health states for the `/state/` endpoint.
//!
//! [`StateExporter`] resolves the configured monitor once at startup and
//! then republishes the full per-entity state list on every due tick.
//! [`render_state`] formats a snapshot as one Prometheus gauge family.

pub mod prometheus;
pub mod snapshotter;

pub use prometheus::{render_state, STATE_CONTENT_TYPE, STATE_METRIC_NAME};
pub use snapshotter::StateExporter;
