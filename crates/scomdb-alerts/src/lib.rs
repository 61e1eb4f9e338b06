//! scomdb-alerts: alert change tracking for the `/alerts/` endpoint.
//!
//! The [`AlertExporter`] polls the full alert set, keeps only the alerts
//! that are new or modified since they were last seen, and publishes that
//! change set as a snapshot. [`render_alerts_json`] turns a snapshot into
//! the response body.

pub mod render;
pub mod tracker;

pub use render::{render_alerts_json, ALERTS_CONTENT_TYPE};
pub use tracker::AlertExporter;
