//! Domain records read from the OperationsManager database.
//!
//! Descriptors (counters, entities) are immutable once loaded and shared
//! through `Arc`. Alert and state records are plain values that pollers
//! publish wholesale.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Internal id of a performance source (one counter on one entity).
pub type SourceId = i32;

/// Resolution state SCOM uses for closed alerts.
pub const CLOSED_RESOLUTION_STATE: i32 = 255;

// ── Counters and entities ──────────────────────────────────────────

/// A performance counter definition.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterDescriptor {
    pub id: Uuid,
    pub object_name: String,
    pub counter_name: String,
    /// Lowercase `object|counter`, the key mapping rules are indexed by.
    pub lookup_key: String,
}

impl CounterDescriptor {
    /// Create a new descriptor and derive its lookup key.
    pub fn new(id: Uuid, object_name: impl Into<String>, counter_name: impl Into<String>) -> Self {
        let object_name = object_name.into();
        let counter_name = counter_name.into();
        let lookup_key = lookup_key(&object_name, &counter_name);
        Self {
            id,
            object_name,
            counter_name,
            lookup_key,
        }
    }

    /// Stand-in for a counter id the database no longer knows.
    pub fn placeholder(id: Uuid) -> Self {
        Self::new(id, "Unknown", format!("Counter_{id}"))
    }
}

/// Build the case-insensitive `object|counter` key.
pub fn lookup_key(object_name: &str, counter_name: &str) -> String {
    format!(
        "{}|{}",
        object_name.to_lowercase(),
        counter_name.to_lowercase()
    )
}

/// A managed entity (computer, disk, database, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDescriptor {
    pub id: Uuid,
    pub display_name: String,
    pub path: String,
    pub full_name: String,
}

impl EntityDescriptor {
    /// Stand-in for an entity id the database no longer knows.
    pub fn placeholder(id: Uuid) -> Self {
        Self {
            id,
            display_name: format!("Entity_{id}"),
            ..Default::default()
        }
    }

    /// Short instance name derived from the full name.
    pub fn instance_name(&self) -> &str {
        instance_name(&self.full_name)
    }
}

/// Short instance name: the part of a full name after its last `:`.
///
/// `"Microsoft.Windows.Computer:WEB01"` → `"WEB01"`. A name without `:` (or
/// ending in one) is returned whole; a blank name yields `""`.
pub fn instance_name(full_name: &str) -> &str {
    if full_name.trim().is_empty() {
        return "";
    }
    match full_name.rfind(':') {
        Some(idx) if idx + 1 < full_name.len() => &full_name[idx + 1..],
        _ => full_name,
    }
}

// ── Performance samples ────────────────────────────────────────────

/// One raw performance sample row, before dimension resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    pub source_id: SourceId,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub entity_id: Uuid,
    pub counter_id: Uuid,
}

// ── Alerts ─────────────────────────────────────────────────────────

/// An alert row decorated with its owning entity's names.
///
/// Serializes to the snake_case JSON document served on `/alerts/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertRecord {
    pub alert_id: Uuid,
    pub alert_name: String,
    pub alert_description: String,
    pub severity: i32,
    pub severity_text: String,
    pub priority: i32,
    pub resolution_state: i32,
    pub resolution_state_text: String,
    pub category: String,
    #[serde(with = "iso_millis")]
    pub time_raised: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub time_added: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub last_modified: DateTime<Utc>,
    #[serde(with = "iso_millis::option")]
    pub time_resolved: Option<DateTime<Utc>>,
    pub repeat_count: i32,
    pub owner: String,
    pub resolved_by: String,
    pub ticket_id: String,
    pub context: String,
    pub custom_field_1: String,
    pub custom_field_2: String,
    pub custom_field_3: String,
    pub custom_field_4: String,
    pub custom_field_5: String,
    pub custom_field_6: String,
    pub custom_field_7: String,
    pub custom_field_8: String,
    pub custom_field_9: String,
    pub custom_field_10: String,
    pub entity_display_name: String,
    pub entity_full_name: String,
    pub is_monitor_alert: bool,
    pub connector_id: Option<Uuid>,
}

impl AlertRecord {
    /// Whether the alert is in the closed resolution state.
    pub fn is_closed(&self) -> bool {
        self.resolution_state == CLOSED_RESOLUTION_STATE
    }

    /// Recompute the text fields from the numeric codes.
    pub fn with_derived_text(mut self) -> Self {
        self.severity_text = severity_text(self.severity).to_string();
        self.resolution_state_text = resolution_state_text(self.resolution_state);
        self
    }
}

/// Display text of an alert severity code.
pub fn severity_text(severity: i32) -> &'static str {
    match severity {
        0 => "Information",
        1 => "Warning",
        2 => "Critical",
        _ => "Unknown",
    }
}

/// Display text of a resolution state code.
pub fn resolution_state_text(state: i32) -> String {
    match state {
        0 => "New".to_string(),
        CLOSED_RESOLUTION_STATE => "Closed".to_string(),
        other => format!("Custom_{other}"),
    }
}

// ── Entity health state ────────────────────────────────────────────

/// Health state of one entity for the exported monitor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityStateRecord {
    pub display_name: String,
    pub full_name: String,
    /// 0 = Unknown, 1 = Healthy, 2 = Warning, 3 = Critical.
    pub health_state: i32,
    pub health_text: String,
}

impl EntityStateRecord {
    /// Create a new record and derive its health text.
    pub fn new(display_name: impl Into<String>, full_name: impl Into<String>, health_state: i32) -> Self {
        Self {
            display_name: display_name.into(),
            full_name: full_name.into(),
            health_state,
            health_text: health_state_text(health_state).to_string(),
        }
    }
}

/// Display text of a health state code.
pub fn health_state_text(state: i32) -> &'static str {
    match state {
        1 => "Healthy",
        2 => "Warning",
        3 => "Critical",
        _ => "Unknown",
    }
}

// ── Timestamps ─────────────────────────────────────────────────────

/// `0001-01-01T00:00:00Z`, used when a non-nullable timestamp column is NULL.
pub fn min_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(-62_135_596_800, 0).unwrap_or_default()
}

/// UTC ISO-8601 with millisecond precision and a literal `Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::Serializer;

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_str(&super::super::format_timestamp(ts)),
                None => serializer.serialize_none(),
            }
        }
    }
}
