//! Prometheus text exposition format for entity health states.
//!
//! Rendered by hand rather than through a registry: the family is rebuilt
//! from each snapshot, so entities that disappear upstream drop out of the
//! output instead of lingering as stale series.

use scomdb_store::EntityStateRecord;

/// Gauge family name of the per-entity health state.
pub const STATE_METRIC_NAME: &str = "scom_entity_health_state";
/// Content type of the `/state/` response.
pub const STATE_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Render a state snapshot as one gauge family. Lines end in `\n` only.
pub fn render_state(states: &[EntityStateRecord]) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "# HELP {STATE_METRIC_NAME} SCOM entity health state (0=Unknown,1=Healthy,2=Warning,3=Critical)\n"
    ));
    out.push_str(&format!("# TYPE {STATE_METRIC_NAME} gauge\n"));
    for s in states {
        out.push_str(&format!(
            "{STATE_METRIC_NAME}{{display_name=\"{}\",full_name=\"{}\"}} {}\n",
            escape_label_value(&s.display_name),
            escape_label_value(&s.full_name),
            s.health_state
        ));
    }

    out
}

/// Escape a label value: `\` → `\\`, `"` → `\"`, newline → `\n`.
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
