use scomdb_store::AlertRecord;

/// Content type of the `/alerts/` response.
pub const ALERTS_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Render a change set as a JSON array. An empty set renders as `[]`.
pub fn render_alerts_json(alerts: &[AlertRecord]) -> serde_json::Result<String> {
    serde_json::to_string(alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use scomdb_store::min_timestamp;
    use uuid::Uuid;

    #[test]
    fn empty_change_set_is_empty_array() {
        assert_eq!(render_alerts_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn fields_render_in_declared_order() {
        let alert = AlertRecord {
            alert_id: Uuid::nil(),
            alert_name: "Health Service Heartbeat Failure".to_string(),
            severity: 2,
            resolution_state: 255,
            time_raised: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            time_added: min_timestamp(),
            time_resolved: Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()),
            entity_display_name: "WEB01".to_string(),
            ..Default::default()
        }
        .with_derived_text();

        let body = render_alerts_json(std::slice::from_ref(&alert)).unwrap();

        assert!(body.starts_with(r#"[{"alert_id":"00000000-0000-0000-0000-000000000000","alert_name":"#));
        assert!(body.contains(r#""severity":2,"severity_text":"Critical""#));
        assert!(body.contains(r#""resolution_state_text":"Closed""#));
        assert!(body.contains(r#""time_raised":"2024-05-01T08:00:00.000Z""#));
        assert!(body.contains(r#""time_added":"0001-01-01T00:00:00.000Z""#));
        assert!(body.contains(r#""time_resolved":"2024-05-01T09:30:00.000Z""#));
        assert!(body.ends_with(r#""is_monitor_alert":false,"connector_id":null}]"#));
    }
}
