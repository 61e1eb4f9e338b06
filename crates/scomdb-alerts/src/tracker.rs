//! Alert dedup and closed-alert retention.
//!
//! Two tables drive change detection:
//!
//! - `last_seen`: alert id → last modification time published
//! - `closed_at`: alert id → wall-clock time the alert was first seen closed,
//!   cleared when it reopens
//!
//! An id leaves both tables when it is missing from a poll or has been
//! closed for at least the retention window. A forgotten id that shows up
//! again is published as new.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use scomdb_core::{AlertModuleConfig, ExporterModule, SnapshotCell, TickGate};
use scomdb_store::{AlertRecord, Datastore, StoreResult};

/// Publishes the alerts that are new or modified since the previous poll.
pub struct AlertExporter {
    enabled: bool,
    gate: TickGate,
    store: Arc<dyn Datastore>,
    include_closed: bool,
    retention: Duration,
    last_seen: HashMap<Uuid, DateTime<Utc>>,
    closed_at: HashMap<Uuid, DateTime<Utc>>,
    snapshot: SnapshotCell<Vec<AlertRecord>>,
}

impl AlertExporter {
    /// Create a new alert exporter. Nothing is tracked until the first refresh.
    pub fn new(store: Arc<dyn Datastore>, config: &AlertModuleConfig) -> Self {
        Self {
            enabled: config.enabled,
            gate: TickGate::new(config.poll_interval()),
            store,
            include_closed: config.include_closed_alerts,
            retention: config.closed_alert_retention(),
            last_seen: HashMap::new(),
            closed_at: HashMap::new(),
            snapshot: SnapshotCell::default(),
        }
    }

    /// Handle to the published change set, for the HTTP layer.
    pub fn snapshot(&self) -> SnapshotCell<Vec<AlertRecord>> {
        self.snapshot.clone()
    }

    /// Poll the alert set and publish what changed since the last poll.
    pub async fn refresh(&mut self) -> StoreResult<usize> {
        let current = self.store.alerts(self.include_closed).await?;
        let total = current.len();
        let changed = self.detect_changes(current, Utc::now());
        let count = changed.len();
        self.snapshot.store(changed);

        debug!(
            alerts = total,
            changed = count,
            tracked = self.last_seen.len(),
            "alerts refreshed"
        );
        Ok(count)
    }

    /// Filter `current` down to new or modified alerts and update the
    /// tracking tables. `now` stamps newly closed alerts and drives
    /// retention.
    pub fn detect_changes(&mut self, current: Vec<AlertRecord>, now: DateTime<Utc>) -> Vec<AlertRecord> {
        let present: HashSet<Uuid> = current.iter().map(|a| a.alert_id).collect();
        let mut changed = Vec::new();

        for alert in current {
            let is_changed = self
                .last_seen
                .get(&alert.alert_id)
                .is_none_or(|seen| alert.last_modified > *seen);
            if !is_changed {
                continue;
            }

            self.last_seen.insert(alert.alert_id, alert.last_modified);
            if alert.is_closed() {
                self.closed_at.entry(alert.alert_id).or_insert(now);
            } else {
                self.closed_at.remove(&alert.alert_id);
            }
            changed.push(alert);
        }

        self.forget_stale(&present, now);
        changed
    }

    fn forget_stale(&mut self, present: &HashSet<Uuid>, now: DateTime<Utc>) {
        let closed_at = &self.closed_at;
        let retention = self.retention;
        let expired = |id: &Uuid| {
            !present.contains(id)
                || closed_at
                    .get(id)
                    .is_some_and(|at| (now - *at).to_std().is_ok_and(|age| age >= retention))
        };

        let stale: Vec<Uuid> = self
            .last_seen
            .keys()
            .chain(closed_at.keys())
            .filter(|id| expired(id))
            .copied()
            .collect();

        for id in stale {
            self.last_seen.remove(&id);
            self.closed_at.remove(&id);
        }
    }

    /// Number of alert ids with a recorded modification time.
    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }

    /// Whether `id` is still held in either tracking table.
    pub fn is_tracked(&self, id: &Uuid) -> bool {
        self.last_seen.contains_key(id) || self.closed_at.contains_key(id)
    }
}

#[async_trait]
impl ExporterModule for AlertExporter {
    fn name(&self) -> &'static str {
        "Alert"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn init(&mut self) -> anyhow::Result<()> {
        self.refresh().await.context("initial alert load")?;
        self.gate.mark_ran(Instant::now());
        Ok(())
    }

    async fn tick(&mut self) -> anyhow::Result<()> {
        if !self.gate.is_due(Instant::now()) {
            return Ok(());
        }

        let result = self.refresh().await;
        self.gate.mark_ran(Instant::now());
        result.map(|_| ()).context("polling alerts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use scomdb_store::{MemoryStore, CLOSED_RESOLUTION_STATE};

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    fn alert(id: Uuid, modified: DateTime<Utc>) -> AlertRecord {
        AlertRecord {
            alert_id: id,
            alert_name: "Logical disk free space is low".to_string(),
            severity: 2,
            last_modified: modified,
            ..Default::default()
        }
        .with_derived_text()
    }

    fn closed(id: Uuid, modified: DateTime<Utc>) -> AlertRecord {
        AlertRecord {
            resolution_state: CLOSED_RESOLUTION_STATE,
            ..alert(id, modified)
        }
        .with_derived_text()
    }

    fn exporter(retention_minutes: u64) -> AlertExporter {
        let config = AlertModuleConfig {
            closed_alert_retention_minutes: retention_minutes,
            include_closed_alerts: true,
            ..Default::default()
        };
        AlertExporter::new(Arc::new(MemoryStore::new()), &config)
    }

    #[test]
    fn unseen_and_modified_alerts_are_changed() {
        let mut tracker = exporter(60);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let first = tracker.detect_changes(vec![alert(a, t(0)), alert(b, t(0))], t(0));
        assert_eq!(first.len(), 2);

        // Unmodified: nothing to publish.
        let second = tracker.detect_changes(vec![alert(a, t(0)), alert(b, t(0))], t(1));
        assert!(second.is_empty());

        let third = tracker.detect_changes(vec![alert(a, t(2)), alert(b, t(0))], t(2));
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].alert_id, a);
    }

    #[test]
    fn older_modification_time_is_not_a_change() {
        let mut tracker = exporter(60);
        let a = Uuid::new_v4();
        tracker.detect_changes(vec![alert(a, t(5))], t(5));
        assert!(tracker.detect_changes(vec![alert(a, t(4))], t(6)).is_empty());
    }

    #[test]
    fn absent_alert_is_forgotten_immediately() {
        let mut tracker = exporter(60);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        tracker.detect_changes(vec![alert(a, t(0)), closed(b, t(0))], t(0));

        tracker.detect_changes(vec![alert(a, t(0))], t(1));
        assert!(!tracker.is_tracked(&b));
        assert_eq!(tracker.tracked(), 1);

        // Reappearing later counts as new.
        let back = tracker.detect_changes(vec![alert(a, t(0)), closed(b, t(0))], t(2));
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].alert_id, b);
    }

    #[test]
    fn closed_alert_is_forgotten_after_retention() {
        let mut tracker = exporter(10);
        let a = Uuid::new_v4();

        tracker.detect_changes(vec![closed(a, t(0))], t(0));
        tracker.detect_changes(vec![closed(a, t(0))], t(9));
        assert!(tracker.is_tracked(&a));

        // Exactly at closed_at + retention the id is dropped.
        tracker.detect_changes(vec![closed(a, t(0))], t(10));
        assert!(!tracker.is_tracked(&a));
    }

    #[test]
    fn closing_stamps_once() {
        let mut tracker = exporter(10);
        let a = Uuid::new_v4();

        tracker.detect_changes(vec![alert(a, t(0))], t(0));
        tracker.detect_changes(vec![closed(a, t(5))], t(5));
        // A later modification of the closed alert keeps the first stamp.
        tracker.detect_changes(vec![closed(a, t(8))], t(8));
        assert!(tracker.is_tracked(&a));

        tracker.detect_changes(vec![closed(a, t(8))], t(15));
        assert!(!tracker.is_tracked(&a));
    }

    #[test]
    fn reopened_alert_drops_closed_stamp() {
        let mut tracker = exporter(10);
        let a = Uuid::new_v4();

        tracker.detect_changes(vec![closed(a, t(0))], t(0));
        let reopened = tracker.detect_changes(vec![alert(a, t(5))], t(5));
        assert_eq!(reopened.len(), 1);

        // Past the first close + retention the open alert stays tracked.
        assert!(tracker.detect_changes(vec![alert(a, t(5))], t(10)).is_empty());
        assert!(tracker.is_tracked(&a));
        assert!(tracker.detect_changes(vec![alert(a, t(5))], t(11)).is_empty());

        // Closing again stamps afresh.
        tracker.detect_changes(vec![closed(a, t(12))], t(12));
        tracker.detect_changes(vec![closed(a, t(12))], t(21));
        assert!(tracker.is_tracked(&a));
        tracker.detect_changes(vec![closed(a, t(12))], t(22));
        assert!(!tracker.is_tracked(&a));
    }

    #[tokio::test]
    async fn refresh_publishes_only_the_change_set() {
        let store = Arc::new(MemoryStore::new());
        let a = Uuid::new_v4();
        store.put_alert(alert(a, t(0)));

        let mut tracker = AlertExporter::new(
            Arc::clone(&store) as Arc<dyn Datastore>,
            &AlertModuleConfig::default(),
        );
        let snapshot = tracker.snapshot();

        tracker.init().await.unwrap();
        assert_eq!(snapshot.load().len(), 1);

        tracker.refresh().await.unwrap();
        assert!(snapshot.load().is_empty());

        store.put_alert(alert(a, t(1)));
        tracker.refresh().await.unwrap();
        assert_eq!(snapshot.load()[0].last_modified, t(1));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_last_snapshot() {
        let store = Arc::new(MemoryStore::new());
        store.put_alert(alert(Uuid::new_v4(), t(0)));

        let mut tracker = AlertExporter::new(
            Arc::clone(&store) as Arc<dyn Datastore>,
            &AlertModuleConfig::default(),
        );
        tracker.refresh().await.unwrap();

        store.set_unavailable(true);
        assert!(tracker.refresh().await.is_err());
        assert_eq!(tracker.snapshot().load().len(), 1);
    }

    #[tokio::test]
    async fn closed_alerts_excluded_by_default() {
        let store = Arc::new(MemoryStore::new());
        store.put_alert(alert(Uuid::new_v4(), t(0)));
        store.put_alert(closed(Uuid::new_v4(), t(0)));

        let mut tracker = AlertExporter::new(
            Arc::clone(&store) as Arc<dyn Datastore>,
            &AlertModuleConfig::default(),
        );
        assert_eq!(tracker.refresh().await.unwrap(), 1);
    }
}
