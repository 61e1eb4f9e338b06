//! Per-monitor entity health snapshots.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use scomdb_core::{ExporterModule, SnapshotCell, StateModuleConfig, TickGate};
use scomdb_store::{Datastore, EntityStateRecord};

/// Publishes the health state of every entity for one monitor.
pub struct StateExporter {
    enabled: bool,
    gate: TickGate,
    store: Arc<dyn Datastore>,
    monitor_name: String,
    /// Resolved by `init()`; every query needs it.
    monitor_id: Option<Uuid>,
    snapshot: SnapshotCell<Vec<EntityStateRecord>>,
}

impl StateExporter {
    /// Create a new state exporter. The monitor is resolved by `init()`.
    pub fn new(store: Arc<dyn Datastore>, config: &StateModuleConfig) -> Self {
        Self {
            enabled: config.enabled,
            gate: TickGate::new(config.poll_interval()),
            store,
            monitor_name: config.monitor_name.clone(),
            monitor_id: None,
            snapshot: SnapshotCell::default(),
        }
    }

    /// Handle to the published state list, for the HTTP layer.
    pub fn snapshot(&self) -> SnapshotCell<Vec<EntityStateRecord>> {
        self.snapshot.clone()
    }

    /// Monitor id resolved by `init()`.
    pub fn monitor_id(&self) -> Option<Uuid> {
        self.monitor_id
    }

    /// Replace the snapshot with the current state of every entity.
    pub async fn refresh(&mut self) -> anyhow::Result<usize> {
        let monitor_id = self
            .monitor_id
            .context("monitor id not resolved; init() has not run")?;

        let states = self.store.entity_states(monitor_id).await?;
        let count = states.len();
        self.snapshot.store(states);
        debug!(entities = count, "entity states refreshed");
        Ok(count)
    }
}

#[async_trait]
impl ExporterModule for StateExporter {
    fn name(&self) -> &'static str {
        "State"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn init(&mut self) -> anyhow::Result<()> {
        let id = self
            .store
            .monitor_id(&self.monitor_name)
            .await
            .with_context(|| format!("looking up monitor {}", self.monitor_name))?;

        let Some(id) = id else {
            anyhow::bail!("monitor {} not found", self.monitor_name);
        };

        info!(monitor = %self.monitor_name, %id, "health monitor resolved");
        self.monitor_id = Some(id);
        Ok(())
    }

    async fn tick(&mut self) -> anyhow::Result<()> {
        if !self.gate.is_due(Instant::now()) {
            return Ok(());
        }

        let result = self.refresh().await;
        self.gate.mark_ran(Instant::now());
        result.map(|_| ()).context("polling entity states")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scomdb_store::{EntityDescriptor, MemoryStore};

    const MONITOR: &str = "System.Health.EntityState";

    fn seeded() -> (Arc<MemoryStore>, Uuid, EntityDescriptor) {
        let store = Arc::new(MemoryStore::new());
        let monitor = Uuid::new_v4();
        store.put_monitor(MONITOR, monitor);

        let web = EntityDescriptor {
            id: Uuid::new_v4(),
            display_name: "WEB01".to_string(),
            path: String::new(),
            full_name: "Microsoft.Windows.Computer:WEB01".to_string(),
        };
        store.put_entity(web.clone());
        store.put_state(monitor, web.id, 1);
        (store, monitor, web)
    }

    fn exporter(store: &Arc<MemoryStore>) -> StateExporter {
        StateExporter::new(
            Arc::clone(store) as Arc<dyn Datastore>,
            &StateModuleConfig::default(),
        )
    }

    #[tokio::test]
    async fn init_resolves_monitor() {
        let (store, monitor, _) = seeded();
        let mut exporter = exporter(&store);
        exporter.init().await.unwrap();
        assert_eq!(exporter.monitor_id(), Some(monitor));
    }

    #[tokio::test]
    async fn missing_monitor_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        let mut exporter = exporter(&store);

        let err = exporter.init().await.unwrap_err();
        assert!(err.to_string().contains(MONITOR));
    }

    #[tokio::test]
    async fn tick_replaces_snapshot_wholesale() {
        let (store, monitor, web) = seeded();
        let mut exporter = exporter(&store);
        let snapshot = exporter.snapshot();
        exporter.init().await.unwrap();

        exporter.refresh().await.unwrap();
        let before = snapshot.load();
        assert_eq!(before[0].health_text, "Healthy");

        store.put_state(monitor, web.id, 3);
        exporter.refresh().await.unwrap();

        // The earlier snapshot is untouched; readers holding it see no change.
        assert_eq!(before[0].health_state, 1);
        assert_eq!(snapshot.load()[0].health_state, 3);
    }

    #[tokio::test]
    async fn failed_refresh_serves_last_good_snapshot() {
        let (store, _, _) = seeded();
        let mut exporter = exporter(&store);
        exporter.init().await.unwrap();
        exporter.tick().await.unwrap();

        store.set_unavailable(true);
        assert!(exporter.refresh().await.is_err());
        assert_eq!(exporter.snapshot().load().len(), 1);
    }
}
