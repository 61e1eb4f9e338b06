//! In-memory [`Datastore`] with the same filtering semantics as the SQL
//! queries. Used by tests across the workspace in place of a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::Datastore;
use crate::types::*;

#[derive(Default)]
struct Tables {
    counters: HashMap<Uuid, CounterDescriptor>,
    /// entity → (descriptor, deleted)
    entities: HashMap<Uuid, (EntityDescriptor, bool)>,
    samples: Vec<SampleRow>,
    alerts: Vec<AlertRecord>,
    monitors: HashMap<String, Uuid>,
    /// (monitor, entity, health state)
    states: Vec<(Uuid, Uuid, i32)>,
}

/// In-memory [`Datastore`] with the same filtering rules as the SQL queries.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    point_queries: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }

    /// Make every query fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Number of `counter_by_id` / `entity_by_id` calls served so far.
    pub fn point_queries(&self) -> usize {
        self.point_queries.load(Ordering::Relaxed)
    }

    /// Insert or replace a counter.
    pub fn put_counter(&self, counter: CounterDescriptor) {
        self.tables().counters.insert(counter.id, counter);
    }

    /// Insert or replace a live entity.
    pub fn put_entity(&self, entity: EntityDescriptor) {
        self.tables().entities.insert(entity.id, (entity, false));
    }

    /// Flag an entity as deleted upstream without removing its row.
    pub fn mark_entity_deleted(&self, id: Uuid) {
        if let Some((_, deleted)) = self.tables().entities.get_mut(&id) {
            *deleted = true;
        }
    }

    /// Append a performance sample.
    pub fn push_sample(&self, sample: SampleRow) {
        self.tables().samples.push(sample);
    }

    /// Insert or replace an alert by id.
    pub fn put_alert(&self, alert: AlertRecord) {
        let mut tables = self.tables();
        match tables.alerts.iter_mut().find(|a| a.alert_id == alert.alert_id) {
            Some(existing) => *existing = alert,
            None => tables.alerts.push(alert),
        }
    }

    /// Remove an alert by id.
    pub fn remove_alert(&self, id: Uuid) {
        self.tables().alerts.retain(|a| a.alert_id != id);
    }

    /// Register a monitor under `name`.
    pub fn put_monitor(&self, name: &str, id: Uuid) {
        self.tables().monitors.insert(name.to_string(), id);
    }

    /// Set the health state of `entity_id` for `monitor_id`.
    pub fn put_state(&self, monitor_id: Uuid, entity_id: Uuid, health_state: i32) {
        let mut tables = self.tables();
        match tables
            .states
            .iter_mut()
            .find(|(m, e, _)| *m == monitor_id && *e == entity_id)
        {
            Some(row) => row.2 = health_state,
            None => tables.states.push((monitor_id, entity_id, health_state)),
        }
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn load_counters(&self) -> StoreResult<Vec<CounterDescriptor>> {
        self.check_available()?;
        Ok(self.tables().counters.values().cloned().collect())
    }

    async fn load_entities(&self) -> StoreResult<Vec<EntityDescriptor>> {
        self.check_available()?;
        Ok(self
            .tables()
            .entities
            .values()
            .filter(|(_, deleted)| !deleted)
            .map(|(entity, _)| entity.clone())
            .collect())
    }

    async fn counter_by_id(&self, id: Uuid) -> StoreResult<Option<CounterDescriptor>> {
        self.check_available()?;
        self.point_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.tables().counters.get(&id).cloned())
    }

    async fn entity_by_id(&self, id: Uuid) -> StoreResult<Option<EntityDescriptor>> {
        self.check_available()?;
        self.point_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.tables().entities.get(&id).map(|(entity, _)| entity.clone()))
    }

    async fn samples_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<SampleRow>> {
        self.check_available()?;
        Ok(self
            .tables()
            .samples
            .iter()
            .filter(|s| s.timestamp > since)
            .cloned()
            .collect())
    }

    async fn alerts(&self, include_closed: bool) -> StoreResult<Vec<AlertRecord>> {
        self.check_available()?;
        Ok(self
            .tables()
            .alerts
            .iter()
            .filter(|a| include_closed || !a.is_closed())
            .cloned()
            .collect())
    }

    async fn monitor_id(&self, monitor_name: &str) -> StoreResult<Option<Uuid>> {
        self.check_available()?;
        Ok(self.tables().monitors.get(monitor_name).copied())
    }

    async fn entity_states(&self, monitor_id: Uuid) -> StoreResult<Vec<EntityStateRecord>> {
        self.check_available()?;
        let tables = self.tables();
        Ok(tables
            .states
            .iter()
            .filter(|(m, _, _)| *m == monitor_id)
            .filter_map(|(_, entity_id, health)| {
                let (entity, deleted) = tables.entities.get(entity_id)?;
                (!deleted).then(|| {
                    EntityStateRecord::new(
                        entity.display_name.clone(),
                        entity.full_name.clone(),
                        *health,
                    )
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> EntityDescriptor {
        EntityDescriptor {
            id: Uuid::new_v4(),
            display_name: name.to_string(),
            path: String::new(),
            full_name: format!("Microsoft.Windows.Computer:{name}"),
        }
    }

    #[tokio::test]
    async fn bulk_entities_skip_deleted_but_point_lookup_does_not() {
        let store = MemoryStore::new();
        let kept = entity("WEB01");
        let gone = entity("WEB02");
        store.put_entity(kept.clone());
        store.put_entity(gone.clone());
        store.mark_entity_deleted(gone.id);

        let bulk = store.load_entities().await.unwrap();
        assert_eq!(bulk, vec![kept]);

        let point = store.entity_by_id(gone.id).await.unwrap();
        assert_eq!(point, Some(gone));
        assert_eq!(store.point_queries(), 1);
    }

    #[tokio::test]
    async fn samples_since_is_strict() {
        let store = MemoryStore::new();
        let ts = Utc::now();
        store.push_sample(SampleRow {
            source_id: 1,
            value: 1.0,
            timestamp: ts,
            entity_id: Uuid::nil(),
            counter_id: Uuid::nil(),
        });

        assert!(store.samples_since(ts).await.unwrap().is_empty());
        let earlier = ts - chrono::Duration::seconds(1);
        assert_eq!(store.samples_since(earlier).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closed_alerts_only_when_requested() {
        let store = MemoryStore::new();
        store.put_alert(AlertRecord {
            alert_id: Uuid::new_v4(),
            resolution_state: CLOSED_RESOLUTION_STATE,
            ..Default::default()
        });
        store.put_alert(AlertRecord {
            alert_id: Uuid::new_v4(),
            ..Default::default()
        });

        assert_eq!(store.alerts(false).await.unwrap().len(), 1);
        assert_eq!(store.alerts(true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn states_join_non_deleted_entities() {
        let store = MemoryStore::new();
        let monitor = Uuid::new_v4();
        let web = entity("WEB01");
        let sql = entity("SQL01");
        store.put_entity(web.clone());
        store.put_entity(sql.clone());
        store.put_state(monitor, web.id, 1);
        store.put_state(monitor, sql.id, 3);
        store.mark_entity_deleted(sql.id);

        let states = store.entity_states(monitor).await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].display_name, "WEB01");
        assert_eq!(states[0].health_text, "Healthy");
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_query() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.load_counters().await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_unavailable(false);
        assert!(store.load_counters().await.is_ok());
    }
}
