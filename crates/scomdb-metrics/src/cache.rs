//! Counter and entity dimension cache.
//!
//! Bulk-loaded at startup, then filled lazily: a miss triggers one point
//! query and the result is cached. Ids the database does not know get a
//! synthesized placeholder so a permanently missing id costs one query, not
//! one per tick. The cache only grows; counter and entity cardinality is
//! bounded and effectively static.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use scomdb_store::{CounterDescriptor, Datastore, EntityDescriptor, StoreResult};

/// Counter and entity descriptors keyed by id.
pub struct MetadataCache {
    store: Arc<dyn Datastore>,
    counters: HashMap<Uuid, Arc<CounterDescriptor>>,
    entities: HashMap<Uuid, Arc<EntityDescriptor>>,
}

impl MetadataCache {
    /// Create a new, empty cache over `store`.
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self {
            store,
            counters: HashMap::new(),
            entities: HashMap::new(),
        }
    }

    /// Populate both tables from full-table reads.
    pub async fn load_bulk(&mut self) -> StoreResult<()> {
        for counter in self.store.load_counters().await? {
            self.counters.insert(counter.id, Arc::new(counter));
        }
        for entity in self.store.load_entities().await? {
            self.entities.insert(entity.id, Arc::new(entity));
        }
        info!(
            counters = self.counters.len(),
            entities = self.entities.len(),
            "metadata cache loaded"
        );
        Ok(())
    }

    /// Counter for `id`, querying the store on a miss. Unknown ids resolve
    /// to a cached placeholder.
    pub async fn resolve_counter(&mut self, id: Uuid) -> StoreResult<Arc<CounterDescriptor>> {
        if let Some(counter) = self.counters.get(&id) {
            return Ok(Arc::clone(counter));
        }

        let counter = match self.store.counter_by_id(id).await? {
            Some(counter) => counter,
            None => {
                debug!(%id, "counter not found, caching placeholder");
                CounterDescriptor::placeholder(id)
            }
        };
        let counter = Arc::new(counter);
        self.counters.insert(id, Arc::clone(&counter));
        Ok(counter)
    }

    /// Entity for `id`, querying the store on a miss. Unknown ids resolve
    /// to a cached placeholder.
    pub async fn resolve_entity(&mut self, id: Uuid) -> StoreResult<Arc<EntityDescriptor>> {
        if let Some(entity) = self.entities.get(&id) {
            return Ok(Arc::clone(entity));
        }

        let entity = match self.store.entity_by_id(id).await? {
            Some(entity) => entity,
            None => {
                debug!(%id, "entity not found, caching placeholder");
                EntityDescriptor::placeholder(id)
            }
        };
        let entity = Arc::new(entity);
        self.entities.insert(id, Arc::clone(&entity));
        Ok(entity)
    }

    /// Number of cached counters, placeholders included.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Number of cached entities, placeholders included.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}
