//! The query surface the exporter modules depend on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::*;

/// Read-only access to the OperationsManager schema.
///
/// Implementations are shared between modules as `Arc<dyn Datastore>`.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Every performance counter definition.
    async fn load_counters(&self) -> StoreResult<Vec<CounterDescriptor>>;

    /// Every managed entity not flagged as deleted.
    async fn load_entities(&self) -> StoreResult<Vec<EntityDescriptor>>;

    /// Point lookup of one counter.
    async fn counter_by_id(&self, id: Uuid) -> StoreResult<Option<CounterDescriptor>>;

    /// Point lookup of one entity. Does not filter on the deleted flag, so
    /// samples recorded before a deletion still resolve to real names.
    async fn entity_by_id(&self, id: Uuid) -> StoreResult<Option<EntityDescriptor>>;

    /// Non-null samples strictly newer than `since`.
    async fn samples_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<SampleRow>>;

    /// The full current alert set; closed alerts only when `include_closed`.
    async fn alerts(&self, include_closed: bool) -> StoreResult<Vec<AlertRecord>>;

    /// Resolve a monitor id by its name.
    async fn monitor_id(&self, monitor_name: &str) -> StoreResult<Option<Uuid>>;

    /// Current health state for `monitor_id` across non-deleted entities.
    async fn entity_states(&self, monitor_id: Uuid) -> StoreResult<Vec<EntityStateRecord>>;
}
