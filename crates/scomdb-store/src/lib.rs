//! scomdb-store: read access to the SCOM OperationsManager database.
//!
//! The exporter only ever reads a fixed set of tables (performance samples,
//! counters, managed entities, alerts, monitor state). [`Datastore`] is the
//! query surface the pollers depend on; [`SqlServerStore`] implements it over
//! TDS and [`MemoryStore`] implements it in memory for tests.
//!
//! All reads are dirty-read tolerant (`WITH (NOLOCK)`): this is monitoring
//! data, not a transactional workload.

pub mod error;
pub mod memory;
pub mod mssql;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use mssql::SqlServerStore;
pub use store::Datastore;
pub use types::*;
