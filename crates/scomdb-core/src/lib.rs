//! scomdb-core: shared plumbing for the SCOM database exporter.
//!
//! Holds the pieces every exporter module depends on but none of them own:
//!
//! ```text
//! ExporterConfig      ← loaded once from TOML / JSON
//! SnapshotCell<T>     ← published snapshot, swapped wholesale
//! ExporterModule      ← name / enabled / init() / tick()
//!   └── TickGate      ← per-module poll interval gating
//! Scheduler           ← sequential round-robin over enabled modules
//! ```

pub mod config;
pub mod module;
pub mod scheduler;
pub mod snapshot;

pub use config::{
    AlertModuleConfig, ConfigError, ConfigResult, ExporterConfig, HttpConfig, ModuleConfig,
    ModulesConfig, StateModuleConfig,
};
pub use module::{ExporterModule, TickGate};
pub use scheduler::Scheduler;
pub use snapshot::SnapshotCell;
