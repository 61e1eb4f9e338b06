//! scomdb-metrics: performance counters as Prometheus gauges.
//!
//! # Architecture
//!
//! ```text
//! PerformanceExporter
//!   ├── poll()     → samples newer than the high-water mark
//!   │     └── MetadataCache  → counter / entity descriptors (lazy on miss)
//!   ├── latest     → one retained sample per performance source
//!   └── publish()  → MappingEngine rule hit → mapped gauge
//!                    miss                   → scom_raw_value
//! ```
//!
//! Gauges live in a `prometheus::Registry` owned by the caller, which the
//! HTTP layer renders on `/metrics`.

pub mod cache;
pub mod mapping;
pub mod poller;

pub use cache::MetadataCache;
pub use mapping::{MappingEngine, MappingError, MappingResult, MappingRule, MetricDefinition};
pub use poller::{PerformanceExporter, Sample, RAW_METRIC_NAME};
