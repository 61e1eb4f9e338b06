//! Incremental performance-sample poller.
//!
//! Each due tick reads the samples newer than a high-water mark, keeps the
//! newest sample per performance source, and writes every retained sample
//! into a gauge. Sources are never evicted: a source that stops reporting
//! keeps exporting its last value.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use prometheus::{GaugeVec, Opts, Registry};
use tracing::{debug, warn};

use scomdb_core::{ExporterModule, ModuleConfig, TickGate};
use scomdb_store::{CounterDescriptor, Datastore, EntityDescriptor, SourceId, StoreResult};

use crate::cache::MetadataCache;
use crate::mapping::MappingEngine;

/// Fallback gauge for samples no mapping rule covers.
pub const RAW_METRIC_NAME: &str = "scom_raw_value";
const RAW_HELP: &str = "Unmapped SCOM performance values";
const RAW_LABELS: [&str; 4] = ["object", "counter", "entity", "instance"];

/// How far back the first poll reaches.
const INITIAL_LOOKBACK_MINUTES: i64 = 5;

/// A sample with its dimensions resolved.
#[derive(Debug, Clone)]
pub struct Sample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub counter: Arc<CounterDescriptor>,
    pub entity: Arc<EntityDescriptor>,
}

/// Polls performance samples and publishes them as Prometheus gauges.
pub struct PerformanceExporter {
    enabled: bool,
    gate: TickGate,
    cache: MetadataCache,
    store: Arc<dyn Datastore>,
    mappings_dir: PathBuf,
    registry: Registry,
    mappings: MappingEngine,
    raw_gauge: GaugeVec,
    high_water_mark: DateTime<Utc>,
    latest: HashMap<SourceId, Sample>,
}

impl PerformanceExporter {
    /// Create the exporter and register the raw fallback gauge on
    /// `registry`. Mapped gauges are registered by [`ExporterModule::init`].
    pub fn new(
        store: Arc<dyn Datastore>,
        config: &ModuleConfig,
        mappings_dir: impl Into<PathBuf>,
        registry: Registry,
    ) -> prometheus::Result<Self> {
        let raw_gauge = GaugeVec::new(Opts::new(RAW_METRIC_NAME, RAW_HELP), &RAW_LABELS)?;
        registry.register(Box::new(raw_gauge.clone()))?;

        Ok(Self {
            enabled: config.enabled,
            gate: TickGate::new(config.poll_interval()),
            cache: MetadataCache::new(Arc::clone(&store)),
            store,
            mappings_dir: mappings_dir.into(),
            registry,
            mappings: MappingEngine::default(),
            raw_gauge,
            high_water_mark: Utc::now() - Duration::minutes(INITIAL_LOOKBACK_MINUTES),
            latest: HashMap::new(),
        })
    }

    /// Start polling from `hwm` instead of the default lookback.
    pub fn starting_from(mut self, hwm: DateTime<Utc>) -> Self {
        self.high_water_mark = hwm;
        self
    }

    /// Use a prebuilt mapping engine. Its gauges must live on the same
    /// registry as this exporter.
    pub fn with_mappings(mut self, mappings: MappingEngine) -> Self {
        self.mappings = mappings;
        self
    }

    /// Timestamp of the newest sample seen so far.
    pub fn high_water_mark(&self) -> DateTime<Utc> {
        self.high_water_mark
    }

    /// Newest retained sample per performance source.
    pub fn latest(&self) -> &HashMap<SourceId, Sample> {
        &self.latest
    }

    /// Mapping rules in use.
    pub fn mappings(&self) -> &MappingEngine {
        &self.mappings
    }

    /// Read new samples and fold them into the latest-per-source table.
    ///
    /// The high-water mark advances to the newest timestamp in the batch,
    /// and only once the whole batch has been resolved; a failure midway
    /// leaves it where it was so the next tick rereads the batch.
    pub async fn poll(&mut self) -> StoreResult<usize> {
        let rows = self.store.samples_since(self.high_water_mark).await?;
        let mut newest = self.high_water_mark;

        for row in &rows {
            let entity = self.cache.resolve_entity(row.entity_id).await?;
            let counter = self.cache.resolve_counter(row.counter_id).await?;

            let replace = self
                .latest
                .get(&row.source_id)
                .is_none_or(|current| row.timestamp > current.timestamp);
            if replace {
                self.latest.insert(
                    row.source_id,
                    Sample {
                        value: row.value,
                        timestamp: row.timestamp,
                        counter,
                        entity,
                    },
                );
            }

            newest = newest.max(row.timestamp);
        }

        self.high_water_mark = newest;
        debug!(
            rows = rows.len(),
            sources = self.latest.len(),
            hwm = %self.high_water_mark,
            "performance samples polled"
        );
        Ok(rows.len())
    }

    /// Write every retained sample into its gauge.
    pub fn publish(&self) {
        for sample in self.latest.values() {
            let mapped = self.mappings.lookup(&sample.counter.lookup_key).and_then(|rule| {
                self.mappings
                    .definition(&rule.metric_name)
                    .map(|def| (rule, def))
            });

            let result = match mapped {
                Some((rule, def)) => {
                    let values = rule.resolve_labels(&def.label_names, &sample.entity);
                    let values: Vec<&str> = values.iter().map(String::as_str).collect();
                    def.gauge
                        .get_metric_with_label_values(&values)
                        .map(|g| g.set(sample.value * rule.value_multiplier))
                }
                None => self
                    .raw_gauge
                    .get_metric_with_label_values(&[
                        sample.counter.object_name.as_str(),
                        sample.counter.counter_name.as_str(),
                        sample.entity.display_name.as_str(),
                        sample.entity.instance_name(),
                    ])
                    .map(|g| g.set(sample.value)),
            };

            if let Err(e) = result {
                warn!(counter = %sample.counter.lookup_key, error = %e, "cannot set gauge");
            }
        }
    }
}

#[async_trait]
impl ExporterModule for PerformanceExporter {
    fn name(&self) -> &'static str {
        "Performance"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn init(&mut self) -> anyhow::Result<()> {
        self.mappings = MappingEngine::load(&self.mappings_dir, &self.registry)
            .context("loading mapping rules")?;
        self.cache
            .load_bulk()
            .await
            .context("loading counter and entity metadata")?;
        Ok(())
    }

    async fn tick(&mut self) -> anyhow::Result<()> {
        if !self.gate.is_due(Instant::now()) {
            return Ok(());
        }

        let result = self.poll().await;
        if result.is_ok() {
            self.publish();
        }
        self.gate.mark_ran(Instant::now());

        result.map(|_| ()).context("polling performance samples")
    }
}
