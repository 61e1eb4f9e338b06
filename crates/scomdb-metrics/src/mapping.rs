//! Declarative counter → metric mapping rules.
//!
//! Rules are read once at startup from `*.json` and `*.toml` files in a
//! directory. Each rule targets a metric name; the label schema of a metric
//! is the union of label keys over every rule that targets it, so rules may
//! cover only part of the schema. Missing labels are emitted as `""`.
//!
//! ```toml
//! [[mappings]]
//! object_name = "LogicalDisk"
//! counter_name = "% Free Space"
//! metric_name = "disk_free_pct"
//! labels = { host = "{instance}", disk = "{entity}" }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use prometheus::{GaugeVec, Opts, Registry};
use serde::Deserialize;
use tracing::{debug, info, warn};

use scomdb_store::{lookup_key, EntityDescriptor};

/// Template token replaced by the entity's short instance name.
pub const INSTANCE_TOKEN: &str = "{instance}";
/// Template token replaced by the entity's display name.
pub const ENTITY_TOKEN: &str = "{entity}";

const MAPPED_HELP: &str = "Mapped SCOM metric";

/// Errors raised while loading mapping files.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("cannot register metric {metric}: {source}")]
    Register {
        metric: String,
        #[source]
        source: prometheus::Error,
    },
}

pub type MappingResult<T> = Result<T, MappingError>;

/// One counter → metric rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MappingRule {
    #[serde(alias = "ObjectName")]
    pub object_name: String,
    #[serde(alias = "CounterName")]
    pub counter_name: String,
    #[serde(alias = "MetricName")]
    pub metric_name: String,
    /// label name → template (`{instance}`, `{entity}` or literal text)
    #[serde(default, alias = "Labels")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default = "default_multiplier", alias = "ValueMultiplier")]
    pub value_multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

impl MappingRule {
    /// Lowercase `object|counter` key of this rule.
    pub fn lookup_key(&self) -> String {
        lookup_key(&self.object_name, &self.counter_name)
    }

    /// Value of label `label` for a sample of `entity`.
    pub fn resolve_label(&self, label: &str, entity: &EntityDescriptor) -> String {
        match self.labels.as_ref().and_then(|labels| labels.get(label)) {
            Some(template) if template == INSTANCE_TOKEN => entity.instance_name().to_string(),
            Some(template) if template == ENTITY_TOKEN => entity.display_name.clone(),
            Some(literal) => literal.clone(),
            None => String::new(),
        }
    }

    /// Values for every label in `label_names`, in that order.
    pub fn resolve_labels(&self, label_names: &[String], entity: &EntityDescriptor) -> Vec<String> {
        label_names
            .iter()
            .map(|name| self.resolve_label(name, entity))
            .collect()
    }

    fn label_keys(&self) -> impl Iterator<Item = &String> {
        self.labels.iter().flat_map(|labels| labels.keys())
    }
}

#[derive(Debug, Default, Deserialize)]
struct MappingFile {
    #[serde(default, alias = "Mappings")]
    mappings: Vec<MappingRule>,
}

/// A metric materialized from the rules that target it.
#[derive(Clone)]
pub struct MetricDefinition {
    pub metric_name: String,
    /// Sorted union of label keys over all rules for this metric.
    pub label_names: Vec<String>,
    pub gauge: GaugeVec,
}

impl std::fmt::Debug for MetricDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricDefinition")
            .field("metric_name", &self.metric_name)
            .field("label_names", &self.label_names)
            .finish_non_exhaustive()
    }
}

/// Read-only rule index and metric table, built once at startup.
#[derive(Debug, Default)]
pub struct MappingEngine {
    rules: HashMap<String, MappingRule>,
    definitions: HashMap<String, MetricDefinition>,
}

impl MappingEngine {
    /// Load every mapping file in `dir` and register its metrics on
    /// `registry`. A missing directory yields an empty engine; a file that
    /// cannot be read or parsed is skipped with a warning.
    pub fn load(dir: &Path, registry: &Registry) -> MappingResult<Self> {
        if !dir.is_dir() {
            info!(dir = %dir.display(), "mapping directory not found, no mappings loaded");
            return Ok(Self::default());
        }

        let mut rules = Vec::new();
        for path in mapping_files(dir)? {
            match read_rules(&path) {
                Ok(file_rules) => {
                    debug!(path = %path.display(), rules = file_rules.len(), "mapping file loaded");
                    rules.extend(file_rules);
                }
                Err(e) => warn!(error = %e, "skipping mapping file"),
            }
        }

        let engine = Self::from_rules(rules, registry);
        info!(
            dir = %dir.display(),
            rules = engine.rule_count(),
            metrics = engine.definitions.len(),
            "mappings loaded"
        );
        Ok(engine)
    }

    /// Build from rules in precedence order: for a repeated
    /// `object|counter` key the later rule wins.
    pub fn from_rules(rules: impl IntoIterator<Item = MappingRule>, registry: &Registry) -> Self {
        let mut index = HashMap::new();
        let mut schemas: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for rule in rules {
            // Every rule contributes to the schema, including ones later
            // shadowed in the index.
            schemas
                .entry(rule.metric_name.clone())
                .or_default()
                .extend(rule.label_keys().cloned());
            index.insert(rule.lookup_key(), rule);
        }

        let mut definitions = HashMap::new();
        for (metric_name, labels) in schemas {
            let label_names: Vec<String> = labels.into_iter().collect();
            match register_gauge(&metric_name, &label_names, registry) {
                Ok(gauge) => {
                    definitions.insert(
                        metric_name.clone(),
                        MetricDefinition {
                            metric_name,
                            label_names,
                            gauge,
                        },
                    );
                }
                Err(e) => warn!(error = %e, "skipping mapped metric"),
            }
        }

        Self {
            rules: index,
            definitions,
        }
    }

    /// Rule for a lowercase `object|counter` key.
    pub fn lookup(&self, key: &str) -> Option<&MappingRule> {
        self.rules.get(key)
    }

    /// Definition of the metric named `metric_name`.
    pub fn definition(&self, metric_name: &str) -> Option<&MetricDefinition> {
        self.definitions.get(metric_name)
    }

    /// All metric definitions, sorted by name.
    pub fn definitions(&self) -> Vec<&MetricDefinition> {
        let mut defs: Vec<_> = self.definitions.values().collect();
        defs.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));
        defs
    }

    /// Number of distinct `object|counter` keys with a rule.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

fn mapping_files(dir: &Path) -> MappingResult<Vec<PathBuf>> {
    let read_err = |source| MappingError::Read {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        let is_mapping = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json" | "toml")
        );
        if is_mapping && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_rules(path: &Path) -> MappingResult<Vec<MappingRule>> {
    let content = fs::read_to_string(path).map_err(|source| MappingError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |message: String| MappingError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let file: MappingFile = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        _ => toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
    };
    Ok(file.mappings)
}

fn register_gauge(
    metric_name: &str,
    label_names: &[String],
    registry: &Registry,
) -> MappingResult<GaugeVec> {
    let register_err = |source| MappingError::Register {
        metric: metric_name.to_string(),
        source,
    };

    let labels: Vec<&str> = label_names.iter().map(String::as_str).collect();
    let gauge = GaugeVec::new(Opts::new(metric_name, MAPPED_HELP), &labels).map_err(register_err)?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(register_err)?;
    Ok(gauge)
}
