//! Exporter configuration.
//!
//! Read once at startup from a TOML file, or from a JSON file when the path
//! ends in `.json`. JSON keys written in the PascalCase `appsettings.json`
//! style are accepted through aliases.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// ADO-style SQL Server connection string. Required.
    #[serde(alias = "ConnectionString")]
    pub connection_string: String,
    /// Upper bound for a single database call.
    #[serde(alias = "QueryTimeoutSecs")]
    pub query_timeout_secs: u64,
    /// Directory scanned for counter→metric mapping files.
    #[serde(alias = "MappingsDir")]
    pub mappings_dir: PathBuf,
    #[serde(alias = "Http")]
    pub http: HttpConfig,
    #[serde(alias = "Modules")]
    pub modules: ModulesConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            query_timeout_secs: 30,
            mappings_dir: PathBuf::from("mappings"),
            http: HttpConfig::default(),
            modules: ModulesConfig::default(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(alias = "Host")]
    pub host: String,
    #[serde(alias = "Port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9464,
        }
    }
}

/// Per-module settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    #[serde(alias = "Metrics")]
    pub metrics: ModuleConfig,
    #[serde(alias = "State")]
    pub state: StateModuleConfig,
    #[serde(alias = "Alert")]
    pub alert: AlertModuleConfig,
}

/// Enable flag and poll interval shared by every module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    #[serde(alias = "Enabled")]
    pub enabled: bool,
    #[serde(alias = "PollSeconds")]
    pub poll_seconds: u64,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_seconds: 5,
        }
    }
}

impl ModuleConfig {
    /// Time between two polls, at least one second.
    pub fn poll_interval(&self) -> Duration {
        poll_interval(self.poll_seconds)
    }
}

/// Settings for the entity health state module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateModuleConfig {
    #[serde(alias = "Enabled")]
    pub enabled: bool,
    #[serde(alias = "PollSeconds")]
    pub poll_seconds: u64,
    /// Monitor whose per-entity state is exported.
    #[serde(alias = "MonitorName")]
    pub monitor_name: String,
}

impl Default for StateModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_seconds: 30,
            monitor_name: "System.Health.EntityState".to_string(),
        }
    }
}

impl StateModuleConfig {
    /// Time between two polls, at least one second.
    pub fn poll_interval(&self) -> Duration {
        poll_interval(self.poll_seconds)
    }
}

/// Settings for the alert module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertModuleConfig {
    #[serde(alias = "Enabled")]
    pub enabled: bool,
    #[serde(alias = "PollSeconds")]
    pub poll_seconds: u64,
    /// Also poll alerts in the closed resolution state.
    #[serde(alias = "IncludeClosedAlerts")]
    pub include_closed_alerts: bool,
    /// How long a closed alert stays tracked before it is forgotten.
    #[serde(alias = "ClosedAlertRetentionMinutes")]
    pub closed_alert_retention_minutes: u64,
}

impl Default for AlertModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_seconds: 5,
            include_closed_alerts: false,
            closed_alert_retention_minutes: 60,
        }
    }
}

impl AlertModuleConfig {
    /// Time between two polls, at least one second.
    pub fn poll_interval(&self) -> Duration {
        poll_interval(self.poll_seconds)
    }

    pub fn closed_alert_retention(&self) -> Duration {
        Duration::from_secs(self.closed_alert_retention_minutes.saturating_mul(60))
    }
}

/// Poll intervals never drop below one second.
fn poll_interval(seconds: u64) -> Duration {
    Duration::from_secs(seconds.max(1))
}

impl ExporterConfig {
    /// Load and validate a configuration file.
    ///
    /// A relative `mappings_dir` is resolved against the directory holding
    /// the configuration file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let mut config = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
        .map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        if config.mappings_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.mappings_dir = parent.join(&config.mappings_dir);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    fn from_json_str(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    /// Reject configurations the exporter cannot start with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.connection_string.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "connection_string is null or empty".to_string(),
            ));
        }
        if self.http.port == 0 {
            return Err(ConfigError::Invalid("http.port must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Per-call database timeout, at least one second.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs.max(1))
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }
}
