//! scomdbd: the SCOM database exporter daemon.
//!
//! Single binary that assembles every exporter module:
//! - SQL Server datastore (tiberius)
//! - Performance poller + mapping engine
//! - Entity health snapshotter
//! - Alert tracker
//! - HTTP endpoints (`/metrics`, `/state/`, `/alerts/`)
//!
//! # Usage
//!
//! ```text
//! scomdbd run --config /etc/scomdb/scomdb.toml
//! scomdbd check-mappings --dir /etc/scomdb/mappings
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use prometheus::Registry;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scomdb_alerts::AlertExporter;
use scomdb_api::{build_router, ApiState};
use scomdb_core::{ExporterConfig, ExporterModule, Scheduler};
use scomdb_health::StateExporter;
use scomdb_metrics::{MappingEngine, PerformanceExporter};
use scomdb_store::{Datastore, SqlServerStore};

const DEFAULT_LOG_FILTER: &str = "info,scomdbd=debug,scomdb=debug";

#[derive(Parser)]
#[command(name = "scomdbd", about = "SCOM database exporter")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the database and serve the HTTP endpoints until Ctrl-C.
    Run {
        /// Configuration file (`.json` or `.toml`).
        #[arg(long, default_value = "scomdb.toml")]
        config: PathBuf,
    },

    /// Load a mapping directory and print the metrics it defines.
    CheckMappings {
        #[arg(long, default_value = "mappings")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run { config } => run(&config).await,
        Command::CheckMappings { dir } => check_mappings(&dir),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Plain => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = ExporterConfig::from_file(config_path)?;
    info!(config = %config_path.display(), "SCOM DB exporter starting");

    // ── Collaborators ──────────────────────────────────────────

    let store: Arc<dyn Datastore> = Arc::new(SqlServerStore::new(
        &config.connection_string,
        config.query_timeout(),
    )?);

    let registry = Registry::new();
    register_process_metrics(&registry);

    // ── Modules ────────────────────────────────────────────────

    let performance = PerformanceExporter::new(
        Arc::clone(&store),
        &config.modules.metrics,
        config.mappings_dir.clone(),
        registry.clone(),
    )
    .context("registering performance gauges")?;
    let state = StateExporter::new(Arc::clone(&store), &config.modules.state);
    let alert = AlertExporter::new(store, &config.modules.alert);

    let mut api = ApiState::new(registry);
    if state.enabled() {
        api = api.with_states(state.snapshot());
    }
    if alert.enabled() {
        api = api.with_alerts(alert.snapshot());
    }

    let modules: Vec<Box<dyn ExporterModule>> =
        vec![Box::new(performance), Box::new(state), Box::new(alert)];
    let mut scheduler = Scheduler::new(modules);
    scheduler.init_all().await?;

    // ── Main loop + HTTP ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "HTTP server listening");

    let server = axum::serve(listener, build_router(api)).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C, shutting down");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;
    let _ = scheduler_handle.await;

    info!("SCOM DB exporter stopped");
    Ok(())
}

#[cfg(target_os = "linux")]
fn register_process_metrics(registry: &Registry) {
    let collector = prometheus::process_collector::ProcessCollector::for_self();
    if let Err(e) = registry.register(Box::new(collector)) {
        warn!(error = %e, "process metrics unavailable");
    }
}

#[cfg(not(target_os = "linux"))]
fn register_process_metrics(_registry: &Registry) {
    warn!("process metrics are only collected on Linux");
}

fn check_mappings(dir: &Path) -> anyhow::Result<()> {
    let registry = Registry::new();
    let engine = MappingEngine::load(dir, &registry)
        .with_context(|| format!("loading mappings from {}", dir.display()))?;

    println!(
        "{}: {} rules, {} metrics",
        dir.display(),
        engine.rule_count(),
        engine.definitions().len()
    );
    for def in engine.definitions() {
        println!("  {} {{{}}}", def.metric_name, def.label_names.join(", "));
    }
    Ok(())
}
