//! Tick loop: drives every enabled module sequentially.
//!
//! Modules never run concurrently with each other: one task walks the list
//! in a fixed order, ticks each module, then sleeps briefly. A failed tick
//! is logged and the loop moves on; the module retries on its next due tick.

use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::module::ExporterModule;

/// Pause between two rounds over the module list.
pub const DEFAULT_ROUND_PAUSE: Duration = Duration::from_millis(250);

/// Runs every enabled module in a fixed order until shutdown.
pub struct Scheduler {
    modules: Vec<Box<dyn ExporterModule>>,
    pause: Duration,
}

impl Scheduler {
    /// Build a scheduler over the enabled subset of `modules`.
    pub fn new(modules: Vec<Box<dyn ExporterModule>>) -> Self {
        let modules: Vec<_> = modules
            .into_iter()
            .filter(|m| {
                if !m.enabled() {
                    info!(module = m.name(), "module disabled");
                }
                m.enabled()
            })
            .collect();

        Self {
            modules,
            pause: DEFAULT_ROUND_PAUSE,
        }
    }

    /// Override the pause between rounds.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Names of the scheduled modules, in run order.
    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Initialize every module in order. The first failure aborts startup.
    pub async fn init_all(&mut self) -> anyhow::Result<()> {
        for module in &mut self.modules {
            info!(module = module.name(), "initializing module");
            module
                .init()
                .await
                .with_context(|| format!("module {} failed to initialize", module.name()))?;
        }
        Ok(())
    }

    /// Tick every module once.
    pub async fn run_round(&mut self) {
        for module in &mut self.modules {
            if let Err(e) = module.tick().await {
                error!(module = module.name(), error = %format!("{e:#}"), "module tick failed");
            }
        }
    }

    /// Run rounds until the shutdown signal fires.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(modules = ?self.module_names(), "main loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_round().await;

            tokio::select! {
                _ = tokio::time::sleep(self.pause) => {}
                _ = shutdown.changed() => {
                    debug!("main loop received shutdown");
                    break;
                }
            }
        }

        info!("main loop stopped");
    }
}
