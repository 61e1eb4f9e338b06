//! Exporter module lifecycle.
//!
//! Every exporter (performance, alert, state) is driven the same way: one
//! `init()` at startup, then `tick()` from the scheduler loop. Each module
//! decides for itself whether a tick is due using a [`TickGate`].

use std::time::{Duration, Instant};

use async_trait::async_trait;

/// A pollable exporter driven by the [`Scheduler`](crate::Scheduler).
#[async_trait]
pub trait ExporterModule: Send {
    /// Module name used in logs and error context.
    fn name(&self) -> &'static str;

    /// Disabled modules are dropped by the scheduler.
    fn enabled(&self) -> bool;

    /// Called once before the first tick. An error here is fatal.
    async fn init(&mut self) -> anyhow::Result<()>;

    /// Called repeatedly from the scheduler loop. Most calls are no-ops
    /// because the module's poll interval has not elapsed.
    async fn tick(&mut self) -> anyhow::Result<()>;
}

/// Gates a module's work to at most once per interval.
///
/// The next due time is computed from when a run *finished*, so a slow poll
/// pushes the next one back instead of overlapping it.
#[derive(Debug, Clone)]
pub struct TickGate {
    interval: Duration,
    next_due: Option<Instant>,
}

impl TickGate {
    /// Create a new gate. Intervals below one second are raised to one second.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_secs(1)),
            next_due: None,
        }
    }

    /// Effective interval after the one-second floor.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a run is due at `now`. Always true before the first run.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due.is_none_or(|due| now >= due)
    }

    /// Record that a run completed at `finished`.
    pub fn mark_ran(&mut self, finished: Instant) {
        self.next_due = Some(finished + self.interval);
    }
}
