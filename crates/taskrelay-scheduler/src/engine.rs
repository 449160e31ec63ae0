//! Dispatch worker — the polling loop that executes due tasks.
//!
//! Each cycle reads up to `batch_size` due rows for the registered task
//! types, runs them one at a time, and records `done` or `failed`.
//!
//! Delivery is at-least-once: there is no claim step, so a crash between a
//! successful provider call and the status write leaves the row `pending`
//! and it is dispatched again on the next cycle.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use taskrelay_core::config::WorkerConfig;
use taskrelay_core::error::Result;
use taskrelay_core::task::TaskStatus;

use crate::persistence::TaskDb;
use crate::registry::HandlerRegistry;

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub picked: usize,
    pub done: usize,
    pub failed: usize,
}

pub struct DispatchWorker {
    db: Arc<TaskDb>,
    registry: HandlerRegistry,
    poll_interval: Duration,
    batch_size: u32,
}

impl DispatchWorker {
    pub fn new(db: Arc<TaskDb>, registry: HandlerRegistry, config: &WorkerConfig) -> Self {
        Self {
            db,
            registry,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            batch_size: config.batch_size,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run one dispatch pass at `now`. A task failure is recorded and the
    /// pass continues; a store failure ends the pass with an error.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let due = self
            .db
            .due_tasks(now, &self.registry.types(), self.batch_size)?;
        let mut report = CycleReport {
            picked: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            tracing::debug!("no due tasks");
            return Ok(report);
        }
        tracing::info!("🔔 {} due task(s)", due.len());

        for task in &due {
            let Some(handler) = self.registry.get(task.task_type) else {
                continue;
            };
            tracing::info!("▶️ Task {} ({}) → {}", task.id, task.task_type, handler.name());

            let status = match handler.execute(task).await {
                Ok(()) => {
                    tracing::info!("✅ Task {} done", task.id);
                    report.done += 1;
                    TaskStatus::Done
                }
                Err(e) => {
                    tracing::error!("❌ Task {} failed: {e}", task.id);
                    report.failed += 1;
                    TaskStatus::Failed
                }
            };
            if !self.db.mark(task.id, status)? {
                tracing::warn!("⚠️ Task {} was no longer pending when marked {status}", task.id);
            }
        }
        Ok(report)
    }

    /// Poll until `shutdown` resolves. The shutdown is only observed between
    /// cycles, so a dispatch in flight always gets its status written.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            "⏰ Dispatch worker started (every {}s, batch {}, handlers: {})",
            self.poll_interval.as_secs(),
            self.batch_size,
            self.registry
                .types()
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        for missing in self.registry.missing() {
            tracing::warn!("⚠️ No handler for '{missing}' — those tasks stay pending");
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle(Utc::now()).await {
                        tracing::error!("❌ Dispatch cycle aborted: {e}");
                    }
                }
            }
        }
        tracing::info!("🛑 Dispatch worker stopped");
    }
}
