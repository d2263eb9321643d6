//! Tick-rate scheduler — scans the store for due entities and fans their
//! steps out to a bounded worker pool.
//!
//! The scheduler holds no timing state of its own: every deadline lives on
//! the entity record, so any number of scheduler instances can run
//! concurrently. Per-entity mutual exclusion comes from the store's
//! compare-and-swap contract, not from locks — a duplicate submission loses
//! the version race and no-ops. At-least-once delivery of "this entity is
//! due" is therefore fine.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cadence_core::config::EngineConfig;
use cadence_core::store::LifecycleStore;

use crate::error::Result;
use crate::executor::StepExecutor;

// ─── TickSummary ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TickSummary {
    /// Due entities submitted this tick.
    pub submitted: usize,
    /// Steps that completed without an engine error.
    pub completed: usize,
    /// Steps that failed (logged; the entity stays due and is retried on a
    /// later tick).
    pub failed: usize,
}

// ─── Scheduler ────────────────────────────────────────────────────────────

pub struct Scheduler {
    store: Arc<LifecycleStore>,
    executor: Arc<StepExecutor>,
    tick_interval: Duration,
    workers: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<LifecycleStore>,
        executor: Arc<StepExecutor>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            executor,
            tick_interval: config.tick_interval(),
            workers: Arc::new(Semaphore::new(config.max_workers.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run the periodic scan until the surrounding task is cancelled.
    ///
    /// A failed tick (store unavailable) is logged and skipped — the next
    /// tick retries with no partial writes to clean up.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match self.tick(Utc::now()).await {
                Ok(summary) if summary.submitted > 0 => {
                    info!(
                        "tick: {} submitted, {} completed, {} failed",
                        summary.submitted, summary.completed, summary.failed
                    );
                }
                Ok(_) => {}
                Err(e) => warn!("scheduler tick failed closed, retrying next cycle: {e}"),
            }
        }
    }

    /// One scan: query due entities and drive a step for each.
    ///
    /// Blocks until all submitted steps finish, which keeps `tick` usable
    /// as a one-shot pass for cron-style operation and tests.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let due = self.store.query_due(now)?;
        let mut summary = TickSummary::default();
        let mut join = JoinSet::new();

        for entity in due {
            let id = entity.id;
            {
                let mut in_flight = self.in_flight.lock().await;
                if !in_flight.insert(id) {
                    debug!("entity {id} already in flight; skipping duplicate submission");
                    continue;
                }
            }
            summary.submitted += 1;

            let Ok(permit) = self.workers.clone().acquire_owned().await else {
                // Semaphore closed only on shutdown.
                break;
            };
            let executor = self.executor.clone();
            let in_flight = self.in_flight.clone();
            join.spawn(async move {
                let result = executor.step(id, now).await;
                in_flight.lock().await.remove(&id);
                drop(permit);
                (id, result)
            });
        }

        while let Some(joined) = join.join_next().await {
            match joined {
                Ok((_, Ok(()))) => summary.completed += 1,
                Ok((id, Err(e))) => {
                    summary.failed += 1;
                    warn!("step for entity {id} failed: {e}");
                }
                Err(join_err) => {
                    summary.failed += 1;
                    warn!("worker task aborted: {join_err}");
                }
            }
        }
        Ok(summary)
    }

    /// Startup recovery: re-post any notification that committed with its
    /// transition but never reached the channel.
    ///
    /// The preceding send is never repeated — it committed with the
    /// transition — so this re-sends exactly the owed notice and nothing
    /// else. Harmless to run at any time.
    pub async fn recover(&self) -> Result<usize> {
        let owed = self.store.scan_pending_notices()?;
        let mut reposted = 0;
        for entity in owed {
            match self.executor.flush_notice(&entity).await {
                Ok(()) => reposted += 1,
                Err(e) => warn!("recovery flush for entity {} failed: {e}", entity.id),
            }
        }
        if reposted > 0 {
            info!("recovery re-posted {reposted} owed notification(s)");
        }
        Ok(reposted)
    }
}
