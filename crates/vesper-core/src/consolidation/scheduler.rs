//! Consolidation Scheduler
//!
//! Fixed local-clock schedule (03:00 daily by default) driving the
//! consolidation pipeline. The timer is a single tokio task; `start` is
//! idempotent, `stop` on a stopped scheduler is a no-op, and a manual run
//! can always be triggered through the consolidator directly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime, TimeZone};
use tokio::task::JoinHandle;

use super::Consolidator;

/// Daily schedule on the local clock
pub struct ConsolidationScheduler {
    consolidator: Arc<Consolidator>,
    fire_at: NaiveTime,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Next instant the schedule fires: today at `fire_at` if still ahead,
/// otherwise tomorrow at `fire_at`.
fn next_fire(now: DateTime<Local>, fire_at: NaiveTime) -> DateTime<Local> {
    let today = now.date_naive().and_time(fire_at);
    let candidate = Local
        .from_local_datetime(&today)
        .earliest()
        .unwrap_or(now);
    if candidate > now {
        candidate
    } else {
        let tomorrow = (now.date_naive() + ChronoDuration::days(1)).and_time(fire_at);
        Local.from_local_datetime(&tomorrow).earliest().unwrap_or(now)
    }
}

impl ConsolidationScheduler {
    /// Scheduler with the default 03:00 local fire time
    pub fn new(consolidator: Arc<Consolidator>) -> Self {
        Self::with_fire_time(consolidator, NaiveTime::from_hms_opt(3, 0, 0).expect("valid time"))
    }

    pub fn with_fire_time(consolidator: Arc<Consolidator>, fire_at: NaiveTime) -> Self {
        Self {
            consolidator,
            fire_at,
            handle: Mutex::new(None),
        }
    }

    /// Whether the timer task is running
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|h| h.as_ref().is_some_and(|task| !task.is_finished()))
            .unwrap_or(false)
    }

    /// Start the timer. Redundant calls are no-ops.
    pub fn start(&self) {
        let Ok(mut slot) = self.handle.lock() else {
            return;
        };
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let consolidator = Arc::clone(&self.consolidator);
        let fire_at = self.fire_at;
        let task = tokio::spawn(async move {
            loop {
                let now = Local::now();
                let target = next_fire(now, fire_at);
                let wait = (target - now)
                    .to_std()
                    .unwrap_or(Duration::from_secs(1));
                tracing::info!(fire_at = %target, "consolidation scheduled");
                tokio::time::sleep(wait).await;

                // Failures are isolated: the timer keeps ticking
                if let Err(e) = consolidator.run().await {
                    tracing::warn!(error = %e, "scheduled consolidation failed");
                }
            }
        });
        *slot = Some(task);
    }

    /// Stop the timer. Stopping a stopped scheduler is a no-op.
    pub fn stop(&self) {
        if let Ok(mut slot) = self.handle.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

impl Drop for ConsolidationScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// TESTS
// ============================================================================
