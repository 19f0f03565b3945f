//! Drain scheduler: periodic, level-triggered move from queue to log.
//!
//! DESIGN
//! ======
//! Fires on a fixed period. Each tick drains once unless the store is paused
//! or the pending queue is empty. A message arriving just after a tick waits
//! up to one full period. The first tick fires one period after spawn.
//!
//! The task owns no state of its own; aborting it (stop or drop) is the whole
//! teardown story.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::queue::ChatQueueStore;

pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(500);

/// One scheduler tick. Returns how many messages moved.
pub fn tick(store: &ChatQueueStore) -> usize {
    store.drain_if_unpaused()
}

/// Handle to the running drain task. Dropping it stops the task.
pub struct DrainScheduler {
    handle: JoinHandle<()>,
    period: Duration,
}

impl DrainScheduler {
    /// Spawn the periodic drain on the current tokio runtime.
    #[must_use]
    pub fn spawn(store: ChatQueueStore, period: Duration) -> Self {
        info!(period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "chat drain scheduler started");
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let moved = tick(&store);
                if moved > 0 {
                    debug!(moved, pending = store.pending_len(), "drained chat queue");
                }
            }
        });
        Self { handle, period }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the task and wait for it to wind down.
    pub async fn stop(mut self) {
        self.handle.abort();
        if let Err(e) = (&mut self.handle).await {
            if !e.is_cancelled() {
                warn!(error = %e, "chat drain task ended abnormally");
            }
        }
    }
}

impl Drop for DrainScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
