//! Background checkpointing.
//!
//! A [`Checkpointer`] owns a tokio task that, every checkpoint interval, sweeps idle buckets and
//! saves a snapshot. Save failures are logged and retried on the next tick. Shutting it down
//! performs one last save so a graceful stop loses nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::limiter::RateLimiter;
use crate::persistence::SnapshotStore;

/// Counters reported when a [`Checkpointer`] stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointStats {
    /// Successful saves, including the final one.
    pub saves: u64,
    /// Failed saves.
    pub failures: u64,
    /// Buckets removed by idle sweeps.
    pub evicted: u64,
}

impl CheckpointStats {
    fn record(&mut self, saved: bool) {
        if saved {
            self.saves += 1;
        } else {
            self.failures += 1;
        }
    }
}

/// Handle to a running checkpoint task.
#[derive(Debug)]
pub struct Checkpointer {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<CheckpointStats>,
}

impl Checkpointer {
    /// Spawn on the current tokio runtime using the limiter's configured interval.
    pub fn spawn<S>(limiter: RateLimiter, store: Arc<S>) -> Self
    where
        S: SnapshotStore + 'static,
    {
        let every = limiter.checkpoint_interval();
        Self::spawn_every(limiter, store, every)
    }

    /// Spawn with an explicit interval. A zero interval is raised to one millisecond.
    pub fn spawn_every<S>(limiter: RateLimiter, store: Arc<S>, every: Duration) -> Self
    where
        S: SnapshotStore + 'static,
    {
        let every = every.max(Duration::from_millis(1));
        let (shutdown, mut stop) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut stats = CheckpointStats::default();
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        stats.evicted += limiter.evict_idle() as u64;
                        stats.record(limiter.checkpoint(&*store).await.is_ok());
                    }
                    // Fires on an explicit shutdown and when the handle is dropped.
                    _ = &mut stop => break,
                }
            }
            stats.record(limiter.checkpoint(&*store).await.is_ok());
            debug!(
                target: "quotawarden::checkpoint",
                saves = stats.saves,
                failures = stats.failures,
                evicted = stats.evicted,
                "checkpointer stopped"
            );
            stats
        });
        Self { shutdown, handle }
    }

    /// Stop the task after a final save and return its counters.
    pub async fn shutdown(self) -> CheckpointStats {
        let _ = self.shutdown.send(());
        match self.handle.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(target: "quotawarden::checkpoint", error = %e, "checkpoint task failed");
                CheckpointStats::default()
            }
        }
    }
}
