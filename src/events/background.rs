//! Periodic background work — the scheduling tick.
//!
//! `register_periodic` spawns a tokio task that runs a job at a fixed
//! interval. A run that takes longer than the interval delays the next one
//! instead of overlapping it or skipping it. A run that panics is logged
//! and the next tick still fires.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle for a periodic job.
///
/// `shutdown()` lets a running invocation finish; dropping the handle
/// cancels the task outright.
pub struct PeriodicHandle {
    name: &'static str,
    shutdown: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl PeriodicHandle {
    /// Stop after the current invocation, if any.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PeriodicHandle {
    fn drop(&mut self) {
        self.shutdown();
        self.task.abort();
        tracing::debug!(job = self.name, "Periodic job stopped");
    }
}

/// Run `job` every `interval`, first run one interval from now.
///
/// Must be called from within a tokio runtime.
pub fn register_periodic<F, Fut>(name: &'static str, interval: Duration, job: F) -> PeriodicHandle
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let task = tokio::spawn(async move {
        tracing::info!(job = name, "Periodic job started (every {}s)", interval.as_secs());
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if flag.load(Ordering::Relaxed) {
                break;
            }
            if let Err(e) = tokio::spawn(job()).await {
                tracing::warn!(job = name, error = %e, "Periodic job run failed");
            }
        }
        tracing::info!(job = name, "Periodic job shutting down");
    });

    PeriodicHandle {
        name,
        shutdown,
        task,
    }
}
