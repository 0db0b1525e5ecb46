/// Task Runner with Fixed Failure Backoff
///
/// Polling loop primitives for long-running background tasks. A failing
/// iteration is logged and followed by a fixed backoff; the loop itself never
/// gives up on a recoverable error. Loops stop only when their shutdown
/// channel flips to `true`.
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Timing of a polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Delay between two successful iterations
    pub interval: Duration,
    /// Delay after a failed iteration
    pub failure_backoff: Duration,
}

/// Consecutive failure bookkeeping for a polling loop
#[derive(Debug, Default, Clone)]
pub struct FailureTracker {
    consecutive_failures: u32,
    total_failures: u64,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_failures += 1;
    }

    /// Clears the consecutive count, returning how many failures preceded
    /// this success.
    pub fn record_success(&mut self) -> u32 {
        std::mem::take(&mut self.consecutive_failures)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    /// How long to wait before the next iteration.
    pub fn next_delay(&self, config: &LoopConfig) -> Duration {
        if self.consecutive_failures > 0 {
            config.failure_backoff
        } else {
            config.interval
        }
    }
}

/// Sleep for `duration` unless shutdown is requested first.
///
/// Returns `true` when the loop should stop.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = sleep(duration) => false,
        changed = shutdown.changed() => {
            // A dropped sender counts as a shutdown request
            changed.is_err() || *shutdown.borrow()
        }
    }
}

/// Run `task_fn` every `config.interval` until shutdown.
///
/// Errors are logged and followed by `config.failure_backoff`.
pub async fn run_periodic<F, Fut>(
    task_name: &str,
    config: LoopConfig,
    mut shutdown: watch::Receiver<bool>,
    mut task_fn: F,
) where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut tracker = FailureTracker::new();

    loop {
        match task_fn().await {
            Ok(()) => {
                let recovered_from = tracker.record_success();
                if recovered_from > 0 {
                    warn!(
                        "Task '{}' recovered after {} failures",
                        task_name, recovered_from
                    );
                }
            }
            Err(e) => {
                tracker.record_failure();
                error!(
                    "Task '{}' failed ({} consecutive): {}",
                    task_name,
                    tracker.consecutive_failures(),
                    e
                );
                warn!(
                    "Task '{}' will retry in {:?}",
                    task_name, config.failure_backoff
                );
            }
        }

        if sleep_or_shutdown(tracker.next_delay(&config), &mut shutdown).await {
            info!("Task '{}' stopping on shutdown", task_name);
            return;
        }
    }
}
