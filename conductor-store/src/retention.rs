use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::unix_nanos;
use crate::SpanStore;

/// Upper bound on a single retention pass.
const PASS_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Retention policy for stored traces.
#[derive(Clone, Debug)]
pub struct RetentionConfig {
    /// Traces older than this are deleted.
    pub max_age: Duration,
    /// Interval between sweeps.
    pub interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig {
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Handle to a running retention worker.
#[derive(Clone, Debug)]
pub struct RetentionHandle {
    wake: mpsc::Sender<()>,
    cancel: CancellationToken,
}

impl RetentionHandle {
    /// Request an immediate sweep in addition to the periodic tick.
    pub fn cleanup_now(&self) {
        let _ = self.wake.try_send(());
    }

    /// Stop the worker.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Spawn the retention worker: one long-lived task woken by a periodic
/// tick or an explicit [`RetentionHandle::cleanup_now`]. Each pass is
/// bounded by an internal five-minute deadline and failures are logged
/// and skipped, never propagated.
pub fn spawn_retention(store: SpanStore, config: RetentionConfig) -> RetentionHandle {
    let (wake, mut wake_rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let handle = RetentionHandle {
        wake,
        cancel: cancel.clone(),
    };

    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval fires immediately; consume the first tick.
        tick.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {}
                _ = wake_rx.recv() => {}
            }
            run_pass(&store, config.max_age).await;
        }
    });

    handle
}

async fn run_pass(store: &SpanStore, max_age: Duration) {
    let cutoff_ns = unix_nanos(SystemTime::now()) - max_age.as_nanos() as i64;
    match tokio::time::timeout(PASS_DEADLINE, store.delete_traces_older_than(cutoff_ns)).await {
        Ok(Ok(deleted)) if deleted > 0 => {
            info!(deleted, "retention pass removed expired traces");
        }
        Ok(Ok(_)) => {}
        Ok(Err(err)) => warn!(error = %err, "retention pass failed"),
        Err(_) => warn!("retention pass exceeded its deadline"),
    }
}
