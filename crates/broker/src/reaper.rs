//! Periodic cleanup of overdue tasks, dead clients and old task history.
//!
//! The dispatcher already sweeps before every submission; this loop keeps
//! state tidy when no submissions arrive. Runs on a fixed interval using
//! `tokio::time::interval` until the cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::hub::WorkerHub;

/// Default time between reaper passes.
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(10);

/// Default time finished tasks stay visible in status snapshots.
pub const DEFAULT_TASK_RETENTION: Duration = Duration::from_secs(3600);

/// Run the reaper loop.
pub async fn run(
    hub: Arc<WorkerHub>,
    interval: Duration,
    retention: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        retention_secs = retention.as_secs(),
        "Reaper started",
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reaper stopping");
                break;
            }
            _ = ticker.tick() => {
                let report = hub.reap(retention).await;
                if report.timed_out + report.dead_clients + report.pruned_tasks > 0 {
                    tracing::info!(
                        timed_out = report.timed_out,
                        dead_clients = report.dead_clients,
                        pruned_tasks = report.pruned_tasks,
                        "Reaper pass",
                    );
                } else {
                    tracing::trace!("Reaper pass: nothing to do");
                }
            }
        }
    }
}
