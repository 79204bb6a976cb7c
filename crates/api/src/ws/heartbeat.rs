use std::sync::Arc;
use std::time::Duration;

use drawbridge_broker::WorkerHub;

/// Spawn a background task that sends periodic Ping frames to all connected
/// workers.
///
/// The task runs until aborted through the returned `JoinHandle`, which
/// happens during shutdown.
pub fn start_heartbeat(hub: Arc<WorkerHub>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so fresh workers
        // are not pinged on connect.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let count = hub.client_count().await;
            tracing::debug!(count, "Worker heartbeat ping");
            hub.ping_all().await;
        }
    })
}
