use std::sync::Arc;

use drawbridge_broker::{Dispatcher, WorkerHub};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Worker registry and task ledger.
    pub hub: Arc<WorkerHub>,
    /// Job dispatcher bound to `hub`.
    pub dispatcher: Dispatcher,
}

impl AppState {
    /// Build state around a fresh hub.
    pub fn new(config: ServerConfig) -> Self {
        let hub = Arc::new(WorkerHub::new());
        let dispatcher = Dispatcher::new(Arc::clone(&hub), config.broker_config());
        Self {
            config: Arc::new(config),
            hub,
            dispatcher,
        }
    }
}
