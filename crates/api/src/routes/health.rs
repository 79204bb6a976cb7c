use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Number of registered worker connections.
    pub connected_clients: usize,
}

/// GET /health -- returns service status and worker count.
///
/// Zero workers is reported as `degraded`: the broker is up but cannot
/// serve any tool call.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected_clients = state.hub.client_count().await;

    let status = if connected_clients > 0 { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        connected_clients,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
