pub mod health;
pub mod tools;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /tools/draw_image                                text-to-image (POST)
/// /tools/edit_image                                image-to-image (POST)
/// /tools/connection_status                         registry and ledger snapshot (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/tools", tools::router())
}
