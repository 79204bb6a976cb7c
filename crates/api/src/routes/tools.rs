use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tools;
use crate::state::AppState;

/// Tool routes mounted at `/api/v1/tools`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/draw_image", post(tools::draw_image))
        .route("/edit_image", post(tools::edit_image))
        .route("/connection_status", get(tools::connection_status))
}
