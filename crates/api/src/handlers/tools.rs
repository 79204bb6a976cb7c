//! Handlers for the caller-facing image tools.
//!
//! Each generation tool blocks until a worker reports back, the task errors,
//! or its timeout elapses.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use drawbridge_broker::HubSnapshot;
use drawbridge_core::generation::resolve_ratio;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Body of `POST /tools/draw_image`.
///
/// A missing prompt deserializes as empty so it fails prompt validation
/// with the usual message rather than a JSON rejection.
#[derive(Debug, Deserialize)]
pub struct DrawImageInput {
    #[serde(default)]
    pub prompt: String,
    pub ratio: Option<String>,
}

/// Body of `POST /tools/edit_image`.
#[derive(Debug, Deserialize)]
pub struct EditImageInput {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub reference_picture: String,
    pub ratio: Option<String>,
}

/// Successful tool result.
#[derive(Debug, Serialize)]
pub struct ImageResult {
    pub status: &'static str,
    pub image_urls: Vec<String>,
}

impl ImageResult {
    fn success(image_urls: Vec<String>) -> Self {
        Self {
            status: "success",
            image_urls,
        }
    }
}

// ---------------------------------------------------------------------------
// POST /tools/draw_image
// ---------------------------------------------------------------------------

/// Generate an image from a text prompt.
pub async fn draw_image(
    State(state): State<AppState>,
    input: Result<Json<DrawImageInput>, JsonRejection>,
) -> AppResult<Json<ImageResult>> {
    let Json(input) = input.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let ratio = resolve_ratio(input.ratio.as_deref());

    tracing::info!(ratio = %ratio, prompt_len = input.prompt.len(), "draw_image requested");

    let urls = state
        .dispatcher
        .submit_generation(&input.prompt, &ratio)
        .await?;

    Ok(Json(ImageResult::success(urls)))
}

// ---------------------------------------------------------------------------
// POST /tools/edit_image
// ---------------------------------------------------------------------------

/// Generate an image from a prompt and a reference picture URL.
pub async fn edit_image(
    State(state): State<AppState>,
    input: Result<Json<EditImageInput>, JsonRejection>,
) -> AppResult<Json<ImageResult>> {
    let Json(input) = input.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let ratio = resolve_ratio(input.ratio.as_deref());

    tracing::info!(
        ratio = %ratio,
        prompt_len = input.prompt.len(),
        reference_picture = %input.reference_picture,
        "edit_image requested",
    );

    let urls = state
        .dispatcher
        .submit_edit(&input.prompt, &input.reference_picture, &ratio)
        .await?;

    Ok(Json(ImageResult::success(urls)))
}

// ---------------------------------------------------------------------------
// GET /tools/connection_status
// ---------------------------------------------------------------------------

/// Snapshot of every registered worker and every task still in the ledger.
pub async fn connection_status(State(state): State<AppState>) -> Json<HubSnapshot> {
    Json(state.hub.snapshot().await)
}
