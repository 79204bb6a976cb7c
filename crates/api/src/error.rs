use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use drawbridge_broker::DispatchError;
use drawbridge_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`DispatchError`] for broker failures and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses of the form `{"status":"error","code":...,"error":...,"message":...}`.
/// `message` repeats `error` for callers of the older tool contract.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A failure from the job broker.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Dispatch(dispatch) => classify_dispatch_error(dispatch),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "status": "error",
            "code": code,
            "error": message,
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map a broker failure to an HTTP status, error code, and message.
fn classify_dispatch_error(err: &DispatchError) -> (StatusCode, &'static str, String) {
    match err {
        DispatchError::Validation(CoreError::Validation(msg)) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        DispatchError::NoIdleClients => (
            StatusCode::SERVICE_UNAVAILABLE,
            "NO_IDLE_CLIENTS",
            err.to_string(),
        ),
        DispatchError::DeliveryFailed { .. } => (
            StatusCode::BAD_GATEWAY,
            "DELIVERY_FAILED",
            "Failed to send task to client".to_string(),
        ),
        DispatchError::Timeout { .. } => {
            (StatusCode::GATEWAY_TIMEOUT, "TASK_TIMEOUT", err.to_string())
        }
        DispatchError::TaskFailed { .. } => {
            (StatusCode::BAD_GATEWAY, "TASK_ERROR", err.to_string())
        }
        DispatchError::TaskLost { task_id } => {
            tracing::error!(task_id = %task_id, "Task vanished from ledger");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
