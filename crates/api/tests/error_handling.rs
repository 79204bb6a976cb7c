//! Tests for `AppError` → HTTP response mapping.
//!
//! These tests verify that each `AppError` variant produces the correct HTTP
//! status code, error code, and message. They do NOT need an HTTP server --
//! they call `IntoResponse` directly on `AppError` values.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use drawbridge_api::error::AppError;
use drawbridge_broker::ledger::TaskStatus;
use drawbridge_broker::DispatchError;
use drawbridge_core::error::CoreError;
use http_body_util::BodyExt;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::from(DispatchError::Validation(CoreError::Validation(
        "Prompt cannot be empty".into(),
    )));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], "error");
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "Prompt cannot be empty");
    assert_eq!(json["message"], "Prompt cannot be empty");
}

#[tokio::test]
async fn no_idle_clients_returns_503() {
    let (status, json) = error_to_response(DispatchError::NoIdleClients.into()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "NO_IDLE_CLIENTS");
    assert_eq!(json["error"], "No idle clients available");
}

#[tokio::test]
async fn delivery_failure_returns_502() {
    let err = DispatchError::DeliveryFailed {
        client_id: "c1".into(),
    };

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "DELIVERY_FAILED");
    assert_eq!(json["error"], "Failed to send task to client");
}

#[tokio::test]
async fn timeout_returns_504() {
    let err = DispatchError::Timeout {
        task_id: "t1".into(),
    };

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["code"], "TASK_TIMEOUT");
    assert_eq!(json["error"], "Task t1 timed out");
}

#[tokio::test]
async fn task_failure_returns_502() {
    let err = DispatchError::TaskFailed {
        task_id: "t1".into(),
        status: TaskStatus::Errored,
    };

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "TASK_ERROR");
    assert_eq!(json["error"], "Task t1 ended with status 'error'");
}

#[tokio::test]
async fn lost_task_is_sanitized_500() {
    let err = DispatchError::TaskLost {
        task_id: "t1".into(),
    };

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn bad_request_error_returns_400() {
    let (status, json) = error_to_response(AppError::BadRequest("invalid body".into())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "invalid body");
}
