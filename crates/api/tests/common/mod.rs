#![allow(dead_code)]

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use drawbridge_api::config::ServerConfig;
use drawbridge_api::router::{build_tool_router, build_worker_router};
use drawbridge_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a short task timeout so timeout paths stay fast.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        worker_port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        task_timeout_secs: 2,
        reaper_interval_secs: 10,
        task_retention_secs: 3600,
        heartbeat_interval_secs: 30,
    }
}

/// Fresh state around an empty hub.
pub fn test_state() -> AppState {
    AppState::new(test_config())
}

/// Build the tool router with the production middleware stack.
pub fn build_test_app(state: AppState) -> Router {
    let config = state.config.as_ref().clone();
    build_tool_router(state, &config)
}

/// Serve both routers on ephemeral ports, returning `(tool_addr, worker_addr)`.
pub async fn spawn_servers(state: AppState) -> (SocketAddr, SocketAddr) {
    let tool_app = build_test_app(state.clone());
    let worker_app = build_worker_router(state);

    let tool_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let worker_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let tool_addr = tool_listener.local_addr().unwrap();
    let worker_addr = worker_listener.local_addr().unwrap();

    tokio::spawn(async move { axum::serve(tool_listener, tool_app).await.unwrap() });
    tokio::spawn(async move { axum::serve(worker_listener, worker_app).await.unwrap() });

    (tool_addr, worker_addr)
}

/// Send a GET request through the router.
pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Send a POST request with a raw JSON body through the router.
pub async fn post_json(app: Router, uri: &str, body: &str) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
