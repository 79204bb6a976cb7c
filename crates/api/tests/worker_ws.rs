//! End-to-end tests for the worker WebSocket protocol.
//!
//! A real worker server is bound on an ephemeral port and driven with a
//! tokio-tungstenite client; tool calls go through the in-process router.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{body_json, post_json};
use drawbridge_api::state::AppState;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WorkerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect a worker and wait until the hub has registered it.
async fn connect_worker(state: &AppState) -> WorkerSocket {
    let (_, worker_addr) = common::spawn_servers(state.clone()).await;
    let before = state.hub.client_count().await;

    let (socket, _) = connect_async(format!("ws://{worker_addr}/")).await.unwrap();
    wait_for_clients(state, before + 1).await;
    socket
}

async fn wait_for_clients(state: &AppState, expected: usize) {
    for _ in 0..200 {
        if state.hub.client_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("hub never reached {expected} clients");
}

/// Next JSON text frame from the server, skipping control frames.
async fn next_json(socket: &mut WorkerSocket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(socket: &mut WorkerSocket, value: Value) {
    socket.send(Message::Text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn worker_completes_dispatched_task() {
    let state = common::test_state();
    let mut socket = connect_worker(&state).await;

    let app = common::build_test_app(state.clone());
    let call = tokio::spawn(post_json(
        app,
        "/api/v1/tools/draw_image",
        r#"{"prompt":"a lighthouse at dusk","ratio":"1:1"}"#,
    ));

    let payload = next_json(&mut socket).await;
    assert_eq!(payload["prompt"], "a lighthouse at dusk");
    assert_eq!(payload["ratio"], "1:1");
    assert_eq!(payload["task_type"], "image");
    assert!(payload.get("imageUrl").is_none());

    send_json(
        &mut socket,
        json!({
            "type": "collectedImageUrls",
            "commandId": payload["commandId"],
            "urls": ["https://img.example/a.png", "https://img.example/b.png"],
        }),
    )
    .await;

    let response = call.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(
        json["image_urls"],
        json!(["https://img.example/a.png", "https://img.example/b.png"])
    );

    let snapshot = state.hub.snapshot().await;
    assert_eq!(snapshot.total_clients, 1);
    assert!(snapshot.clients[0].current_task.is_none());
}

#[tokio::test]
async fn worker_ping_gets_pong() {
    let state = common::test_state();
    let mut socket = connect_worker(&state).await;

    send_json(&mut socket, json!({ "type": "ping" })).await;

    assert_eq!(next_json(&mut socket).await, json!({ "type": "pong" }));
}

#[tokio::test]
async fn worker_script_ready_is_recorded() {
    let state = common::test_state();
    let mut socket = connect_worker(&state).await;

    send_json(
        &mut socket,
        json!({ "type": "scriptReady", "url": "https://app.example/editor" }),
    )
    .await;
    // Round-trip a ping so the previous frame is known to be processed.
    send_json(&mut socket, json!({ "type": "ping" })).await;
    next_json(&mut socket).await;

    let snapshot = state.hub.snapshot().await;
    assert_eq!(
        snapshot.clients[0].url.as_deref(),
        Some("https://app.example/editor")
    );
}

#[tokio::test]
async fn worker_error_fails_the_tool_call() {
    let state = common::test_state();
    let mut socket = connect_worker(&state).await;

    let app = common::build_test_app(state.clone());
    let call = tokio::spawn(post_json(
        app,
        "/api/v1/tools/draw_image",
        r#"{"prompt":"a cat"}"#,
    ));

    let payload = next_json(&mut socket).await;
    send_json(
        &mut socket,
        json!({
            "type": "error",
            "commandId": payload["commandId"],
            "errorDetails": { "message": "quota exceeded" },
        }),
    )
    .await;

    let response = call.await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "TASK_ERROR");
}

#[tokio::test]
async fn garbage_frames_do_not_close_the_connection() {
    let state = common::test_state();
    let mut socket = connect_worker(&state).await;

    socket.send(Message::Text("not json".into())).await.unwrap();
    send_json(&mut socket, json!({ "type": "mystery" })).await;
    send_json(&mut socket, json!({ "type": "ping" })).await;

    assert_eq!(next_json(&mut socket).await["type"], "pong");
    assert_eq!(state.hub.client_count().await, 1);
}

#[tokio::test]
async fn disconnect_mid_task_errors_the_call() {
    let state = common::test_state();
    let mut socket = connect_worker(&state).await;

    let app = common::build_test_app(state.clone());
    let call = tokio::spawn(post_json(
        app,
        "/api/v1/tools/draw_image",
        r#"{"prompt":"a cat"}"#,
    ));

    let payload = next_json(&mut socket).await;
    let task_id = payload["commandId"].as_str().unwrap().to_string();
    socket.close(None).await.unwrap();
    drop(socket);

    let response = call.await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "TASK_ERROR");

    wait_for_clients(&state, 0).await;
    let snapshot = state.hub.snapshot().await;
    assert_eq!(snapshot.tasks[0].id, task_id);
    assert_eq!(snapshot.tasks[0].status.as_str(), "error");
}

#[tokio::test]
async fn shutdown_closes_worker_sockets() {
    let state = common::test_state();
    let mut socket = connect_worker(&state).await;

    state.hub.shutdown_all().await;

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "worker socket was not closed");
    assert_eq!(state.hub.client_count().await, 0);
}
