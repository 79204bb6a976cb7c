use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use drawbridge_broker::messages::OutboundFrame;
use drawbridge_broker::processor::handle_text_message;
use drawbridge_broker::WorkerHub;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// HTTP handler that upgrades a worker connection to WebSocket.
///
/// After the upgrade the connection is registered with the hub as an idle
/// client and managed by a writer task plus the reader loop below.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

/// Manage a single worker connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with the hub under a fresh id.
///   2. Spawns a writer task that forwards queued frames to the sink.
///   3. Processes inbound frames on the current task.
///   4. Unregisters on disconnect, erroring any task the worker held.
///
/// The hub owns the only strong sender. When the hub drops it (shutdown or
/// pruning) the writer drains, sends a Close frame and exits, which ends
/// the reader loop as well.
async fn handle_socket(socket: WebSocket, hub: Arc<WorkerHub>) {
    let client_id = uuid::Uuid::new_v4().to_string();

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let reply_tx = tx.downgrade();
    hub.register(client_id.clone(), tx).await;

    let (mut sink, mut stream) = socket.split();

    let writer_client_id = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let msg = match frame {
                OutboundFrame::Text(text) => Message::Text(text.into()),
                OutboundFrame::Ping => Message::Ping(Bytes::new()),
            };
            if sink.send(msg).await.is_err() {
                tracing::debug!(client_id = %writer_client_id, "Worker socket sink closed");
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_text_message(&hub, &client_id, text.as_str()).await;
                    if let (Some(frame), Some(tx)) = (reply, reply_tx.upgrade()) {
                        let _ = tx.send(frame);
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::warn!(
                        client_id = %client_id,
                        len = data.len(),
                        "Binary frame from worker, ignoring",
                    );
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(client_id = %client_id, "Control frame received");
                    hub.touch(&client_id).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(client_id = %client_id, error = %e, "Worker receive error");
                    break;
                }
            },
        }
    }

    hub.unregister(&client_id).await;
    send_task.abort();
}
