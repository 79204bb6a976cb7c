//! Inbound worker message processing.
//!
//! Turns each text frame received from a worker connection into the
//! matching hub mutation. Malformed or unexpected frames are logged and
//! dropped; they never close the connection.

use crate::hub::WorkerHub;
use crate::messages::{parse_message, pong_frame, OutboundFrame, ParseError, WorkerMessage};

/// Longest slice of a rejected frame echoed into the logs.
const MAX_LOGGED_FRAME_CHARS: usize = 200;

/// Handle a single text frame from `client_id`.
///
/// Every frame counts as activity, even one that fails to parse.
/// Returns the reply to queue back on the same connection, if any.
pub async fn handle_text_message(
    hub: &WorkerHub,
    client_id: &str,
    text: &str,
) -> Option<OutboundFrame> {
    hub.touch(client_id).await;

    match parse_message(text) {
        Ok(msg) => handle_message(hub, client_id, msg).await,
        Err(ParseError::UnknownType(kind)) => {
            tracing::warn!(client_id, kind = %kind, "Unknown message type from client");
            None
        }
        Err(e) => {
            let raw: String = text.chars().take(MAX_LOGGED_FRAME_CHARS).collect();
            tracing::warn!(
                client_id,
                error = %e,
                raw_message = %raw,
                "Failed to parse client message",
            );
            None
        }
    }
}

async fn handle_message(
    hub: &WorkerHub,
    client_id: &str,
    msg: WorkerMessage,
) -> Option<OutboundFrame> {
    match msg {
        WorkerMessage::Ping => {
            tracing::trace!(client_id, "Heartbeat ping");
            Some(pong_frame())
        }

        WorkerMessage::CollectedImageUrls { command_id, urls } => {
            if command_id.is_empty() {
                tracing::warn!(client_id, "collectedImageUrls without commandId, ignoring");
                return None;
            }
            tracing::debug!(
                client_id,
                task_id = %command_id,
                image_count = urls.len(),
                "Image URLs collected",
            );
            hub.complete_task(&command_id, urls).await;
            None
        }

        WorkerMessage::ScriptReady { url } => {
            if url.is_empty() {
                tracing::debug!(client_id, "scriptReady without url, ignoring");
            } else {
                hub.record_ready(client_id, &url).await;
            }
            None
        }

        WorkerMessage::Error {
            command_id,
            error_details,
        } => {
            let detail = describe_details(&error_details);
            tracing::error!(
                client_id,
                task_id = %command_id,
                details = detail.as_deref().unwrap_or("<none>"),
                "Error reported by client",
            );
            if command_id.is_empty() {
                return None;
            }
            hub.fail_task(&command_id, detail).await;
            None
        }
    }
}

/// Flatten worker error details into a log/status friendly string.
fn describe_details(details: &serde_json::Value) -> Option<String> {
    match details {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::ledger::{NewTask, TaskStatus};

    /// Hub with one registered client `c1` working on a fresh task.
    async fn hub_with_busy_client() -> (WorkerHub, String, mpsc::UnboundedReceiver<OutboundFrame>) {
        let hub = WorkerHub::new();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.register("c1".into(), tx).await;
        let task_id = {
            let mut state = hub.write().await;
            let task_id = state
                .ledger
                .create(
                    NewTask {
                        prompt: "a fox".into(),
                        ratio: "1:1".into(),
                        reference_image_url: None,
                        task_type: "image".into(),
                        timeout: Duration::from_secs(120),
                    },
                    "c1",
                )
                .id
                .clone();
            state.registry.mark_busy("c1", &task_id);
            task_id
        };
        (hub, task_id, rx)
    }

    #[tokio::test]
    async fn ping_replies_with_pong() {
        let (hub, _task_id, _rx) = hub_with_busy_client().await;
        let reply = handle_text_message(&hub, "c1", r#"{"type":"ping"}"#).await;
        assert_eq!(reply, Some(pong_frame()));
    }

    #[tokio::test]
    async fn collected_urls_complete_task_and_free_client() {
        let (hub, task_id, _rx) = hub_with_busy_client().await;
        let frame = serde_json::json!({
            "type": "collectedImageUrls",
            "commandId": task_id,
            "urls": ["https://img/1.png", "https://img/2.png"],
        })
        .to_string();

        assert!(handle_text_message(&hub, "c1", &frame).await.is_none());

        let state = hub.read().await;
        let task = state.ledger.get(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result_urls.len(), 2);
        assert!(state.registry.get("c1").unwrap().is_idle());
    }

    #[tokio::test]
    async fn error_report_fails_task_with_detail() {
        let (hub, task_id, _rx) = hub_with_busy_client().await;
        let frame = serde_json::json!({
            "type": "error",
            "commandId": task_id,
            "errorDetails": "upload button not found",
        })
        .to_string();

        handle_text_message(&hub, "c1", &frame).await;

        let state = hub.read().await;
        let task = state.ledger.get(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Errored);
        assert_eq!(task.error_detail.as_deref(), Some("upload button not found"));
        assert!(state.registry.get("c1").unwrap().is_idle());
    }

    #[tokio::test]
    async fn script_ready_records_url() {
        let (hub, _task_id, _rx) = hub_with_busy_client().await;
        handle_text_message(
            &hub,
            "c1",
            r#"{"type":"scriptReady","url":"https://chat.qwen.ai/","platform":"qwen"}"#,
        )
        .await;

        let state = hub.read().await;
        assert_eq!(
            state.registry.get("c1").unwrap().reported_url.as_deref(),
            Some("https://chat.qwen.ai/")
        );
    }

    #[tokio::test]
    async fn garbage_is_ignored_and_counts_as_activity() {
        let (hub, task_id, _rx) = hub_with_busy_client().await;
        let before = hub.read().await.registry.get("c1").unwrap().last_active;

        for frame in [
            "not json",
            r#"{"type":"mystery"}"#,
            r#"{"type":"collectedImageUrls"}"#,
            r#"{"type":"collectedImageUrls","commandId":"","urls":[]}"#,
            r#"[1,2,3]"#,
        ] {
            assert!(handle_text_message(&hub, "c1", frame).await.is_none());
        }

        let state = hub.read().await;
        assert_eq!(state.ledger.get(&task_id).unwrap().status, TaskStatus::Pending);
        let client = state.registry.get("c1").unwrap();
        assert!(!client.is_idle());
        assert!(client.last_active >= before);
    }

    #[tokio::test]
    async fn completion_for_unknown_task_is_harmless() {
        let (hub, task_id, _rx) = hub_with_busy_client().await;
        handle_text_message(
            &hub,
            "c1",
            r#"{"type":"collectedImageUrls","commandId":"not-a-task","urls":["https://x"]}"#,
        )
        .await;

        let state = hub.read().await;
        assert_eq!(state.ledger.get(&task_id).unwrap().status, TaskStatus::Pending);
        assert!(!state.registry.get("c1").unwrap().is_idle());
    }

    #[test]
    fn details_are_flattened() {
        assert_eq!(describe_details(&serde_json::Value::Null), None);
        assert_eq!(
            describe_details(&serde_json::json!("timeout")).as_deref(),
            Some("timeout")
        );
        assert_eq!(
            describe_details(&serde_json::json!({"code": 7})).as_deref(),
            Some(r#"{"code":7}"#)
        );
    }
}
