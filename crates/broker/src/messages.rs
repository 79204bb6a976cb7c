//! Worker wire protocol.
//!
//! Workers send JSON text frames shaped `{"type": "<kind>", ...fields}`.
//! This module parses them into a strongly-typed [`WorkerMessage`] and
//! builds the outbound frames the broker pushes back (task payloads and
//! heartbeat replies).

use serde::{Deserialize, Serialize};

use crate::ledger::Task;

/// Message type tags accepted from workers.
pub const MSG_TYPE_PING: &str = "ping";
pub const MSG_TYPE_COLLECTED_IMAGE_URLS: &str = "collectedImageUrls";
pub const MSG_TYPE_SCRIPT_READY: &str = "scriptReady";
pub const MSG_TYPE_ERROR: &str = "error";

/// Reply tag for heartbeat pings.
pub const MSG_TYPE_PONG: &str = "pong";

const KNOWN_TYPES: [&str; 4] = [
    MSG_TYPE_PING,
    MSG_TYPE_COLLECTED_IMAGE_URLS,
    MSG_TYPE_SCRIPT_READY,
    MSG_TYPE_ERROR,
];

/// All known inbound worker messages.
///
/// Deserialized via the internally-tagged `"type"` field. Unrecognised
/// extra fields (e.g. `tabId`, `platform`) are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// Application-level heartbeat; answered with `{"type":"pong"}`.
    #[serde(rename = "ping")]
    Ping,

    /// The worker finished a task and collected the generated image URLs.
    #[serde(rename = "collectedImageUrls", rename_all = "camelCase")]
    CollectedImageUrls { command_id: String, urls: Vec<String> },

    /// The worker's automation script is loaded and ready at `url`.
    #[serde(rename = "scriptReady")]
    ScriptReady { url: String },

    /// The worker failed to execute a task.
    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        command_id: String,
        /// Free-form detail; workers send strings or objects.
        #[serde(default)]
        error_details: serde_json::Value,
    },
}

/// Reasons an inbound frame could not be turned into a [`WorkerMessage`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Not valid JSON at all.
    #[error("Malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Valid JSON without a string `type` field.
    #[error("Message has no type field")]
    MissingType,

    /// A `type` this broker does not understand.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// A known `type` whose fields are missing or have the wrong shape.
    #[error("Invalid fields for '{kind}' message: {source}")]
    InvalidFields {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse a worker text frame into a typed message.
///
/// Callers should log the error and keep the connection open.
pub fn parse_message(text: &str) -> Result<WorkerMessage, ParseError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(ParseError::Malformed)?;

    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(ParseError::MissingType)?
        .to_string();

    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Err(ParseError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|source| ParseError::InvalidFields { kind, source })
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A frame queued for delivery to a worker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A JSON text frame (task payload or pong).
    Text(String),
    /// A transport-level WebSocket ping (heartbeat).
    Ping,
}

/// Task dispatch payload, in the field naming workers expect.
///
/// `file` and `imageUrl` both carry the reference image and are omitted
/// for pure generation jobs.
#[derive(Debug, Serialize)]
pub struct TaskPayload<'a> {
    #[serde(rename = "commandId")]
    pub command_id: &'a str,
    pub prompt: &'a str,
    pub ratio: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<&'a str>,
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<&'a str>,
    pub task_type: &'a str,
}

impl<'a> From<&'a Task> for TaskPayload<'a> {
    fn from(task: &'a Task) -> Self {
        let reference = task.reference_image_url.as_deref();
        Self {
            command_id: &task.id,
            prompt: &task.prompt,
            ratio: &task.ratio,
            file: reference,
            image_url: reference,
            task_type: &task.task_type,
        }
    }
}

impl TaskPayload<'_> {
    /// Serialize into the text frame pushed to the worker.
    pub fn to_frame(&self) -> Result<OutboundFrame, serde_json::Error> {
        serde_json::to_string(self).map(OutboundFrame::Text)
    }
}

/// The `{"type":"pong"}` reply to a worker ping.
pub fn pong_frame() -> OutboundFrame {
    OutboundFrame::Text(serde_json::json!({ "type": MSG_TYPE_PONG }).to_string())
}
