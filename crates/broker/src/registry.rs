//! Worker client registry.
//!
//! [`ClientRegistry`] owns every connected worker, its availability and
//! its outbound channel, and performs round-robin idle selection. It has
//! no knowledge of tasks beyond the id a busy client is working on;
//! cascading task failures on disconnect is the hub's job.

use drawbridge_core::types::{ClientId, TaskId, Timestamp};
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::messages::OutboundFrame;

/// Channel sender half for pushing frames to a worker connection.
///
/// The connection is considered open for as long as the receiving
/// writer task is alive.
pub type WorkerSender = mpsc::UnboundedSender<OutboundFrame>;

/// Availability of a worker for new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Idle,
    Busy,
}

/// A connected worker.
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    sender: WorkerSender,
    pub status: ClientStatus,
    /// Set if and only if `status == Busy`.
    pub current_task_id: Option<TaskId>,
    pub connected_at: Timestamp,
    /// Refreshed on every inbound frame and status change.
    pub last_active: Timestamp,
    /// Page URL announced by the worker's `scriptReady` message.
    pub reported_url: Option<String>,
}

impl Client {
    fn new(id: ClientId, sender: WorkerSender) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            sender,
            status: ClientStatus::Idle,
            current_task_id: None,
            connected_at: now,
            last_active: now,
            reported_url: None,
        }
    }

    /// Whether the connection's writer is still accepting frames.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    pub fn is_idle(&self) -> bool {
        self.status == ClientStatus::Idle
    }

    fn touch(&mut self) {
        self.last_active = chrono::Utc::now();
    }
}

/// Failure to queue a frame for a worker.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Client {0} is not registered")]
    UnknownClient(ClientId),

    #[error("Connection to client {0} is closed")]
    Closed(ClientId),
}

/// Insertion-ordered set of connected workers plus the round-robin cursor.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: IndexMap<ClientId, Client>,
    cursor: usize,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new idle client.
    ///
    /// Registering an id that already exists replaces the entry in
    /// place. Callers that care about the old entry's task remove it
    /// first (see `HubState::register`).
    pub fn register(&mut self, id: ClientId, sender: WorkerSender) -> &Client {
        let client = Client::new(id.clone(), sender);
        let (index, _) = self.clients.insert_full(id, client);
        &self.clients[index]
    }

    /// Remove a client, returning it if it was registered.
    ///
    /// Preserves the relative order of the remaining clients.
    pub fn unregister(&mut self, id: &str) -> Option<Client> {
        self.clients.shift_remove(id)
    }

    /// Pick the next idle client with an open connection, round-robin.
    ///
    /// Scans at most one full pass over the clients present when the
    /// scan starts, beginning at the cursor. On success the cursor moves
    /// to the slot after the chosen client (wrapping); otherwise it is
    /// left untouched.
    pub fn select_idle(&mut self) -> Option<ClientId> {
        let len = self.clients.len();
        if len == 0 {
            return None;
        }

        // The cursor may point past the end after removals.
        let start = self.cursor % len;
        for offset in 0..len {
            let index = (start + offset) % len;
            let Some((id, client)) = self.clients.get_index(index) else {
                continue;
            };
            if client.is_idle() && client.is_open() {
                self.cursor = (index + 1) % len;
                return Some(id.clone());
            }
        }
        None
    }

    /// Mark a client busy with `task_id`. Returns `false` for unknown ids.
    pub fn mark_busy(&mut self, id: &str, task_id: &str) -> bool {
        match self.clients.get_mut(id) {
            Some(client) => {
                client.status = ClientStatus::Busy;
                client.current_task_id = Some(task_id.to_string());
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Mark a client idle unconditionally. Returns `false` for unknown ids.
    pub fn mark_idle(&mut self, id: &str) -> bool {
        match self.clients.get_mut(id) {
            Some(client) => {
                client.status = ClientStatus::Idle;
                client.current_task_id = None;
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Free a client that finished `task_id`.
    ///
    /// Only succeeds when the client is still working on that exact task,
    /// so a late message for an old task can never free a client that
    /// has since moved on.
    pub fn release(&mut self, id: &str, task_id: &str) -> bool {
        let owns_task = self
            .clients
            .get(id)
            .is_some_and(|c| c.current_task_id.as_deref() == Some(task_id));
        if !owns_task {
            return false;
        }
        self.mark_idle(id)
    }

    /// Record the page URL a worker announced. No-op for unknown ids.
    pub fn record_ready(&mut self, id: &str, url: &str) -> bool {
        match self.clients.get_mut(id) {
            Some(client) => {
                client.reported_url = Some(url.to_string());
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Refresh a client's activity timestamp.
    pub fn touch(&mut self, id: &str) {
        if let Some(client) = self.clients.get_mut(id) {
            client.touch();
        }
    }

    /// Queue a frame for a client.
    pub fn send(&self, id: &str, frame: OutboundFrame) -> Result<(), SendError> {
        let client = self
            .clients
            .get(id)
            .ok_or_else(|| SendError::UnknownClient(id.to_string()))?;
        client
            .sender
            .send(frame)
            .map_err(|_| SendError::Closed(id.to_string()))
    }

    /// Send a heartbeat ping to every client.
    ///
    /// Closed channels are skipped; they are pruned on the next sweep.
    pub fn ping_all(&self) {
        for client in self.clients.values() {
            let _ = client.sender.send(OutboundFrame::Ping);
        }
    }

    /// IDs of clients whose connection is no longer open.
    pub fn dead_client_ids(&self) -> Vec<ClientId> {
        self.clients
            .values()
            .filter(|c| !c.is_open())
            .map(|c| c.id.clone())
            .collect()
    }

    /// Remove every client, dropping their senders.
    pub fn drain(&mut self) -> Vec<Client> {
        self.cursor = 0;
        self.clients.drain(..).map(|(_, client)| client).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Clients in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }
}
