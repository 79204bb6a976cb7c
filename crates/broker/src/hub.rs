//! Shared broker state.
//!
//! [`WorkerHub`] is the single consistency boundary for the client
//! registry and the task ledger. Both live in one [`HubState`] behind a
//! single `RwLock`, so every read-modify-write sequence that spans them
//! (completing a task and freeing its client, unregistering a client and
//! erroring its tasks, select-then-claim in the dispatcher) is atomic
//! with respect to every other connection and dispatch.
//!
//! Designed to be wrapped in `Arc` and shared across the application.

use std::time::Duration;

use drawbridge_core::types::{ClientId, TaskId, Timestamp};
use serde::Serialize;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;

use crate::ledger::{TaskLedger, TaskStatus};
use crate::registry::{ClientRegistry, ClientStatus, WorkerSender};

/// Registry and ledger, mutated together.
#[derive(Debug, Default)]
pub struct HubState {
    pub registry: ClientRegistry,
    pub ledger: TaskLedger,
}

impl HubState {
    /// Add a connection as an idle client.
    ///
    /// A client already registered under `client_id` is unregistered
    /// first, so any task it still owned is errored rather than left
    /// pending against the fresh connection.
    pub fn register(&mut self, client_id: ClientId, sender: WorkerSender) {
        if self.registry.get(&client_id).is_some() {
            tracing::warn!(client_id = %client_id, "Client id re-registered, replacing old connection");
            self.unregister(&client_id);
        }
        self.registry.register(client_id, sender);
    }

    /// Complete a task and free the client that owned it.
    pub fn complete_task(&mut self, task_id: &str, urls: Vec<String>) -> bool {
        let Some(client_id) = self.ledger.complete(task_id, urls) else {
            return false;
        };
        self.registry.release(&client_id, task_id);
        true
    }

    /// Error a task and free the client that owned it.
    pub fn fail_task(&mut self, task_id: &str, detail: Option<String>) -> bool {
        let Some(client_id) = self.ledger.fail(task_id, detail) else {
            return false;
        };
        self.registry.release(&client_id, task_id);
        true
    }

    /// Time out a single task and free the client that owned it.
    pub fn time_out_task(&mut self, task_id: &str) -> bool {
        let Some(client_id) = self.ledger.time_out(task_id) else {
            return false;
        };
        self.registry.release(&client_id, task_id);
        true
    }

    /// Time out every overdue pending task, freeing their clients.
    pub fn sweep_timeouts(&mut self, now: Instant) -> usize {
        let swept = self.ledger.timeout_sweep(now);
        for (task_id, client_id) in &swept {
            self.registry.release(client_id, task_id);
        }
        swept.len()
    }

    /// Remove a client and error every pending task it owned.
    pub fn unregister(&mut self, client_id: &str) -> bool {
        if self.registry.unregister(client_id).is_none() {
            return false;
        }
        self.ledger.fail_pending_for_client(client_id);
        tracing::info!(
            client_id,
            total_clients = self.registry.len(),
            "Client removed",
        );
        true
    }

    /// Unregister every client whose connection is closed.
    pub fn prune_dead(&mut self) -> usize {
        let dead = self.registry.dead_client_ids();
        for client_id in &dead {
            self.unregister(client_id);
        }
        dead.len()
    }

    /// Point-in-time view of every client and task.
    pub fn snapshot(&self) -> HubSnapshot {
        let clients: Vec<ClientSnapshot> = self
            .registry
            .iter()
            .map(|c| ClientSnapshot {
                id: c.id.clone(),
                connected: c.is_open(),
                status: c.status,
                current_task: c.current_task_id.clone(),
                connected_at: c.connected_at,
                last_active: c.last_active,
                url: c.reported_url.clone(),
            })
            .collect();

        let tasks: Vec<TaskSnapshot> = self
            .ledger
            .iter()
            .map(|t| TaskSnapshot {
                id: t.id.clone(),
                client_id: t.assigned_client_id.clone(),
                status: t.status,
                create_time: t.created_at,
            })
            .collect();

        HubSnapshot {
            total_clients: clients.len(),
            clients,
            total_tasks: tasks.len(),
            tasks,
        }
    }
}

/// Counts from one reaper pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapReport {
    pub timed_out: usize,
    pub dead_clients: usize,
    pub pruned_tasks: usize,
}

/// Status snapshot returned by the connection-status tool.
#[derive(Debug, Clone, Serialize)]
pub struct HubSnapshot {
    pub total_clients: usize,
    pub clients: Vec<ClientSnapshot>,
    pub total_tasks: usize,
    pub tasks: Vec<TaskSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    pub id: ClientId,
    pub connected: bool,
    pub status: ClientStatus,
    pub current_task: Option<TaskId>,
    pub connected_at: Timestamp,
    pub last_active: Timestamp,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub client_id: ClientId,
    pub status: TaskStatus,
    pub create_time: Timestamp,
}

/// Thread-safe owner of all broker state.
#[derive(Debug, Default)]
pub struct WorkerHub {
    state: RwLock<HubState>,
}

impl WorkerHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted worker connection as an idle client.
    pub async fn register(&self, client_id: ClientId, sender: WorkerSender) {
        let mut state = self.state.write().await;
        state.register(client_id.clone(), sender);
        tracing::info!(
            client_id = %client_id,
            total_clients = state.registry.len(),
            "Client added",
        );
    }

    /// Remove a worker connection, erroring any task it was running.
    pub async fn unregister(&self, client_id: &str) -> bool {
        self.state.write().await.unregister(client_id)
    }

    /// Refresh a client's last-activity timestamp.
    pub async fn touch(&self, client_id: &str) {
        self.state.write().await.registry.touch(client_id);
    }

    /// Record the page URL a worker announced as ready.
    pub async fn record_ready(&self, client_id: &str, url: &str) -> bool {
        let recorded = self.state.write().await.registry.record_ready(client_id, url);
        if recorded {
            tracing::info!(client_id, url, "Client script ready");
        }
        recorded
    }

    /// Complete a task reported by a worker. Idempotent.
    pub async fn complete_task(&self, task_id: &str, urls: Vec<String>) -> bool {
        self.state.write().await.complete_task(task_id, urls)
    }

    /// Fail a task reported by a worker. Idempotent.
    pub async fn fail_task(&self, task_id: &str, detail: Option<String>) -> bool {
        self.state.write().await.fail_task(task_id, detail)
    }

    /// Time out a single task. Idempotent.
    pub async fn time_out_task(&self, task_id: &str) -> bool {
        self.state.write().await.time_out_task(task_id)
    }

    /// Full cleanup pass: overdue tasks, dead clients, and finished tasks
    /// older than `retention`.
    pub async fn reap(&self, retention: Duration) -> ReapReport {
        let now = Instant::now();
        let mut state = self.state.write().await;
        ReapReport {
            timed_out: state.sweep_timeouts(now),
            dead_clients: state.prune_dead(),
            pruned_tasks: state.ledger.prune_finished(now, retention),
        }
    }

    /// Send a heartbeat ping to every worker.
    pub async fn ping_all(&self) {
        self.state.read().await.registry.ping_all();
    }

    /// Drop every worker connection and error their pending tasks.
    ///
    /// Dropping the senders lets each connection's writer task close its
    /// socket.
    pub async fn shutdown_all(&self) {
        let mut state = self.state.write().await;
        let clients = state.registry.drain();
        for client in &clients {
            state.ledger.fail_pending_for_client(&client.id);
        }
        tracing::info!(count = clients.len(), "Closed all worker connections");
    }

    /// Number of registered clients.
    pub async fn client_count(&self) -> usize {
        self.state.read().await.registry.len()
    }

    /// Point-in-time view of every client and task.
    pub async fn snapshot(&self) -> HubSnapshot {
        self.state.read().await.snapshot()
    }

    /// Read-only access to the full state, for inspection.
    pub async fn read(&self) -> RwLockReadGuard<'_, HubState> {
        self.state.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, HubState> {
        self.state.write().await
    }
}
