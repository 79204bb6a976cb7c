//! Task lifecycle ledger.
//!
//! [`TaskLedger`] owns every dispatched task and enforces its state
//! machine: a task starts `Pending` and moves to exactly one terminal
//! state (`Completed`, `TimedOut` or `Errored`). Any later transition
//! attempt is logged and ignored.
//!
//! Each terminal transition is published to the dispatcher waiting on
//! that task through a one-shot channel registered with [`TaskLedger::watch`].

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use drawbridge_core::types::{ClientId, TaskId, Timestamp};
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Lifecycle state of a task. Serialized with the worker-facing names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "timeout")]
    TimedOut,
    #[serde(rename = "error")]
    Errored,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::TimedOut => "timeout",
            TaskStatus::Errored => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result delivered to whoever is waiting on a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(Vec<String>),
    TimedOut,
    Errored,
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Completed(_) => TaskStatus::Completed,
            TaskOutcome::TimedOut => TaskStatus::TimedOut,
            TaskOutcome::Errored => TaskStatus::Errored,
        }
    }
}

/// Parameters for a task about to be dispatched.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub prompt: String,
    pub ratio: String,
    /// Present for edit-style jobs, absent for pure generation.
    pub reference_image_url: Option<String>,
    pub task_type: String,
    pub timeout: Duration,
}

/// A task dispatched to a worker.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub prompt: String,
    pub ratio: String,
    pub reference_image_url: Option<String>,
    pub task_type: String,
    pub assigned_client_id: ClientId,
    pub status: TaskStatus,
    /// Populated only when `status == Completed`.
    pub result_urls: Vec<String>,
    /// Worker-reported failure detail, if any.
    pub error_detail: Option<String>,
    pub created_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub timeout: Duration,
    created: Instant,
    finished: Option<Instant>,
}

impl Task {
    /// Whether the task has been pending for longer than its timeout.
    pub fn is_overdue(&self, now: Instant) -> bool {
        self.status == TaskStatus::Pending && now.saturating_duration_since(self.created) > self.timeout
    }

    fn outcome(&self) -> Option<TaskOutcome> {
        match self.status {
            TaskStatus::Pending => None,
            TaskStatus::Completed => Some(TaskOutcome::Completed(self.result_urls.clone())),
            TaskStatus::TimedOut => Some(TaskOutcome::TimedOut),
            TaskStatus::Errored => Some(TaskOutcome::Errored),
        }
    }
}

/// All tasks known to this process, in creation order.
#[derive(Debug, Default)]
pub struct TaskLedger {
    tasks: IndexMap<TaskId, Task>,
    waiters: HashMap<TaskId, oneshot::Sender<TaskOutcome>>,
}

impl TaskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending task assigned to `client_id`.
    pub fn create(&mut self, new: NewTask, client_id: &str) -> &Task {
        let id = uuid::Uuid::new_v4().to_string();
        let task = Task {
            id: id.clone(),
            prompt: new.prompt,
            ratio: new.ratio,
            reference_image_url: new.reference_image_url,
            task_type: new.task_type,
            assigned_client_id: client_id.to_string(),
            status: TaskStatus::Pending,
            result_urls: Vec::new(),
            error_detail: None,
            created_at: chrono::Utc::now(),
            finished_at: None,
            timeout: new.timeout,
            created: Instant::now(),
            finished: None,
        };
        let (index, _) = self.tasks.insert_full(id, task);
        &self.tasks[index]
    }

    /// Register interest in a task's terminal outcome.
    ///
    /// Returns `None` for unknown tasks. If the task already finished the
    /// outcome is available on the receiver immediately. Registering again
    /// replaces the previous waiter.
    pub fn watch(&mut self, task_id: &str) -> Option<oneshot::Receiver<TaskOutcome>> {
        let task = self.tasks.get(task_id)?;
        let (tx, rx) = oneshot::channel();
        match task.outcome() {
            Some(outcome) => {
                let _ = tx.send(outcome);
            }
            None => {
                self.waiters.insert(task_id.to_string(), tx);
            }
        }
        Some(rx)
    }

    /// Mark a pending task completed with its result URLs.
    ///
    /// Returns the client that owned the task when the transition
    /// happened; `None` if the task is unknown or already finished.
    pub fn complete(&mut self, task_id: &str, urls: Vec<String>) -> Option<ClientId> {
        let count = urls.len();
        let client = self.finish(task_id, TaskOutcome::Completed(urls), None)?;
        tracing::info!(task_id, client_id = %client, image_count = count, "Task completed");
        Some(client)
    }

    /// Mark a pending task errored, recording the worker's detail if given.
    pub fn fail(&mut self, task_id: &str, detail: Option<String>) -> Option<ClientId> {
        let client = self.finish(task_id, TaskOutcome::Errored, detail)?;
        tracing::warn!(task_id, client_id = %client, "Task failed");
        Some(client)
    }

    /// Mark a single pending task timed out.
    pub fn time_out(&mut self, task_id: &str) -> Option<ClientId> {
        let client = self.finish(task_id, TaskOutcome::TimedOut, None)?;
        tracing::warn!(task_id, client_id = %client, "Task timed out");
        Some(client)
    }

    /// Time out every pending task older than its own timeout.
    ///
    /// Returns `(task_id, client_id)` for each task that transitioned.
    pub fn timeout_sweep(&mut self, now: Instant) -> Vec<(TaskId, ClientId)> {
        let overdue: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.is_overdue(now))
            .map(|t| t.id.clone())
            .collect();

        overdue
            .into_iter()
            .filter_map(|id| self.time_out(&id).map(|client| (id, client)))
            .collect()
    }

    /// Error every pending task assigned to a client that went away.
    pub fn fail_pending_for_client(&mut self, client_id: &str) -> Vec<TaskId> {
        let orphaned: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && t.assigned_client_id == client_id)
            .map(|t| t.id.clone())
            .collect();

        for id in &orphaned {
            if self
                .finish(id, TaskOutcome::Errored, Some("Client disconnected".to_string()))
                .is_some()
            {
                tracing::warn!(task_id = %id, client_id, "Task marked as error due to client disconnect");
            }
        }
        orphaned
    }

    /// Drop finished tasks whose terminal transition is older than `retention`.
    ///
    /// Pending tasks are never removed. Returns the number of tasks dropped.
    pub fn prune_finished(&mut self, now: Instant, retention: Duration) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| match task.finished {
            Some(finished) => now.saturating_duration_since(finished) <= retention,
            None => true,
        });
        before - self.tasks.len()
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Apply a terminal transition exactly once and notify the waiter.
    fn finish(
        &mut self,
        task_id: &str,
        outcome: TaskOutcome,
        detail: Option<String>,
    ) -> Option<ClientId> {
        let attempted = outcome.status();
        let Some(task) = self.tasks.get_mut(task_id) else {
            tracing::warn!(task_id, %attempted, "Task not found, ignoring transition");
            return None;
        };
        if task.status.is_terminal() {
            tracing::warn!(
                task_id,
                current = %task.status,
                %attempted,
                "Task already finished, ignoring transition",
            );
            return None;
        }

        task.status = attempted;
        if let TaskOutcome::Completed(urls) = &outcome {
            task.result_urls = urls.clone();
        }
        task.error_detail = detail;
        task.finished_at = Some(chrono::Utc::now());
        task.finished = Some(Instant::now());
        let client = task.assigned_client_id.clone();

        if let Some(waiter) = self.waiters.remove(task_id) {
            // The waiter may have given up already; nothing to do then.
            let _ = waiter.send(outcome);
        }
        Some(client)
    }
}
