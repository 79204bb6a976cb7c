//! Synchronous job dispatch.
//!
//! [`Dispatcher::submit`] validates a generation request, runs a cleanup
//! pass, claims the next idle worker round-robin, pushes the task payload
//! and then blocks until the task reaches a terminal state or its timeout
//! budget elapses. Selecting the worker, creating the task, marking the
//! worker busy and pushing the payload all happen under one write guard,
//! so two concurrent dispatches can never claim the same worker.

use std::sync::Arc;
use std::time::Duration;

use drawbridge_core::error::CoreError;
use drawbridge_core::generation::{
    validate_prompt, validate_reference_url, DEFAULT_TASK_TIMEOUT_SECS, DEFAULT_TASK_TYPE,
};
use drawbridge_core::types::{ClientId, TaskId};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::hub::WorkerHub;
use crate::ledger::{NewTask, TaskOutcome, TaskStatus};
use crate::messages::TaskPayload;

/// Dispatch tuning shared by every submission.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// How long a task may stay pending before it is timed out.
    pub task_timeout: Duration,
    /// Discriminator echoed to workers as `task_type`.
    pub task_type: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS),
            task_type: DEFAULT_TASK_TYPE.to_string(),
        }
    }
}

/// A caller's generation or edit job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub ratio: String,
    /// Present for edit jobs.
    pub reference_image_url: Option<String>,
}

impl GenerationRequest {
    /// A text-to-image job.
    pub fn generate(prompt: impl Into<String>, ratio: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ratio: ratio.into(),
            reference_image_url: None,
        }
    }

    /// An image-to-image job based on `reference_image_url`.
    ///
    /// Surrounding whitespace is stripped from the URL so the value that
    /// is validated is the value workers receive.
    pub fn edit(
        prompt: impl Into<String>,
        reference_image_url: impl Into<String>,
        ratio: impl Into<String>,
    ) -> Self {
        let reference_image_url: String = reference_image_url.into();
        Self {
            prompt: prompt.into(),
            ratio: ratio.into(),
            reference_image_url: Some(reference_image_url.trim().to_string()),
        }
    }

    /// Check the prompt and, for edit jobs, the reference URL.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_prompt(&self.prompt)?;
        if let Some(ref url) = self.reference_image_url {
            validate_reference_url(url)?;
        }
        Ok(())
    }
}

/// Assigns jobs to idle workers and waits for their results.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    hub: Arc<WorkerHub>,
    config: BrokerConfig,
}

impl Dispatcher {
    pub fn new(hub: Arc<WorkerHub>, config: BrokerConfig) -> Self {
        Self { hub, config }
    }

    pub fn hub(&self) -> &Arc<WorkerHub> {
        &self.hub
    }

    /// Submit a text-to-image job and wait for its image URLs.
    pub async fn submit_generation(
        &self,
        prompt: &str,
        ratio: &str,
    ) -> Result<Vec<String>, DispatchError> {
        self.submit(GenerationRequest::generate(prompt, ratio)).await
    }

    /// Submit an image-to-image job and wait for its image URLs.
    pub async fn submit_edit(
        &self,
        prompt: &str,
        reference_image_url: &str,
        ratio: &str,
    ) -> Result<Vec<String>, DispatchError> {
        self.submit(GenerationRequest::edit(prompt, reference_image_url, ratio))
            .await
    }

    /// Dispatch a job to the next idle worker and wait for it to resolve.
    ///
    /// Never blocks for longer than the task timeout after delivery.
    pub async fn submit(&self, request: GenerationRequest) -> Result<Vec<String>, DispatchError> {
        request.validate()?;

        let (task_id, client_id, outcome_rx) = self.claim_and_deliver(request).await?;
        tracing::info!(task_id = %task_id, client_id = %client_id, "Task sent to client");

        let result = self.await_outcome(&task_id, outcome_rx).await;
        match &result {
            Ok(urls) => {
                tracing::info!(task_id = %task_id, image_count = urls.len(), "Dispatch succeeded");
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Dispatch failed");
            }
        }
        result
    }

    /// Cleanup, select, create, claim and push as one atomic step.
    async fn claim_and_deliver(
        &self,
        request: GenerationRequest,
    ) -> Result<(TaskId, ClientId, oneshot::Receiver<TaskOutcome>), DispatchError> {
        let mut state = self.hub.write().await;

        state.sweep_timeouts(Instant::now());
        state.prune_dead();

        let client_id = state
            .registry
            .select_idle()
            .ok_or(DispatchError::NoIdleClients)?;

        let new_task = NewTask {
            prompt: request.prompt,
            ratio: request.ratio,
            reference_image_url: request.reference_image_url,
            task_type: self.config.task_type.clone(),
            timeout: self.config.task_timeout,
        };
        let task = state.ledger.create(new_task, &client_id);
        let task_id = task.id.clone();
        let frame = TaskPayload::from(task).to_frame();

        state.registry.mark_busy(&client_id, &task_id);

        let delivered = match frame {
            Ok(frame) => state
                .registry
                .send(&client_id, frame)
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("Failed to serialize task payload: {e}")),
        };

        if let Err(reason) = delivered {
            tracing::error!(
                task_id = %task_id,
                client_id = %client_id,
                error = %reason,
                "Failed to send task to client",
            );
            // Rolls the task to Errored and frees the client it claimed.
            state.fail_task(&task_id, Some(reason));
            return Err(DispatchError::DeliveryFailed { client_id });
        }

        let outcome_rx = state
            .ledger
            .watch(&task_id)
            .ok_or_else(|| DispatchError::TaskLost {
                task_id: task_id.clone(),
            })?;

        Ok((task_id, client_id, outcome_rx))
    }

    /// Wait for the task's terminal outcome, bounded by its timeout.
    async fn await_outcome(
        &self,
        task_id: &str,
        outcome_rx: oneshot::Receiver<TaskOutcome>,
    ) -> Result<Vec<String>, DispatchError> {
        match tokio::time::timeout(self.config.task_timeout, outcome_rx).await {
            Ok(Ok(outcome)) => outcome_to_result(task_id, outcome),
            Ok(Err(_)) => Err(DispatchError::TaskLost {
                task_id: task_id.to_string(),
            }),
            Err(_elapsed) => {
                let mut state = self.hub.write().await;
                state.time_out_task(task_id);

                // A worker result may have landed just before the guard
                // was taken; report whatever the ledger settled on.
                let task = state
                    .ledger
                    .get(task_id)
                    .ok_or_else(|| DispatchError::TaskLost {
                        task_id: task_id.to_string(),
                    })?;
                let outcome = match task.status {
                    TaskStatus::Completed => TaskOutcome::Completed(task.result_urls.clone()),
                    TaskStatus::Errored => TaskOutcome::Errored,
                    TaskStatus::TimedOut | TaskStatus::Pending => TaskOutcome::TimedOut,
                };
                outcome_to_result(task_id, outcome)
            }
        }
    }
}

fn outcome_to_result(task_id: &str, outcome: TaskOutcome) -> Result<Vec<String>, DispatchError> {
    match outcome {
        TaskOutcome::Completed(urls) => Ok(urls),
        TaskOutcome::TimedOut => Err(DispatchError::Timeout {
            task_id: task_id.to_string(),
        }),
        TaskOutcome::Errored => Err(DispatchError::TaskFailed {
            task_id: task_id.to_string(),
            status: TaskStatus::Errored,
        }),
    }
}

/// Caller-facing dispatch failures.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The request was rejected before any state was touched.
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// No registered worker is idle with an open connection.
    #[error("No idle clients available")]
    NoIdleClients,

    /// The chosen worker's connection closed before the payload was queued.
    #[error("Failed to send task to client {client_id}")]
    DeliveryFailed { client_id: ClientId },

    /// The task reached no terminal state within its budget.
    #[error("Task {task_id} timed out")]
    Timeout { task_id: TaskId },

    /// The worker reported an error or disconnected mid-task.
    #[error("Task {task_id} ended with status '{status}'")]
    TaskFailed { task_id: TaskId, status: TaskStatus },

    /// The task disappeared from the ledger before resolving.
    #[error("Task {task_id} was lost before it resolved")]
    TaskLost { task_id: TaskId },
}
