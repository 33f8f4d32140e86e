//! Client for submitting workflow executions and reading them back.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{EventType, ExecutionStatus, FailureKind, HistoryEvent, WorkflowExecution};

use super::store::ExecutionStore;
use super::workflow::Workflow;

/// Default interval between status polls while waiting for a result
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Errors surfaced to callers of the client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Workflow execution already started: {0}")]
    AlreadyStarted(String),

    #[error("Workflow execution not found: {0}")]
    NotFound(String),

    /// The execution ended without a result
    #[error("Workflow execution {id} {status} ({kind}): {reason}")]
    ExecutionFailed {
        id: String,
        status: ExecutionStatus,
        kind: FailureKind,
        reason: String,
    },

    /// The execution timeout puts the deadline past any representable time
    #[error("Execution timeout {0:?} is out of range")]
    InvalidExecutionTimeout(Duration),

    #[error("Timed out after {waited:?} waiting for execution {id}")]
    WaitTimeout { id: String, waited: Duration },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Optional parameters for starting an execution
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Caller-chosen execution id (random UUID if unset)
    pub execution_id: Option<String>,

    /// Deadline for the whole execution, measured from submission
    pub execution_timeout: Option<Duration>,
}

impl StartOptions {
    pub fn with_execution_id(mut self, id: impl Into<String>) -> Self {
        self.execution_id = Some(id.into());
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }
}

/// Submits executions to the orchestration store and queries their state
#[derive(Clone)]
pub struct WorkflowClient {
    store: ExecutionStore,
    poll_interval: Duration,
}

impl WorkflowClient {
    pub fn new(store: ExecutionStore) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Connect to the orchestration store at `address`
    pub fn connect(address: &str) -> anyhow::Result<Self> {
        Ok(Self::new(ExecutionStore::connect(address)?))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn store(&self) -> &ExecutionStore {
        &self.store
    }

    /// Start an execution and return its id without waiting for it
    pub async fn start(
        &self,
        workflow_type: &str,
        task_queue: &str,
        input: serde_json::Value,
    ) -> Result<String, ClientError> {
        self.start_with_options(workflow_type, task_queue, input, StartOptions::default())
            .await
    }

    /// Start a typed workflow
    pub async fn start_workflow<W: Workflow>(
        &self,
        task_queue: &str,
        input: &W::Input,
        options: StartOptions,
    ) -> Result<String, ClientError> {
        let input = serde_json::to_value(input).map_err(|e| {
            ClientError::Store(anyhow::anyhow!(
                "Failed to serialize input for workflow '{}': {}",
                W::NAME,
                e
            ))
        })?;
        self.start_with_options(W::NAME, task_queue, input, options)
            .await
    }

    #[instrument(skip(self, input, options))]
    pub async fn start_with_options(
        &self,
        workflow_type: &str,
        task_queue: &str,
        input: serde_json::Value,
        options: StartOptions,
    ) -> Result<String, ClientError> {
        let id = options
            .execution_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let execution = WorkflowExecution {
            id: id.clone(),
            workflow_type: workflow_type.to_string(),
            task_queue: task_queue.to_string(),
            input,
            status: ExecutionStatus::Running,
            result: None,
            failure_reason: None,
            failure_kind: None,
            created_at: Utc::now(),
            completed_at: None,
            execution_timeout_ms: None,
            lease_owner: None,
        };

        let execution = match options.execution_timeout {
            Some(timeout) => {
                let execution = WorkflowExecution {
                    execution_timeout_ms: u64::try_from(timeout.as_millis()).ok(),
                    ..execution
                };
                if execution.deadline().is_none() {
                    return Err(ClientError::InvalidExecutionTimeout(timeout));
                }
                execution
            }
            None => execution,
        };

        let started = HistoryEvent::new(
            id.clone(),
            EventType::ExecutionStarted,
            format!("{}:start", id),
            format!("Started {} on queue '{}'", workflow_type, task_queue),
        );

        if !self.store.insert_execution(&execution, &started).await? {
            return Err(ClientError::AlreadyStarted(id));
        }

        info!(execution_id = %id, workflow_type, task_queue, "Workflow execution started");
        Ok(id)
    }

    /// Current state of an execution
    pub async fn describe(&self, id: &str) -> Result<WorkflowExecution, ClientError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ClientError::NotFound(id.to_string()))
    }

    /// Poll until the execution is terminal or `wait` elapses.
    ///
    /// A completed execution yields its result; a failed or timed-out one
    /// yields `ClientError::ExecutionFailed` carrying the failure reason.
    pub async fn result(&self, id: &str, wait: Duration) -> Result<serde_json::Value, ClientError> {
        let started = Instant::now();

        loop {
            let execution = self.describe(id).await?;

            match execution.status {
                ExecutionStatus::Completed => {
                    return Ok(execution.result.unwrap_or(serde_json::Value::Null));
                }
                ExecutionStatus::Failed | ExecutionStatus::TimedOut => {
                    return Err(ClientError::ExecutionFailed {
                        id: execution.id,
                        status: execution.status,
                        kind: execution.failure_kind.unwrap_or(FailureKind::Internal),
                        reason: execution.failure_reason.unwrap_or_default(),
                    });
                }
                ExecutionStatus::Running => {}
            }

            let waited = started.elapsed();
            if waited >= wait {
                return Err(ClientError::WaitTimeout {
                    id: id.to_string(),
                    waited,
                });
            }

            debug!(execution_id = %id, "Execution still running");
            tokio::time::sleep(self.poll_interval.min(wait - waited)).await;
        }
    }

    /// Typed variant of [`WorkflowClient::result`]
    pub async fn result_as<T: DeserializeOwned>(
        &self,
        id: &str,
        wait: Duration,
    ) -> Result<T, ClientError> {
        let value = self.result(id, wait).await?;
        serde_json::from_value(value).map_err(|e| {
            ClientError::Store(anyhow::anyhow!("Unexpected result for execution {}: {}", id, e))
        })
    }

    /// Most recently submitted executions first
    pub async fn list(&self, limit: usize) -> Result<Vec<WorkflowExecution>, ClientError> {
        Ok(self.store.list(limit).await?)
    }

    /// Full history of an execution
    pub async fn history(&self, id: &str) -> Result<Vec<HistoryEvent>, ClientError> {
        // Distinguish unknown ids from executions with no events
        self.describe(id).await?;
        Ok(self.store.history(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_describe() {
        let client = WorkflowClient::new(ExecutionStore::open_in_memory().unwrap());

        let id = client
            .start(
                "generateGrammarWorkflow",
                "content-generation",
                serde_json::json!({ "topic": "ser vs estar" }),
            )
            .await
            .unwrap();

        let execution = client.describe(&id).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert_eq!(execution.task_queue, "content-generation");

        let history = client.history(&id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event_type, EventType::ExecutionStarted);
    }

    #[tokio::test]
    async fn test_duplicate_execution_id_rejected() {
        let client = WorkflowClient::new(ExecutionStore::open_in_memory().unwrap());
        let options = StartOptions::default().with_execution_id("grammar-ser-estar");

        client
            .start_with_options("wf", "queue", serde_json::json!({}), options.clone())
            .await
            .unwrap();

        let err = client
            .start_with_options("wf", "queue", serde_json::json!({}), options)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AlreadyStarted(ref id) if id == "grammar-ser-estar"));
    }

    #[tokio::test]
    async fn test_result_wait_times_out_while_running() {
        let client = WorkflowClient::new(ExecutionStore::open_in_memory().unwrap())
            .with_poll_interval(Duration::from_millis(10));
        let id = client
            .start("wf", "queue", serde_json::json!({}))
            .await
            .unwrap();

        let err = client
            .result(&id, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::WaitTimeout { .. }));
    }

    #[tokio::test]
    async fn test_unknown_execution() {
        let client = WorkflowClient::new(ExecutionStore::open_in_memory().unwrap());
        assert!(matches!(
            client.describe("nope").await,
            Err(ClientError::NotFound(_))
        ));
        assert!(matches!(
            client.history("nope").await,
            Err(ClientError::NotFound(_))
        ));
    }
}
