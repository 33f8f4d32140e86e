//! Workflow definitions and the context they run in.
//!
//! Workflow code must be deterministic: the same sequence of activity
//! results must always produce the same sequence of activity calls. All
//! I/O, clock reads and randomness live in activities. Workflows reach
//! activities only through an `ActivityProxy`, which numbers every call,
//! records it in the execution history, and replays recorded results when
//! an execution is resumed by another worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::domain::{EventType, FailureKind, HistoryEvent};

use super::activity::{Activity, ActivityError, ActivityRegistry};
use super::retry::ActivityOptions;
use super::store::ExecutionStore;

/// Failure that ends a workflow execution
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Business failure raised by workflow logic
    #[error("{0}")]
    Application(String),

    /// An activity failed permanently or exhausted its retries
    #[error("Activity '{activity}' failed after {attempts} attempt(s): {source}")]
    Activity {
        activity: String,
        attempts: u32,
        #[source]
        source: ActivityError,
    },

    /// The execution input does not match the workflow's input type
    #[error("Invalid input for workflow '{workflow}': {message}")]
    InvalidInput { workflow: String, message: String },

    /// Replayed history disagrees with the activity calls being made
    #[error("Nondeterministic workflow: call {seq} was '{recorded}' in history but '{requested}' on replay")]
    Nondeterminism {
        seq: u32,
        recorded: String,
        requested: String,
    },

    #[error("Activity '{0}' is not registered on this worker")]
    UnregisteredActivity(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application(message.into())
    }

    /// Machine-readable classification recorded with the execution
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Application(_) | Self::InvalidInput { .. } => FailureKind::Application,
            Self::Activity { source, .. } => match source {
                ActivityError::Retryable(_) => FailureKind::ActivityFailed,
                ActivityError::NonRetryable(_) => FailureKind::ActivityNonRetryable,
                ActivityError::Timeout(_) => FailureKind::ActivityTimeout,
            },
            Self::Nondeterminism { .. } => FailureKind::Nondeterminism,
            Self::UnregisteredActivity(_) | Self::Internal(_) => FailureKind::Internal,
        }
    }
}

/// A deterministic orchestration procedure
#[async_trait]
pub trait Workflow: Send + Sync {
    /// Registered workflow type name
    const NAME: &'static str;

    type Input: Serialize + DeserializeOwned + Send + 'static;
    type Output: Serialize + DeserializeOwned + Send + 'static;

    async fn run(
        &self,
        ctx: &WorkflowContext,
        input: Self::Input,
    ) -> Result<Self::Output, WorkflowError>;
}

/// Object-safe view of a workflow over JSON values
#[async_trait]
pub(crate) trait ErasedWorkflow: Send + Sync {
    async fn run_json(
        &self,
        ctx: &WorkflowContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, WorkflowError>;
}

#[async_trait]
impl<W> ErasedWorkflow for W
where
    W: Workflow + 'static,
{
    async fn run_json(
        &self,
        ctx: &WorkflowContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, WorkflowError> {
        let input: W::Input =
            serde_json::from_value(input).map_err(|e| WorkflowError::InvalidInput {
                workflow: W::NAME.to_string(),
                message: e.to_string(),
            })?;

        let output = self.run(ctx, input).await?;

        serde_json::to_value(output).map_err(|e| {
            WorkflowError::Internal(anyhow::anyhow!(
                "Failed to serialize result of workflow '{}': {}",
                W::NAME,
                e
            ))
        })
    }
}

/// Workflows a worker can execute, keyed by name
#[derive(Default, Clone)]
pub struct WorkflowRegistry {
    workflows: HashMap<&'static str, Arc<dyn ErasedWorkflow>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<W>(&mut self, workflow: W)
    where
        W: Workflow + 'static,
    {
        self.workflows.insert(W::NAME, Arc::new(workflow));
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn ErasedWorkflow>> {
        self.workflows.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.workflows.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

/// What a resumed execution already knows from its history
#[derive(Debug, Default)]
struct ReplayState {
    /// seq -> activity type of every call already issued
    scheduled: HashMap<u32, String>,

    /// seq -> recorded output of completed calls
    completed: HashMap<u32, serde_json::Value>,

    /// seq -> error of calls that failed permanently
    failed: HashMap<u32, String>,

    /// seq -> attempts already started
    attempts: HashMap<u32, u32>,

    /// seq -> error of the most recent failed attempt
    last_error: HashMap<u32, String>,

    /// seq -> when a backoff cut short by a lost worker ends
    retry_due: HashMap<u32, DateTime<Utc>>,
}

impl ReplayState {
    fn from_history(history: &[HistoryEvent]) -> Self {
        let mut state = Self::default();

        for event in history {
            let Some(seq) = event.activity_seq else {
                continue;
            };

            match event.event_type {
                EventType::ActivityScheduled => {
                    if let Some(ref activity_type) = event.activity_type {
                        state.scheduled.insert(seq, activity_type.clone());
                    }
                }
                EventType::ActivityStarted => {
                    *state.attempts.entry(seq).or_insert(0) += 1;
                    state.retry_due.remove(&seq);
                }
                EventType::ActivityCompleted => {
                    state
                        .completed
                        .insert(seq, event.result.clone().unwrap_or(serde_json::Value::Null));
                }
                EventType::ActivityRetrying | EventType::ActivityTimedOut => {
                    if let Some(ref error) = event.error {
                        state.last_error.insert(seq, error.clone());
                    }
                    if let Some(retry_at) = event.retry_at {
                        state.retry_due.insert(seq, retry_at);
                    }
                }
                EventType::ActivityFailed => {
                    state
                        .failed
                        .insert(seq, event.error.clone().unwrap_or_default());
                }
                _ => {}
            }
        }

        state
    }
}

/// Handle a running workflow uses to reach the orchestration layer
pub struct WorkflowContext {
    execution_id: String,
    store: ExecutionStore,
    activities: ActivityRegistry,
    replay: ReplayState,
    next_seq: AtomicU32,
}

impl WorkflowContext {
    pub(crate) fn new(
        execution_id: String,
        store: ExecutionStore,
        activities: ActivityRegistry,
        history: &[HistoryEvent],
    ) -> Self {
        Self {
            execution_id,
            store,
            activities,
            replay: ReplayState::from_history(history),
            next_seq: AtomicU32::new(0),
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Proxy whose calls all use `options`
    pub fn activities(&self, options: ActivityOptions) -> ActivityProxy<'_> {
        ActivityProxy { ctx: self, options }
    }

    /// Idempotency key the next call to activity `A` will carry.
    ///
    /// Stable across replays of the same execution.
    pub fn idempotency_key<A: Activity>(&self) -> String {
        generate_idempotency_key(&self.execution_id, A::NAME, self.next_seq.load(Ordering::SeqCst))
    }

    fn activity_event(
        &self,
        event_type: EventType,
        seq: u32,
        activity_type: &str,
        idem_key: &str,
        summary: String,
    ) -> HistoryEvent {
        HistoryEvent::new(
            self.execution_id.clone(),
            event_type,
            idem_key.to_string(),
            summary,
        )
        .for_activity(seq, activity_type)
    }

    /// Execute one activity call under `options`, retrying per its policy
    pub async fn execute_activity(
        &self,
        activity_type: &str,
        input: serde_json::Value,
        options: &ActivityOptions,
    ) -> Result<serde_json::Value, WorkflowError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let idem_key = generate_idempotency_key(&self.execution_id, activity_type, seq);

        // Replay what history already knows about this call
        if let Some(recorded) = self.replay.scheduled.get(&seq) {
            if recorded != activity_type {
                return Err(WorkflowError::Nondeterminism {
                    seq,
                    recorded: recorded.clone(),
                    requested: activity_type.to_string(),
                });
            }
            if let Some(output) = self.replay.completed.get(&seq) {
                debug!(activity = activity_type, seq, "Replaying recorded activity result");
                return Ok(output.clone());
            }
            if let Some(error) = self.replay.failed.get(&seq) {
                return Err(WorkflowError::Activity {
                    activity: activity_type.to_string(),
                    attempts: self.replay.attempts.get(&seq).copied().unwrap_or(0),
                    source: ActivityError::NonRetryable(error.clone()),
                });
            }
        } else {
            let event = self.activity_event(
                EventType::ActivityScheduled,
                seq,
                activity_type,
                &idem_key,
                format!(
                    "Activity '{}' scheduled (input {})",
                    activity_type,
                    hash_input(&input.to_string())
                ),
            );
            self.store.append_event(&event).await?;
        }

        let activity = self
            .activities
            .get(activity_type)
            .ok_or_else(|| WorkflowError::UnregisteredActivity(activity_type.to_string()))?;

        let policy = &options.retry;
        let timeout = options.start_to_close_timeout();

        // An attempt interrupted by a lost worker counts as a failed attempt
        let mut attempt = self.replay.attempts.get(&seq).copied().unwrap_or(0);
        if attempt > 0 && !policy.should_retry(attempt) {
            let source = ActivityError::retryable(
                self.replay
                    .last_error
                    .get(&seq)
                    .cloned()
                    .unwrap_or_else(|| "Worker lost during activity attempt".to_string()),
            );
            return self
                .fail_activity(seq, activity_type, &idem_key, attempt, source)
                .await;
        }

        if let Some(due) = self.replay.retry_due.get(&seq) {
            if let Ok(remaining) = (*due - Utc::now()).to_std() {
                debug!(
                    activity = activity_type,
                    seq,
                    remaining_ms = remaining.as_millis() as u64,
                    "Resuming interrupted backoff"
                );
                tokio::time::sleep(remaining).await;
            }
        }

        loop {
            attempt += 1;
            let attempt_start = Instant::now();

            let start_event = self
                .activity_event(
                    EventType::ActivityStarted,
                    seq,
                    activity_type,
                    &idem_key,
                    format!("Activity '{}' attempt {}", activity_type, attempt),
                )
                .with_attempt(attempt);
            self.store.append_event(&start_event).await?;

            let outcome = match tokio::time::timeout(timeout, activity.invoke(input.clone())).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ActivityError::Timeout(timeout)),
            };

            let duration_ms = attempt_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    let complete_event = self
                        .activity_event(
                            EventType::ActivityCompleted,
                            seq,
                            activity_type,
                            &idem_key,
                            format!("Activity '{}' completed in {}ms", activity_type, duration_ms),
                        )
                        .with_attempt(attempt)
                        .with_duration(duration_ms)
                        .with_result(output.clone());
                    self.store.append_event(&complete_event).await?;

                    return Ok(output);
                }
                Err(e) => {
                    if let ActivityError::Timeout(limit) = e {
                        let timeout_event = self
                            .activity_event(
                                EventType::ActivityTimedOut,
                                seq,
                                activity_type,
                                &idem_key,
                                format!(
                                    "Activity '{}' attempt {} exceeded {:?}",
                                    activity_type, attempt, limit
                                ),
                            )
                            .with_attempt(attempt)
                            .with_duration(duration_ms)
                            .with_error(e.to_string());
                        self.store.append_event(&timeout_event).await?;
                    }

                    if e.is_retryable() && policy.should_retry(attempt) {
                        let delay = policy.delay_for_attempt(attempt);
                        let retry_at = chrono::Duration::from_std(delay)
                            .ok()
                            .and_then(|d| Utc::now().checked_add_signed(d));

                        let retry_event = self
                            .activity_event(
                                EventType::ActivityRetrying,
                                seq,
                                activity_type,
                                &idem_key,
                                format!(
                                    "Activity '{}' failed, retrying in {:?}: {}",
                                    activity_type, delay, e
                                ),
                            )
                            .with_attempt(attempt)
                            .with_duration(duration_ms)
                            .with_error(e.to_string())
                            .with_retry_at(retry_at);
                        self.store.append_event(&retry_event).await?;

                        warn!(
                            execution_id = %self.execution_id,
                            activity = activity_type,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Activity failed, retrying"
                        );

                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return self
                        .fail_activity(seq, activity_type, &idem_key, attempt, e)
                        .await;
                }
            }
        }
    }

    async fn fail_activity(
        &self,
        seq: u32,
        activity_type: &str,
        idem_key: &str,
        attempts: u32,
        source: ActivityError,
    ) -> Result<serde_json::Value, WorkflowError> {
        let fail_event = self
            .activity_event(
                EventType::ActivityFailed,
                seq,
                activity_type,
                idem_key,
                format!(
                    "Activity '{}' failed after {} attempts: {}",
                    activity_type, attempts, source
                ),
            )
            .with_attempt(attempts)
            .with_error(source.to_string());
        self.store.append_event(&fail_event).await?;

        error!(
            execution_id = %self.execution_id,
            activity = activity_type,
            attempts,
            error = %source,
            "Activity failed permanently"
        );

        Err(WorkflowError::Activity {
            activity: activity_type.to_string(),
            attempts,
            source,
        })
    }
}

/// Typed stub for calling activities from workflow code
pub struct ActivityProxy<'a> {
    ctx: &'a WorkflowContext,
    options: ActivityOptions,
}

impl ActivityProxy<'_> {
    /// Call activity `A` and wait for its outcome
    pub async fn call<A: Activity>(&self, input: &A::Input) -> Result<A::Output, WorkflowError> {
        let input = serde_json::to_value(input).map_err(|e| {
            WorkflowError::Internal(anyhow::anyhow!(
                "Failed to serialize input for activity '{}': {}",
                A::NAME,
                e
            ))
        })?;

        let output = self.ctx.execute_activity(A::NAME, input, &self.options).await?;

        serde_json::from_value(output).map_err(|e| {
            WorkflowError::Internal(anyhow::anyhow!(
                "Unexpected output from activity '{}': {}",
                A::NAME,
                e
            ))
        })
    }
}

/// Generate an idempotency key for an activity call
pub fn generate_idempotency_key(execution_id: &str, activity_type: &str, seq: u32) -> String {
    format!("{}:{}:{}", execution_id, activity_type, seq)
}

/// Hash input content (first 16 chars of SHA256)
pub fn hash_input(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}
