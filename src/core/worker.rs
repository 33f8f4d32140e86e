//! Worker: claims executions from one task queue and runs them.
//!
//! The worker polls the execution store for running executions of the
//! workflow types it has registered, claims them under a lease, and runs
//! each one as its own tokio task. A bounded number of executions run at
//! once. Leases are renewed while an execution runs; if a worker dies, its
//! leases expire and another worker resumes the executions from history.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{EventType, ExecutionStatus, FailureKind, HistoryEvent, WorkflowExecution};

use super::activity::{Activity, ActivityRegistry};
use super::store::{ExecutionStore, TerminalUpdate};
use super::workflow::{Workflow, WorkflowContext, WorkflowRegistry};

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Task queue this worker serves
    pub task_queue: String,

    /// Maximum executions run concurrently
    pub max_concurrent_executions: usize,

    /// Delay between polls when no work is available
    pub poll_interval: Duration,

    /// How long a claim stays valid without renewal
    pub lease: Duration,

    /// Lease owner name; unique per worker process
    pub identity: String,
}

impl WorkerOptions {
    pub fn new(task_queue: impl Into<String>) -> Self {
        Self {
            task_queue: task_queue.into(),
            max_concurrent_executions: 10,
            poll_interval: Duration::from_millis(500),
            lease: Duration::from_secs(30),
            identity: format!(
                "worker-{}-{}",
                std::process::id(),
                &Uuid::new_v4().simple().to_string()[..8]
            ),
        }
    }

    pub fn with_max_concurrent_executions(mut self, max: usize) -> Self {
        self.max_concurrent_executions = max.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }
}

/// Process that executes workflows and activities for one task queue
pub struct Worker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    store: ExecutionStore,
    options: WorkerOptions,
    activities: ActivityRegistry,
    workflows: WorkflowRegistry,
}

/// Builder for [`Worker`]
pub struct WorkerBuilder {
    store: ExecutionStore,
    options: WorkerOptions,
    activities: ActivityRegistry,
    workflows: WorkflowRegistry,
}

impl WorkerBuilder {
    pub fn activity<A>(mut self, activity: A) -> Self
    where
        A: Activity + 'static,
    {
        self.activities.register(activity);
        self
    }

    pub fn workflow<W>(mut self, workflow: W) -> Self
    where
        W: Workflow + 'static,
    {
        self.workflows.register(workflow);
        self
    }

    pub fn activities(mut self, activities: ActivityRegistry) -> Self {
        self.activities = activities;
        self
    }

    pub fn workflows(mut self, workflows: WorkflowRegistry) -> Self {
        self.workflows = workflows;
        self
    }

    pub fn build(self) -> Result<Worker> {
        if self.workflows.is_empty() {
            anyhow::bail!(
                "Worker for task queue '{}' has no registered workflows",
                self.options.task_queue
            );
        }

        Ok(Worker {
            inner: Arc::new(WorkerInner {
                store: self.store,
                options: self.options,
                activities: self.activities,
                workflows: self.workflows,
            }),
        })
    }
}

impl Worker {
    pub fn builder(store: ExecutionStore, options: WorkerOptions) -> WorkerBuilder {
        WorkerBuilder {
            store,
            options,
            activities: ActivityRegistry::new(),
            workflows: WorkflowRegistry::new(),
        }
    }

    pub fn task_queue(&self) -> &str {
        &self.inner.options.task_queue
    }

    pub fn identity(&self) -> &str {
        &self.inner.options.identity
    }

    /// Claim and run executions until `shutdown` resolves.
    ///
    /// In-flight executions are abandoned on shutdown; their leases expire
    /// and they are resumed by the next worker that claims them.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let options = &self.inner.options;
        let semaphore = Arc::new(Semaphore::new(options.max_concurrent_executions));
        let mut tasks: JoinSet<()> = JoinSet::new();
        tokio::pin!(shutdown);

        info!(
            task_queue = %options.task_queue,
            identity = %options.identity,
            workflows = ?self.inner.workflows.names(),
            activities = ?self.inner.activities.names(),
            max_concurrent = options.max_concurrent_executions,
            "Worker started"
        );

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.context("Worker semaphore closed")?
                }
            };

            match self.inner.claim().await {
                Ok(Some(execution)) => {
                    let inner = Arc::clone(&self.inner);
                    tasks.spawn(async move {
                        let _permit = permit;
                        inner.execute(execution).await;
                    });
                    continue;
                }
                Ok(None) => drop(permit),
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "Failed to poll for work");
                }
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(options.poll_interval) => {}
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Execution task panicked");
                    }
                }
            }
        }

        info!(in_flight = tasks.len(), "Worker shutting down");
        tasks.shutdown().await;
        Ok(())
    }

    /// Claim one execution and run it to the end.
    ///
    /// Returns the execution as stored afterwards, or None if nothing was
    /// claimable.
    pub async fn poll_once(&self) -> Result<Option<WorkflowExecution>> {
        let Some(execution) = self.inner.claim().await? else {
            return Ok(None);
        };

        let id = execution.id.clone();
        self.inner.execute(execution).await;
        self.inner.store.get(&id).await
    }
}

impl WorkerInner {
    async fn claim(&self) -> Result<Option<WorkflowExecution>> {
        let types = self.workflows.names();
        self.store
            .claim_next(
                &self.options.task_queue,
                &types,
                &self.options.identity,
                self.options.lease,
            )
            .await
    }

    /// Run a claimed execution and record its terminal state
    async fn execute(&self, execution: WorkflowExecution) {
        let id = execution.id.clone();
        if let Err(e) = self.execute_inner(execution).await {
            // The lease will lapse and the execution will be retried
            error!(execution_id = %id, error = %e, "Execution aborted");
        }
    }

    async fn execute_inner(&self, execution: WorkflowExecution) -> Result<()> {
        let start = Instant::now();
        let id = execution.id.clone();
        let identity = &self.options.identity;

        // Claims only return registered types
        let workflow = self
            .workflows
            .get(&execution.workflow_type)
            .with_context(|| format!("Workflow '{}' is not registered", execution.workflow_type))?;

        let history = self.store.history(&id).await?;
        let resumed = history
            .iter()
            .any(|e| e.event_type == EventType::ExecutionClaimed);

        let claimed = HistoryEvent::new(
            id.clone(),
            EventType::ExecutionClaimed,
            format!("{}:claim", id),
            format!("Claimed by {}", identity),
        );
        self.store.append_event(&claimed).await?;

        info!(
            execution_id = %id,
            workflow_type = %execution.workflow_type,
            resumed,
            "Executing workflow"
        );

        let ctx = WorkflowContext::new(
            id.clone(),
            self.store.clone(),
            self.activities.clone(),
            &history,
        );

        let remaining = execution
            .deadline()
            .map(|deadline| (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO));

        let run = async {
            let body = workflow.run_json(&ctx, execution.input.clone());
            match remaining {
                Some(remaining) => tokio::time::timeout(remaining, body).await.ok(),
                None => Some(body.await),
            }
        };

        let outcome = tokio::select! {
            outcome = run => outcome,
            _ = self.keep_lease(&id) => {
                warn!(execution_id = %id, "Lease lost, abandoning execution");
                return Ok(());
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Some(Ok(result)) => {
                info!(execution_id = %id, duration_ms, "Workflow completed");
                let event = HistoryEvent::new(
                    id.clone(),
                    EventType::ExecutionCompleted,
                    format!("{}:complete", id),
                    "Workflow completed".to_string(),
                )
                .with_duration(duration_ms)
                .with_result(result.clone());
                self.finish_with_event(&id, TerminalUpdate::completed(result), event)
                    .await?;
            }
            Some(Err(e)) => {
                let kind = e.kind();
                let reason = e.to_string();
                error!(execution_id = %id, kind = %kind, error = %reason, "Workflow failed");
                let update = TerminalUpdate::failed(ExecutionStatus::Failed, kind, reason.clone());
                self.finish(&id, update, EventType::ExecutionFailed, reason)
                    .await?;
            }
            None => {
                let reason = format!(
                    "Workflow execution timed out after {}ms",
                    execution.execution_timeout_ms.unwrap_or_default()
                );
                warn!(execution_id = %id, "Workflow execution timed out");
                let update = TerminalUpdate::failed(
                    ExecutionStatus::TimedOut,
                    FailureKind::ExecutionTimeout,
                    reason.clone(),
                );
                self.finish(&id, update, EventType::ExecutionTimedOut, reason)
                    .await?;
            }
        }

        Ok(())
    }

    async fn finish(
        &self,
        id: &str,
        update: TerminalUpdate,
        event_type: EventType,
        reason: String,
    ) -> Result<()> {
        let event = HistoryEvent::new(
            id.to_string(),
            event_type,
            format!("{}:complete", id),
            format!("Workflow ended: {}", update.status),
        )
        .with_error(reason);
        self.finish_with_event(id, update, event).await
    }

    async fn finish_with_event(
        &self,
        id: &str,
        update: TerminalUpdate,
        event: HistoryEvent,
    ) -> Result<()> {
        let finished = self
            .store
            .finish(id, &self.options.identity, update, &event)
            .await
            .with_context(|| format!("Failed to record outcome of execution {}", id))?;

        if !finished {
            warn!(execution_id = %id, "Execution no longer owned by this worker, outcome dropped");
        }
        Ok(())
    }

    /// Renew the lease on `id` until renewal fails
    async fn keep_lease(&self, id: &str) {
        let period = (self.options.lease / 3).max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self
                .store
                .renew_lease(id, &self.options.identity, self.options.lease)
                .await
            {
                Ok(true) => debug!(execution_id = %id, "Lease renewed"),
                Ok(false) => return,
                Err(e) => warn!(execution_id = %id, error = %e, "Failed to renew lease"),
            }
        }
    }
}
