//! Workflow execution state.
//!
//! A WorkflowExecution represents a single run of a workflow definition,
//! from submission by a client until it reaches a terminal status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single run of a workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Unique identifier for this execution
    pub id: String,

    /// Registered name of the workflow being executed
    pub workflow_type: String,

    /// Task queue the execution was submitted to
    pub task_queue: String,

    /// Input parameters provided at submission
    pub input: serde_json::Value,

    /// Current status of the execution
    pub status: ExecutionStatus,

    /// Workflow result (set once Completed)
    pub result: Option<serde_json::Value>,

    /// Human-readable failure reason (set once Failed or TimedOut)
    pub failure_reason: Option<String>,

    /// Machine-readable failure classification
    pub failure_kind: Option<FailureKind>,

    /// When the execution was submitted
    pub created_at: DateTime<Utc>,

    /// When the execution reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,

    /// Optional overall deadline in milliseconds, measured from submission
    pub execution_timeout_ms: Option<u64>,

    /// Worker currently holding the lease (if claimed)
    pub lease_owner: Option<String>,
}

impl WorkflowExecution {
    /// Check if the execution is still in progress
    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    /// Deadline for the whole execution, if one was requested
    ///
    /// None when no timeout was set or the deadline is past the range of
    /// representable timestamps.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        let ms = self.execution_timeout_ms?;
        let timeout = chrono::Duration::from_std(std::time::Duration::from_millis(ms)).ok()?;
        self.created_at.checked_add_signed(timeout)
    }
}

/// Status of a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Submitted or executing
    Running,

    /// Completed successfully
    Completed,

    /// Failed (with reason)
    Failed,

    /// Exceeded its execution timeout
    TimedOut,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "timed_out" => Ok(Self::TimedOut),
            other => anyhow::bail!("Unknown execution status: {}", other),
        }
    }
}

/// Classification of a terminal failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Raised by workflow logic (e.g. validation failed)
    Application,

    /// An activity exhausted its retry budget
    ActivityFailed,

    /// An activity reported a non-retriable failure
    ActivityNonRetryable,

    /// The last activity attempt exceeded its start-to-close timeout
    ActivityTimeout,

    /// The execution exceeded its overall deadline
    ExecutionTimeout,

    /// Replayed history disagreed with the workflow's activity calls
    Nondeterminism,

    /// Orchestration plumbing failed (store, registration, serialization)
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::ActivityFailed => "activity_failed",
            Self::ActivityNonRetryable => "activity_non_retryable",
            Self::ActivityTimeout => "activity_timeout",
            Self::ExecutionTimeout => "execution_timeout",
            Self::Nondeterminism => "nondeterminism",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "application" => Ok(Self::Application),
            "activity_failed" => Ok(Self::ActivityFailed),
            "activity_non_retryable" => Ok(Self::ActivityNonRetryable),
            "activity_timeout" => Ok(Self::ActivityTimeout),
            "execution_timeout" => Ok(Self::ExecutionTimeout),
            "nondeterminism" => Ok(Self::Nondeterminism),
            "internal" => Ok(Self::Internal),
            other => anyhow::bail!("Unknown failure kind: {}", other),
        }
    }
}
