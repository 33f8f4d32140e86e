//! History events for durable workflow executions.
//!
//! Every state change of an execution and every activity attempt is
//! recorded as an immutable event. Completed activity results recorded here
//! are what a resumed execution replays instead of invoking the activity
//! again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single event in an execution's append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The execution this event belongs to
    pub execution_id: String,

    /// Position of the activity call within the workflow (if applicable)
    pub activity_seq: Option<u32>,

    /// Registered activity name (if applicable)
    pub activity_type: Option<String>,

    /// Type of event
    pub event_type: EventType,

    /// Attempt number, 1-indexed (activity attempt events only)
    pub attempt: Option<u32>,

    /// Idempotency key format: "{execution_id}:{activity}:{seq}"
    pub idempotency_key: String,

    /// Human-readable summary (NO secrets)
    pub payload_summary: String,

    /// Activity output or workflow result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Time taken in milliseconds (for finished attempts)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,

    /// When the next attempt is due (retrying events only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
}

impl HistoryEvent {
    /// Create a new execution-level event with the current timestamp
    pub fn new(
        execution_id: impl Into<String>,
        event_type: EventType,
        idempotency_key: String,
        payload_summary: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            execution_id: execution_id.into(),
            activity_seq: None,
            activity_type: None,
            event_type,
            attempt: None,
            idempotency_key,
            payload_summary,
            result: None,
            duration_ms: None,
            error: None,
            retry_at: None,
        }
    }

    /// Attach the activity call this event refers to
    pub fn for_activity(mut self, seq: u32, activity_type: &str) -> Self {
        self.activity_seq = Some(seq);
        self.activity_type = Some(activity_type.to_string());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_retry_at(mut self, retry_at: Option<DateTime<Utc>>) -> Self {
        self.retry_at = retry_at;
        self
    }
}

/// Types of events that can occur during an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A client submitted the execution
    ExecutionStarted,

    /// A worker acquired the execution lease
    ExecutionClaimed,

    /// The workflow returned a result
    ExecutionCompleted,

    /// The workflow failed
    ExecutionFailed,

    /// The execution exceeded its deadline
    ExecutionTimedOut,

    /// The workflow issued an activity call
    ActivityScheduled,

    /// An activity attempt began
    ActivityStarted,

    /// An activity attempt succeeded
    ActivityCompleted,

    /// An activity attempt exceeded its start-to-close timeout
    ActivityTimedOut,

    /// An activity invocation failed permanently
    ActivityFailed,

    /// An activity attempt failed and will be retried
    ActivityRetrying,
}
