//! Durable execution store backed by SQLite.
//!
//! Plays the part of the orchestration server: executions and their
//! history are persisted here, workers claim executions through leases,
//! and clients read status and results back. History events are stored as
//! JSON, one row per event, in append order.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::domain::{ExecutionStatus, FailureKind, HistoryEvent, WorkflowExecution};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS executions (
    id                   TEXT PRIMARY KEY,
    workflow_type        TEXT NOT NULL,
    task_queue           TEXT NOT NULL,
    input                TEXT NOT NULL,
    status               TEXT NOT NULL,
    result               TEXT,
    failure_reason       TEXT,
    failure_kind         TEXT,
    created_at           TEXT NOT NULL,
    completed_at         TEXT,
    execution_timeout_ms INTEGER,
    lease_owner          TEXT,
    lease_expires_at     INTEGER
);
CREATE INDEX IF NOT EXISTS idx_executions_queue
    ON executions (task_queue, status);

CREATE TABLE IF NOT EXISTS history (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL REFERENCES executions (id),
    event        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_execution
    ON history (execution_id, seq);
"#;

const EXECUTION_COLUMNS: &str = "id, workflow_type, task_queue, input, status, result, \
     failure_reason, failure_kind, created_at, completed_at, execution_timeout_ms, lease_owner";

/// Terminal state written when an execution finishes
#[derive(Debug, Clone)]
pub struct TerminalUpdate {
    pub status: ExecutionStatus,
    pub result: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub failure_kind: Option<FailureKind>,
}

impl TerminalUpdate {
    pub fn completed(result: serde_json::Value) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            result: Some(result),
            failure_reason: None,
            failure_kind: None,
        }
    }

    pub fn failed(status: ExecutionStatus, kind: FailureKind, reason: String) -> Self {
        Self {
            status,
            result: None,
            failure_reason: Some(reason),
            failure_kind: Some(kind),
        }
    }
}

/// SQLite-backed store shared by clients and workers
#[derive(Clone)]
pub struct ExecutionStore {
    conn: Arc<Mutex<Connection>>,

    /// Database location (None for in-memory stores)
    path: Option<PathBuf>,
}

impl ExecutionStore {
    /// Connect to the store named by an orchestrator address.
    ///
    /// Accepts `sqlite://<path>`, a bare filesystem path, or `:memory:`.
    pub fn connect(address: &str) -> Result<Self> {
        let location = address.strip_prefix("sqlite://").unwrap_or(address);

        if location == ":memory:" {
            return Self::open_in_memory();
        }

        Self::open(Path::new(location))
            .with_context(|| format!("Failed to connect to orchestration store at '{}'", address))
    }

    /// Open (or create) a store at a database path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create store directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;

        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory store (tests, single-process demos)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize execution store schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Database path (None for in-memory stores)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure against the connection on the blocking pool
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("Execution store lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .context("Execution store task failed")?
    }

    /// Insert a new execution together with its first history event.
    ///
    /// Returns false (and writes nothing) if the id already exists.
    pub async fn insert_execution(
        &self,
        execution: &WorkflowExecution,
        started: &HistoryEvent,
    ) -> Result<bool> {
        let execution = execution.clone();
        let event_json = serde_json::to_string(started).context("Failed to serialize event")?;

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists: bool = tx
                .query_row(
                    "SELECT 1 FROM executions WHERE id = ?1",
                    params![execution.id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if exists {
                return Ok(false);
            }

            let input = serde_json::to_string(&execution.input)
                .context("Failed to serialize execution input")?;
            let timeout_ms = execution
                .execution_timeout_ms
                .map(i64::try_from)
                .transpose()
                .context("Execution timeout out of range")?;

            tx.execute(
                "INSERT INTO executions (id, workflow_type, task_queue, input, status, created_at, \
                 execution_timeout_ms) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    execution.id,
                    execution.workflow_type,
                    execution.task_queue,
                    input,
                    execution.status.as_str(),
                    execution.created_at,
                    timeout_ms,
                ],
            )?;
            tx.execute(
                "INSERT INTO history (execution_id, event) VALUES (?1, ?2)",
                params![execution.id, event_json],
            )?;

            tx.commit()?;
            Ok(true)
        })
        .await
    }

    /// Load an execution by id
    pub async fn get(&self, id: &str) -> Result<Option<WorkflowExecution>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM executions WHERE id = ?1", EXECUTION_COLUMNS);
            let raw = conn
                .query_row(&sql, params![id], RawExecution::from_row)
                .optional()?;
            raw.map(RawExecution::into_execution).transpose()
        })
        .await
    }

    /// List executions, most recently submitted first
    pub async fn list(&self, limit: usize) -> Result<Vec<WorkflowExecution>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM executions ORDER BY rowid DESC LIMIT ?1",
                EXECUTION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit as i64], RawExecution::from_row)?;

            let mut executions = Vec::new();
            for raw in rows {
                executions.push(raw?.into_execution()?);
            }
            Ok(executions)
        })
        .await
    }

    /// Claim the oldest running execution on a task queue whose workflow
    /// type is one of `workflow_types` and whose lease is free or expired.
    pub async fn claim_next(
        &self,
        task_queue: &str,
        workflow_types: &[&str],
        owner: &str,
        lease: Duration,
    ) -> Result<Option<WorkflowExecution>> {
        let task_queue = task_queue.to_string();
        let workflow_types: Vec<String> = workflow_types.iter().map(|t| t.to_string()).collect();
        let owner = owner.to_string();

        if workflow_types.is_empty() {
            return Ok(None);
        }

        self.with_conn(move |conn| {
            let now = Utc::now().timestamp_millis();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            // ?1 queue, ?2 now, ?3.. workflow types
            let placeholders: Vec<String> =
                (0..workflow_types.len()).map(|i| format!("?{}", i + 3)).collect();
            let sql = format!(
                "SELECT id FROM executions \
                 WHERE task_queue = ?1 AND status = 'running' \
                   AND (lease_owner IS NULL OR lease_expires_at IS NULL OR lease_expires_at <= ?2) \
                   AND workflow_type IN ({}) \
                 ORDER BY rowid LIMIT 1",
                placeholders.join(", ")
            );

            let mut bindings: Vec<&dyn rusqlite::ToSql> =
                vec![&task_queue as &dyn rusqlite::ToSql, &now as &dyn rusqlite::ToSql];
            bindings.extend(workflow_types.iter().map(|t| t as &dyn rusqlite::ToSql));

            let candidate: Option<String> = tx
                .query_row(&sql, bindings.as_slice(), |row| row.get(0))
                .optional()?;

            let Some(id) = candidate else {
                return Ok(None);
            };

            let expires = now.saturating_add(i64::try_from(lease.as_millis()).unwrap_or(i64::MAX));
            tx.execute(
                "UPDATE executions SET lease_owner = ?1, lease_expires_at = ?2 WHERE id = ?3",
                params![owner, expires, id],
            )?;

            let sql = format!("SELECT {} FROM executions WHERE id = ?1", EXECUTION_COLUMNS);
            let raw = tx.query_row(&sql, params![id], RawExecution::from_row)?;
            tx.commit()?;

            debug!(execution_id = %id, owner = %owner, "Claimed execution");
            raw.into_execution().map(Some)
        })
        .await
    }

    /// Extend a lease held by `owner`. Returns false if the lease was lost.
    pub async fn renew_lease(&self, id: &str, owner: &str, lease: Duration) -> Result<bool> {
        let id = id.to_string();
        let owner = owner.to_string();

        self.with_conn(move |conn| {
            let expires = Utc::now()
                .timestamp_millis()
                .saturating_add(i64::try_from(lease.as_millis()).unwrap_or(i64::MAX));
            let updated = conn.execute(
                "UPDATE executions SET lease_expires_at = ?1 \
                 WHERE id = ?2 AND lease_owner = ?3 AND status = 'running'",
                params![expires, id, owner],
            )?;
            Ok(updated == 1)
        })
        .await
    }

    /// Move a running execution held by `owner` to a terminal status and
    /// append the matching history event atomically.
    ///
    /// Returns false if the execution was no longer running under this owner.
    pub async fn finish(
        &self,
        id: &str,
        owner: &str,
        update: TerminalUpdate,
        event: &HistoryEvent,
    ) -> Result<bool> {
        let id = id.to_string();
        let owner = owner.to_string();
        let event_json = serde_json::to_string(event).context("Failed to serialize event")?;
        let result = update
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize execution result")?;

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let updated = tx.execute(
                "UPDATE executions SET status = ?1, result = ?2, failure_reason = ?3, \
                 failure_kind = ?4, completed_at = ?5, lease_owner = NULL, lease_expires_at = NULL \
                 WHERE id = ?6 AND status = 'running' AND lease_owner = ?7",
                params![
                    update.status.as_str(),
                    result,
                    update.failure_reason,
                    update.failure_kind.map(|k| k.as_str()),
                    Utc::now(),
                    id,
                    owner,
                ],
            )?;

            if updated == 0 {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO history (execution_id, event) VALUES (?1, ?2)",
                params![id, event_json],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    /// Append an event to an execution's history
    pub async fn append_event(&self, event: &HistoryEvent) -> Result<()> {
        let execution_id = event.execution_id.clone();
        let json = serde_json::to_string(event).context("Failed to serialize event")?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO history (execution_id, event) VALUES (?1, ?2)",
                params![execution_id, json],
            )
            .context("Failed to append history event")?;
            Ok(())
        })
        .await
    }

    /// Replay an execution's history in order
    pub async fn history(&self, id: &str) -> Result<Vec<HistoryEvent>> {
        let id = id.to_string();

        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT event FROM history WHERE execution_id = ?1 ORDER BY seq")?;
            let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;

            let mut events = Vec::new();
            for line in rows {
                let line = line?;
                let event: HistoryEvent = serde_json::from_str(&line)
                    .with_context(|| format!("Failed to parse event: {}", line))?;
                events.push(event);
            }
            Ok(events)
        })
        .await
    }
}

/// Row as stored, before parsing the text columns
struct RawExecution {
    id: String,
    workflow_type: String,
    task_queue: String,
    input: String,
    status: String,
    result: Option<String>,
    failure_reason: Option<String>,
    failure_kind: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    execution_timeout_ms: Option<i64>,
    lease_owner: Option<String>,
}

impl RawExecution {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workflow_type: row.get(1)?,
            task_queue: row.get(2)?,
            input: row.get(3)?,
            status: row.get(4)?,
            result: row.get(5)?,
            failure_reason: row.get(6)?,
            failure_kind: row.get(7)?,
            created_at: row.get(8)?,
            completed_at: row.get(9)?,
            execution_timeout_ms: row.get(10)?,
            lease_owner: row.get(11)?,
        })
    }

    fn into_execution(self) -> Result<WorkflowExecution> {
        let input = serde_json::from_str(&self.input)
            .with_context(|| format!("Corrupt input for execution {}", self.id))?;
        let result = self
            .result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .with_context(|| format!("Corrupt result for execution {}", self.id))?;
        let failure_kind = self
            .failure_kind
            .as_deref()
            .map(str::parse::<FailureKind>)
            .transpose()?;

        Ok(WorkflowExecution {
            status: self.status.parse()?,
            id: self.id,
            workflow_type: self.workflow_type,
            task_queue: self.task_queue,
            input,
            result,
            failure_reason: self.failure_reason,
            failure_kind,
            created_at: self.created_at,
            completed_at: self.completed_at,
            execution_timeout_ms: self.execution_timeout_ms.and_then(|ms| u64::try_from(ms).ok()),
            lease_owner: self.lease_owner,
        })
    }
}
