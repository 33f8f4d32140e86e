//! Core orchestration logic.
//!
//! This module contains:
//! - ExecutionStore: Durable executions, history and worker leases
//! - Activity / Workflow: Typed definitions and their registries
//! - WorkflowContext: Deterministic activity calls with retry and replay
//! - Worker: Claims and runs executions for one task queue
//! - WorkflowClient: Starts executions and reads results

pub mod activity;
pub mod client;
pub mod retry;
pub mod store;
pub mod worker;
pub mod workflow;

// Re-export commonly used types
pub use activity::{Activity, ActivityError, ActivityRegistry};
pub use client::{ClientError, StartOptions, WorkflowClient};
pub use retry::{ActivityOptions, RetryPolicy};
pub use store::{ExecutionStore, TerminalUpdate};
pub use worker::{Worker, WorkerBuilder, WorkerOptions};
pub use workflow::{
    generate_idempotency_key, hash_input, ActivityProxy, Workflow, WorkflowContext,
    WorkflowError, WorkflowRegistry,
};
