//! hablaflow - Durable content-generation workflows
//!
//! Generates Spanish practice games (grammar and vocabulary question sets)
//! through durable workflows: a workflow asks a language model for a
//! question set, validates its structure, and saves it as a game.
//!
//! # Architecture
//!
//! The system is built around a durable execution history:
//! - Clients submit executions to a SQLite-backed orchestration store
//! - Workers claim executions from a task queue under a renewable lease
//! - Every activity call and attempt is appended to the history
//! - A resumed execution replays recorded activity results instead of
//!   calling the activities again
//!
//! # Modules
//!
//! - `core`: Orchestration (store, workflows, activities, worker, client)
//! - `domain`: Data structures (executions, history events, content)
//! - `activities`: Generation, validation and persistence activities
//! - `workflows`: Grammar and vocabulary workflows
//! - `adapters`: External systems (OpenAI, SQLite games, Supabase)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run a worker
//! OPENAI_API_KEY=sk-... hablaflow worker
//!
//! # Start a workflow and wait for the game id
//! hablaflow start grammar "ser vs estar" --difficulty beginner -n 5 --wait 600
//!
//! # Inspect an execution
//! hablaflow status <execution-id>
//! hablaflow history <execution-id>
//! ```

pub mod activities;
pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod workflows;

// Re-export main types at crate root for convenience
pub use core::{
    Activity, ActivityError, ActivityOptions, ExecutionStore, RetryPolicy, Worker, WorkerOptions,
    Workflow, WorkflowClient, WorkflowContext, WorkflowError,
};
pub use domain::{ExecutionStatus, FailureKind, GameCreated, WorkflowExecution};
pub use workflows::{GenerateGrammarWorkflow, GenerateVocabularyWorkflow};
