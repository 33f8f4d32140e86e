//! Domain types for the hablaflow orchestrator.
//!
//! This module contains the core data structures:
//! - Execution: Workflow execution state and failure classification
//! - Events: Immutable history records of state changes
//! - Content: Payloads exchanged between workflows and activities

pub mod content;
pub mod events;
pub mod execution;

// Re-export commonly used types
pub use content::{
    Difficulty, GameCreated, GameRecord, GameType, GeneratedContent, GenerationPrompt,
    GrammarRequest, SavedGame, ValidationInput, ValidationResult, VocabularyRequest,
};
pub use events::{EventType, HistoryEvent};
pub use execution::{ExecutionStatus, FailureKind, WorkflowExecution};
