//! Content-generation workflows.
//!
//! Both workflows follow the same three steps: generate a question set,
//! validate its structure, then save it as a game. They contain no I/O of
//! their own; everything goes through activity calls.

pub mod grammar;
pub mod prompts;
pub mod vocabulary;

use crate::core::{ActivityOptions, WorkflowError, WorkflowRegistry};

pub use grammar::GenerateGrammarWorkflow;
pub use vocabulary::GenerateVocabularyWorkflow;

/// Registry holding both workflows, each using `options` for its activity calls
pub fn registry(options: &ActivityOptions) -> WorkflowRegistry {
    let mut registry = WorkflowRegistry::new();
    registry.register(GenerateGrammarWorkflow::with_options(options.clone()));
    registry.register(GenerateVocabularyWorkflow::with_options(options.clone()));
    registry
}

fn check_request(field: &str, subject: &str, question_count: u32) -> Result<(), WorkflowError> {
    if subject.trim().is_empty() {
        return Err(WorkflowError::application(format!(
            "Invalid request: {} must not be empty",
            field
        )));
    }
    if question_count == 0 {
        return Err(WorkflowError::application(
            "Invalid request: questionCount must be greater than 0",
        ));
    }
    Ok(())
}

fn validation_failure(errors: &[String]) -> WorkflowError {
    WorkflowError::application(format!("Validation failed: {}", errors.join(", ")))
}
