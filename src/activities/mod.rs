//! Concrete activities registered by the content-generation worker.

pub mod generate;
pub mod persist;
pub mod validate;

use std::sync::Arc;

use crate::adapters::{ContentProvider, GameStore};
use crate::core::ActivityRegistry;

pub use generate::GenerateStructuredContent;
pub use persist::SaveGame;
pub use validate::{
    validate_grammar_content, validate_vocabulary_content, ValidateGrammarContent,
    ValidateVocabularyContent,
};

/// Registry holding every content-generation activity
pub fn registry(
    provider: Arc<dyn ContentProvider>,
    games: Arc<dyn GameStore>,
) -> ActivityRegistry {
    let mut registry = ActivityRegistry::new();
    registry.register(GenerateStructuredContent::new(provider));
    registry.register(ValidateGrammarContent);
    registry.register(ValidateVocabularyContent);
    registry.register(SaveGame::new(games));
    registry
}
