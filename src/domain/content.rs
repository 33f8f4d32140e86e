//! Content-generation payloads passed between workflows and activities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Target proficiency level for generated exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of practice game a workflow produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    Grammar,
    Vocabulary,
}

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grammar => "grammar",
            Self::Vocabulary => "vocabulary",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input of the grammar workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarRequest {
    pub topic: String,
    pub difficulty: Difficulty,
    pub question_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Input of the vocabulary workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyRequest {
    pub theme: String,
    pub difficulty: Difficulty,
    pub question_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Result of a content-generation workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCreated {
    pub game_id: String,
}

/// Input of the generation activity: the prompts sent to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPrompt {
    #[serde(rename = "type")]
    pub game_type: GameType,
    pub system_prompt: String,
    pub prompt: String,
    /// Optional JSON schema describing the desired response shape
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
}

/// Structured output of the generation activity.
///
/// Kept as raw JSON: the provider's answer is only trusted after the
/// validation activity has inspected it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratedContent(pub serde_json::Value);

impl GeneratedContent {
    /// The `questions` array, if present
    pub fn questions(&self) -> Option<&Vec<serde_json::Value>> {
        self.0.get("questions").and_then(|q| q.as_array())
    }
}

/// Input of the validation activities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationInput {
    pub content: GeneratedContent,
    /// Number of questions the request asked for, if it should be enforced
    #[serde(default)]
    pub expected_count: Option<u32>,
}

/// Outcome of structural validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Record handed to the data store by the persistence activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    #[serde(rename = "type")]
    pub game_type: GameType,
    pub difficulty: Difficulty,
    pub title: String,
    pub description: String,
    pub content: GeneratedContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Deterministic key so a retried save cannot create a second row
    pub idempotency_key: String,
}

/// Identifier returned by the data store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedGame {
    pub id: String,
}
