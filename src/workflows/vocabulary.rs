//! `generateVocabularyWorkflow`: generate, validate and save a vocabulary game.

use async_trait::async_trait;
use tracing::warn;

use crate::activities::{GenerateStructuredContent, SaveGame, ValidateVocabularyContent};
use crate::core::{ActivityOptions, Workflow, WorkflowContext, WorkflowError};
use crate::domain::{GameCreated, GameRecord, GameType, ValidationInput, VocabularyRequest};

use super::{check_request, prompts, validation_failure};

#[derive(Debug, Clone, Default)]
pub struct GenerateVocabularyWorkflow {
    options: ActivityOptions,
}

impl GenerateVocabularyWorkflow {
    pub fn with_options(options: ActivityOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Workflow for GenerateVocabularyWorkflow {
    const NAME: &'static str = "generateVocabularyWorkflow";
    type Input = VocabularyRequest;
    type Output = GameCreated;

    async fn run(
        &self,
        ctx: &WorkflowContext,
        request: VocabularyRequest,
    ) -> Result<GameCreated, WorkflowError> {
        check_request("theme", &request.theme, request.question_count)?;

        let activities = ctx.activities(self.options.clone());

        let content = activities
            .call::<GenerateStructuredContent>(&prompts::vocabulary_prompt(&request))
            .await?;

        let validation = activities
            .call::<ValidateVocabularyContent>(&ValidationInput {
                content: content.clone(),
                expected_count: Some(request.question_count),
            })
            .await?;

        if !validation.valid {
            warn!(
                execution_id = ctx.execution_id(),
                errors = validation.errors.len(),
                "Generated content failed validation"
            );
            return Err(validation_failure(&validation.errors));
        }

        let record = GameRecord {
            game_type: GameType::Vocabulary,
            difficulty: request.difficulty,
            title: format!("{} Vocabulary", request.theme),
            description: format!("Learn {} vocabulary in Mexico City Spanish", request.theme),
            content,
            created_by: request.created_by,
            idempotency_key: ctx.idempotency_key::<SaveGame>(),
        };

        let saved = activities.call::<SaveGame>(&record).await?;

        Ok(GameCreated { game_id: saved.id })
    }
}
