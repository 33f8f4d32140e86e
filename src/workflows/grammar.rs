//! `generateGrammarWorkflow`: generate, validate and save a grammar game.

use async_trait::async_trait;
use tracing::warn;

use crate::activities::{GenerateStructuredContent, SaveGame, ValidateGrammarContent};
use crate::core::{ActivityOptions, Workflow, WorkflowContext, WorkflowError};
use crate::domain::{GameCreated, GameRecord, GameType, GrammarRequest, ValidationInput};

use super::{check_request, prompts, validation_failure};

#[derive(Debug, Clone, Default)]
pub struct GenerateGrammarWorkflow {
    options: ActivityOptions,
}

impl GenerateGrammarWorkflow {
    /// Options applied to every activity call this workflow makes
    pub fn with_options(options: ActivityOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Workflow for GenerateGrammarWorkflow {
    const NAME: &'static str = "generateGrammarWorkflow";
    type Input = GrammarRequest;
    type Output = GameCreated;

    async fn run(
        &self,
        ctx: &WorkflowContext,
        request: GrammarRequest,
    ) -> Result<GameCreated, WorkflowError> {
        check_request("topic", &request.topic, request.question_count)?;

        let activities = ctx.activities(self.options.clone());

        let content = activities
            .call::<GenerateStructuredContent>(&prompts::grammar_prompt(&request))
            .await?;

        let validation = activities
            .call::<ValidateGrammarContent>(&ValidationInput {
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
            game_type: GameType::Grammar,
            difficulty: request.difficulty,
            title: format!("{} Grammar", request.topic),
            description: format!("Practice {} in Mexican Spanish", request.topic),
            content,
            created_by: request.created_by,
            idempotency_key: ctx.idempotency_key::<SaveGame>(),
        };

        let saved = activities.call::<SaveGame>(&record).await?;

        Ok(GameCreated { game_id: saved.id })
    }
}
