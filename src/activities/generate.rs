//! `generateStructuredContent`: ask the provider for a JSON question set.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::adapters::ContentProvider;
use crate::core::{Activity, ActivityError};
use crate::domain::{GeneratedContent, GenerationPrompt};

pub struct GenerateStructuredContent {
    provider: Arc<dyn ContentProvider>,
}

impl GenerateStructuredContent {
    pub fn new(provider: Arc<dyn ContentProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Activity for GenerateStructuredContent {
    const NAME: &'static str = "generateStructuredContent";
    type Input = GenerationPrompt;
    type Output = GeneratedContent;

    async fn execute(&self, input: GenerationPrompt) -> Result<GeneratedContent, ActivityError> {
        info!(
            game_type = %input.game_type,
            provider = self.provider.name(),
            "Generating structured content"
        );

        match self
            .provider
            .complete(&input.system_prompt, &input.prompt, input.schema.as_ref())
            .await
        {
            Ok(value) => Ok(GeneratedContent(value)),
            Err(e) if e.is_retryable() => Err(ActivityError::retryable(e.to_string())),
            Err(e) => Err(ActivityError::non_retryable(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ProviderError;
    use crate::domain::GameType;

    struct Fixed(Result<serde_json::Value, fn() -> ProviderError>);

    #[async_trait]
    impl ContentProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            _system_prompt: &str,
            _prompt: &str,
            _schema: Option<&serde_json::Value>,
        ) -> Result<serde_json::Value, ProviderError> {
            self.0.clone().map_err(|make| make())
        }
    }

    fn prompt() -> GenerationPrompt {
        GenerationPrompt {
            game_type: GameType::Grammar,
            system_prompt: "system".to_string(),
            prompt: "user".to_string(),
            schema: None,
        }
    }

    #[tokio::test]
    async fn test_returns_provider_json() {
        let activity = GenerateStructuredContent::new(Arc::new(Fixed(Ok(
            serde_json::json!({ "questions": [] }),
        ))));
        let content = activity.execute(prompt()).await.unwrap();
        assert_eq!(content.questions().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_error_classification_follows_provider() {
        let activity = GenerateStructuredContent::new(Arc::new(Fixed(Err(|| {
            ProviderError::Auth {
                provider: "OpenAI".to_string(),
                message: "401".to_string(),
            }
        }))));
        assert!(!activity.execute(prompt()).await.unwrap_err().is_retryable());

        let activity = GenerateStructuredContent::new(Arc::new(Fixed(Err(|| {
            ProviderError::EmptyResponse {
                provider: "OpenAI".to_string(),
            }
        }))));
        let err = activity.execute(prompt()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "No content generated from OpenAI");
    }
}
