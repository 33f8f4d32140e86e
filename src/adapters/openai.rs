//! OpenAI chat-completions provider in JSON-object mode.
//!
//! Endpoint: POST {base_url}/chat/completions
//! Auth: Bearer token

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{ContentProvider, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

const PROVIDER_NAME: &str = "OpenAI";

/// OpenAI chat-completions client
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    request_timeout: Option<Duration>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    /// Create a provider with the default endpoint, model and temperature
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            request_timeout: None,
        }
    }

    /// Point at an OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Per-request HTTP timeout (the activity timeout still applies on top)
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn map_status(status: StatusCode, body: &str) -> ProviderError {
        let provider = PROVIDER_NAME.to_string();
        let message = format!("{}: {}", status, body.trim());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ProviderError::Auth { provider, message }
            }
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { provider, message },
            // Request timeouts behave like a flaky server
            StatusCode::REQUEST_TIMEOUT => ProviderError::Transport { provider, message },
            s if s.is_server_error() => ProviderError::Server { provider, message },
            _ => ProviderError::InvalidRequest { provider, message },
        }
    }
}

#[async_trait]
impl ContentProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(
        &self,
        system_prompt: &str,
        prompt: &str,
        _schema: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
            temperature: self.temperature,
        };

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| ProviderError::Transport {
            provider: PROVIDER_NAME.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, &text));
        }

        let completion: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse {
                    provider: PROVIDER_NAME.to_string(),
                    message: e.to_string(),
                })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::EmptyResponse {
                provider: PROVIDER_NAME.to_string(),
            })?;

        debug!(bytes = content.len(), "Received structured content");

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ProviderError::MalformedResponse {
                provider: PROVIDER_NAME.to_string(),
                message: e.to_string(),
            })?;

        if !value.is_object() {
            return Err(ProviderError::MalformedResponse {
                provider: PROVIDER_NAME.to_string(),
                message: "expected a JSON object".to_string(),
            });
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    #[tokio::test]
    async fn test_complete_parses_json_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": "system" },
                    { "role": "user", "content": "user" }
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion(r#"{"questions":[]}"#)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("sk-test").with_base_url(server.uri());
        let value = provider.complete("system", "user", None).await.unwrap();

        assert_eq!(value, serde_json::json!({ "questions": [] }));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("sk-test").with_base_url(server.uri());
        let err = provider.complete("", "user", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
        assert!(err.is_retryable());

        assert!(!OpenAiProvider::map_status(StatusCode::UNAUTHORIZED, "").is_retryable());
        assert!(!OpenAiProvider::map_status(StatusCode::BAD_REQUEST, "").is_retryable());
        assert!(OpenAiProvider::map_status(StatusCode::BAD_GATEWAY, "").is_retryable());
    }

    #[tokio::test]
    async fn test_empty_and_malformed_content_are_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": null } }]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("sk-test").with_base_url(server.uri());
        let err = provider.complete("s", "u", None).await.unwrap_err();
        assert_eq!(err.to_string(), "No content generated from OpenAI");
        assert!(err.is_retryable());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("not json")))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("sk-test").with_base_url(server.uri());
        let err = provider.complete("s", "u", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
        assert!(err.is_retryable());
    }
}
