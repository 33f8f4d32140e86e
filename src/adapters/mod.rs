//! Adapter interfaces for external systems.
//!
//! Activities reach the outside world only through these traits: a
//! content-generation provider (OpenAI chat completions) and a game store
//! (local SQLite or Supabase). Tests substitute in-process fakes.

pub mod openai;
pub mod sqlite_games;
pub mod supabase;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{GameRecord, SavedGame};

// Re-export the concrete adapters
pub use openai::OpenAiProvider;
pub use sqlite_games::SqliteGameStore;
pub use supabase::SupabaseGameStore;

/// Failure talking to the content-generation provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 401/403: credentials rejected
    #[error("{provider} authentication failed: {message}")]
    Auth { provider: String, message: String },

    /// 429: rate limit or quota
    #[error("{provider} rate limit exceeded: {message}")]
    RateLimited { provider: String, message: String },

    /// Other 4xx: the request itself is wrong
    #[error("{provider} rejected the request: {message}")]
    InvalidRequest { provider: String, message: String },

    /// 5xx
    #[error("{provider} server error: {message}")]
    Server { provider: String, message: String },

    /// Connection failures and request timeouts
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    /// The provider answered without any content
    #[error("No content generated from {provider}")]
    EmptyResponse { provider: String },

    /// The content is not a JSON object
    #[error("{provider} returned malformed JSON: {message}")]
    MalformedResponse { provider: String, message: String },
}

impl ProviderError {
    /// Whether a later attempt could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Auth { .. } | Self::InvalidRequest { .. })
    }
}

/// Failure persisting a game
#[derive(Debug, Error)]
pub enum GameStoreError {
    /// The store refused the record; retrying will not help
    #[error("{0}")]
    Rejected(String),

    /// The store could not be reached or answered with a server error
    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

impl GameStoreError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Structured-output content generator
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Generate a JSON object from a system prompt and user prompt.
    ///
    /// `schema` describes the desired shape; providers that only support a
    /// generic JSON mode may ignore it.
    async fn complete(
        &self,
        system_prompt: &str,
        prompt: &str,
        schema: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, ProviderError>;
}

/// Destination for finished games
#[async_trait]
pub trait GameStore: Send + Sync {
    fn name(&self) -> &str;

    /// Persist a record and return its id.
    ///
    /// Persisting a record whose `idempotency_key` is already stored returns
    /// the existing row's id without writing a second row.
    async fn persist(&self, record: &GameRecord) -> Result<SavedGame, GameStoreError>;
}
