//! Supabase (PostgREST) game store.
//!
//! Endpoint: POST {url}/rest/v1/games?on_conflict=idempotency_key
//! Auth: service-role key as both `apikey` and Bearer token

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::info;

use crate::domain::{GameRecord, SavedGame};

use super::{GameStore, GameStoreError};

/// Games table in a Supabase project
pub struct SupabaseGameStore {
    client: reqwest::Client,
    url: String,
    service_key: String,
}

#[derive(Deserialize)]
struct InsertedRow {
    id: serde_json::Value,
}

#[derive(Deserialize)]
struct PostgrestError {
    message: String,
}

impl SupabaseGameStore {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        }
    }

    fn error_message(body: &str) -> String {
        serde_json::from_str::<PostgrestError>(body)
            .map(|e| e.message)
            .unwrap_or_else(|_| body.trim().to_string())
    }
}

#[async_trait]
impl GameStore for SupabaseGameStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn persist(&self, record: &GameRecord) -> Result<SavedGame, GameStoreError> {
        let response = self
            .client
            .post(format!("{}/rest/v1/games", self.url))
            .query(&[("on_conflict", "idempotency_key"), ("select", "id")])
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Prefer", "return=representation,resolution=merge-duplicates")
            .json(record)
            .send()
            .await
            .map_err(|e| GameStoreError::Unavailable(format!("Failed to save game: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = format!("Failed to save game: {}", Self::error_message(&body));
            return Err(
                if status.is_server_error()
                    || status == StatusCode::TOO_MANY_REQUESTS
                    || status == StatusCode::REQUEST_TIMEOUT
                {
                    GameStoreError::Unavailable(message)
                } else {
                    GameStoreError::Rejected(message)
                },
            );
        }

        let rows: Vec<InsertedRow> = serde_json::from_str(&body).map_err(|e| {
            GameStoreError::Unavailable(format!("Failed to save game: unexpected response: {}", e))
        })?;

        let id = match rows.into_iter().next().map(|row| row.id) {
            Some(serde_json::Value::String(id)) => id,
            Some(serde_json::Value::Number(id)) => id.to_string(),
            _ => {
                return Err(GameStoreError::Unavailable(
                    "Failed to save game: no row returned".to_string(),
                ))
            }
        };

        info!(game_id = %id, "Game saved");
        Ok(SavedGame { id })
    }
}
