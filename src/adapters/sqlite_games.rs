//! Local SQLite game store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::domain::{GameRecord, SavedGame};

use super::{GameStore, GameStoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS games (
    id              TEXT PRIMARY KEY,
    type            TEXT NOT NULL,
    difficulty      TEXT NOT NULL,
    title           TEXT NOT NULL,
    description     TEXT NOT NULL,
    content         TEXT NOT NULL,
    created_by      TEXT,
    idempotency_key TEXT NOT NULL UNIQUE,
    created_at      TEXT NOT NULL
);
"#;

/// Games table in a local SQLite database
#[derive(Clone)]
pub struct SqliteGameStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGameStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create games directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open games database: {}", path.display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize games schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored games
    pub async fn count(&self) -> Result<u64> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("Games store lock poisoned"))?;
            let count: i64 = guard.query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
        .context("Games store task failed")?
    }
}

#[async_trait]
impl GameStore for SqliteGameStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn persist(&self, record: &GameRecord) -> Result<SavedGame, GameStoreError> {
        let conn = Arc::clone(&self.conn);
        let record = record.clone();
        let content = serde_json::to_string(&record.content)
            .map_err(|e| GameStoreError::Rejected(format!("Failed to save game: {}", e)))?;

        let id = tokio::task::spawn_blocking(move || -> Result<String> {
            let guard = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("Games store lock poisoned"))?;

            guard.execute(
                "INSERT INTO games (id, type, difficulty, title, description, content, \
                 created_by, idempotency_key, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT (idempotency_key) DO NOTHING",
                params![
                    Uuid::new_v4().to_string(),
                    record.game_type.as_str(),
                    record.difficulty.as_str(),
                    record.title,
                    record.description,
                    content,
                    record.created_by,
                    record.idempotency_key,
                    Utc::now(),
                ],
            )?;

            let id: Option<String> = guard
                .query_row(
                    "SELECT id FROM games WHERE idempotency_key = ?1",
                    params![record.idempotency_key],
                    |row| row.get(0),
                )
                .optional()?;

            id.context("Saved game row not found")
        })
        .await
        .context("Games store task failed")?
        .map_err(|e| GameStoreError::Database(e.context("Failed to save game")))?;

        info!(game_id = %id, "Game saved");
        Ok(SavedGame { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Difficulty, GameType, GeneratedContent};

    fn record(key: &str) -> GameRecord {
        GameRecord {
            game_type: GameType::Grammar,
            difficulty: Difficulty::Beginner,
            title: "ser vs estar Grammar".to_string(),
            description: "Practice ser vs estar in Mexican Spanish".to_string(),
            content: GeneratedContent(serde_json::json!({ "questions": [] })),
            created_by: None,
            idempotency_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_persist_is_idempotent() {
        let store = SqliteGameStore::open_in_memory().unwrap();

        let first = store.persist(&record("exec-1:saveGame:2")).await.unwrap();
        let again = store.persist(&record("exec-1:saveGame:2")).await.unwrap();
        let other = store.persist(&record("exec-2:saveGame:2")).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("data").join("games.db");

        let store = SqliteGameStore::open(&path).unwrap();
        store.persist(&record("k")).await.unwrap();
        drop(store);

        let reopened = SqliteGameStore::open(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
