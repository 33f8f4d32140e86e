//! `saveGame`: persist a finished game.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::adapters::GameStore;
use crate::core::{Activity, ActivityError};
use crate::domain::{GameRecord, SavedGame};

pub struct SaveGame {
    store: Arc<dyn GameStore>,
}

impl SaveGame {
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Activity for SaveGame {
    const NAME: &'static str = "saveGame";
    type Input = GameRecord;
    type Output = SavedGame;

    async fn execute(&self, record: GameRecord) -> Result<SavedGame, ActivityError> {
        info!(
            title = %record.title,
            game_type = %record.game_type,
            difficulty = %record.difficulty,
            store = self.store.name(),
            "Saving game"
        );

        match self.store.persist(&record).await {
            Ok(saved) => Ok(saved),
            Err(e) if e.is_retryable() => Err(ActivityError::retryable(e.to_string())),
            Err(e) => Err(ActivityError::non_retryable(e.to_string())),
        }
    }
}
