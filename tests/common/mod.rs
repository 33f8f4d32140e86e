//! Shared fixtures for integration tests: scripted provider, in-memory
//! game store, and a worker wired to both.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use hablaflow::activities;
use hablaflow::adapters::{ContentProvider, GameStore, GameStoreError, ProviderError};
use hablaflow::core::{ActivityOptions, ExecutionStore, RetryPolicy, Worker, WorkerOptions};
use hablaflow::domain::{GameRecord, SavedGame};
use hablaflow::workflows;

pub const TASK_QUEUE: &str = "content-generation";

/// What the provider does on a given call
pub enum Scripted {
    Json(Value),
    Fail(ProviderError),
    Delay(Duration, Value),
}

/// Provider whose behaviour is a function of the call number (1-based)
pub struct ScriptedProvider {
    script: Box<dyn Fn(u32) -> Scripted + Send + Sync>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(script: impl Fn(u32) -> Scripted + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicU32::new(0),
        })
    }

    pub fn returning(content: Value) -> Arc<Self> {
        Self::new(move |_| Scripted::Json(content.clone()))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        _system_prompt: &str,
        _prompt: &str,
        _schema: Option<&Value>,
    ) -> Result<Value, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match (self.script)(call) {
            Scripted::Json(value) => Ok(value),
            Scripted::Fail(error) => Err(error),
            Scripted::Delay(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
        }
    }
}

pub fn server_error() -> ProviderError {
    ProviderError::Server {
        provider: "OpenAI".to_string(),
        message: "502 Bad Gateway".to_string(),
    }
}

pub fn auth_error() -> ProviderError {
    ProviderError::Auth {
        provider: "OpenAI".to_string(),
        message: "401 Unauthorized".to_string(),
    }
}

/// Game store keeping rows in memory, idempotent on the record key
pub struct MemoryGameStore {
    ids: Mutex<HashMap<String, String>>,
    records: Mutex<Vec<GameRecord>>,
    next_id: Mutex<Box<dyn FnMut() -> String + Send>>,
    calls: AtomicU32,
}

impl MemoryGameStore {
    pub fn new() -> Arc<Self> {
        let mut counter = 0;
        Self::with_ids(move || {
            counter += 1;
            format!("game-{}", counter)
        })
    }

    /// Every new row gets `id`
    pub fn with_fixed_id(id: &str) -> Arc<Self> {
        let id = id.to_string();
        Self::with_ids(move || id.clone())
    }

    fn with_ids(next_id: impl FnMut() -> String + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            ids: Mutex::new(HashMap::new()),
            records: Mutex::new(Vec::new()),
            next_id: Mutex::new(Box::new(next_id)),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<GameRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl GameStore for MemoryGameStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn persist(&self, record: &GameRecord) -> Result<SavedGame, GameStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut ids = self.ids.lock().unwrap();
        if let Some(id) = ids.get(&record.idempotency_key) {
            return Ok(SavedGame { id: id.clone() });
        }

        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            next_id()
        };
        ids.insert(record.idempotency_key.clone(), id.clone());
        self.records.lock().unwrap().push(record.clone());
        Ok(SavedGame { id })
    }
}

/// Activity options with short intervals for tests
pub fn fast_options() -> ActivityOptions {
    ActivityOptions::default()
        .with_start_to_close_timeout(Duration::from_secs(5))
        .with_retry(RetryPolicy {
            initial_interval_ms: 10,
            maximum_attempts: 3,
            backoff_coefficient: 2.0,
            maximum_interval_ms: None,
        })
}

pub fn worker(
    store: &ExecutionStore,
    provider: Arc<dyn ContentProvider>,
    games: Arc<dyn GameStore>,
    options: &ActivityOptions,
) -> Worker {
    let worker_options = WorkerOptions::new(TASK_QUEUE)
        .with_poll_interval(Duration::from_millis(10))
        .with_identity("test-worker");

    Worker::builder(store.clone(), worker_options)
        .activities(activities::registry(provider, games))
        .workflows(workflows::registry(options))
        .build()
        .unwrap()
}

pub fn grammar_question(sentence: &str, options: [&str; 4], answer: &str) -> Value {
    json!({
        "sentence": sentence,
        "blank_position": 1,
        "options": options,
        "correct_answer": answer,
        "explanation": "Ser describes identity; estar describes state or location."
    })
}

/// Five well-formed ser/estar questions
pub fn ser_estar_content() -> Value {
    json!({
        "questions": [
            grammar_question("Yo ___ estudiante.", ["soy", "estoy", "es", "está"], "soy"),
            grammar_question("Ella ___ cansada.", ["es", "está", "soy", "estoy"], "está"),
            grammar_question("Nosotros ___ en la Ciudad de México.", ["somos", "estamos", "son", "están"], "estamos"),
            grammar_question("Ustedes ___ muy amables.", ["son", "están", "somos", "estamos"], "son"),
            grammar_question("El café ___ caliente.", ["es", "está", "son", "están"], "está"),
        ]
    })
}

pub fn grammar_input(topic: &str, count: u32) -> Value {
    json!({ "topic": topic, "difficulty": "beginner", "questionCount": count })
}
