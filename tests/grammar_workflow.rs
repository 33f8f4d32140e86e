//! Grammar Workflow Integration Tests
//!
//! Runs generateGrammarWorkflow end to end on a worker backed by an
//! in-memory store, a scripted provider and an in-memory game store.

mod common;

use std::time::Duration;

use hablaflow::core::{ClientError, ExecutionStore, WorkflowClient};
use hablaflow::domain::{EventType, ExecutionStatus, FailureKind, GameType};
use serde_json::json;

use common::*;

#[tokio::test]
async fn test_successful_grammar_generation() {
    let store = ExecutionStore::open_in_memory().unwrap();
    let client = WorkflowClient::new(store.clone());
    let provider = ScriptedProvider::returning(ser_estar_content());
    let games = MemoryGameStore::with_fixed_id("game-123");
    let worker = worker(&store, provider.clone(), games.clone(), &fast_options());

    let id = client
        .start(
            "generateGrammarWorkflow",
            TASK_QUEUE,
            grammar_input("ser vs estar", 5),
        )
        .await
        .unwrap();

    let execution = worker.poll_once().await.unwrap().unwrap();
    assert_eq!(execution.id, id);
    assert_eq!(execution.status, ExecutionStatus::Completed);

    let result = client.result(&id, Duration::ZERO).await.unwrap();
    assert_eq!(result, json!({ "gameId": "game-123" }));

    assert_eq!(provider.calls(), 1);
    assert_eq!(games.calls(), 1);

    let record = &games.records()[0];
    assert_eq!(record.game_type, GameType::Grammar);
    assert_eq!(record.title, "ser vs estar Grammar");
    assert_eq!(record.description, "Practice ser vs estar in Mexican Spanish");
    assert_eq!(record.idempotency_key, format!("{}:saveGame:2", id));
    assert_eq!(record.content.questions().map(Vec::len), Some(5));
}

#[tokio::test]
async fn test_validation_failure_never_saves() {
    let store = ExecutionStore::open_in_memory().unwrap();
    let client = WorkflowClient::new(store.clone());
    let provider = ScriptedProvider::returning(json!({
        "questions": [grammar_question("Yo ___ estudiante.", ["es", "está", "son", "están"], "soy")]
    }));
    let games = MemoryGameStore::new();
    let worker = worker(&store, provider, games.clone(), &fast_options());

    let id = client
        .start(
            "generateGrammarWorkflow",
            TASK_QUEUE,
            grammar_input("ser vs estar", 1),
        )
        .await
        .unwrap();

    let execution = worker.poll_once().await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.failure_kind, Some(FailureKind::Application));
    assert_eq!(
        execution.failure_reason.as_deref(),
        Some("Validation failed: question 1: correct_answer not in options")
    );
    assert_eq!(games.calls(), 0);

    match client.result(&id, Duration::ZERO).await {
        Err(ClientError::ExecutionFailed { reason, kind, .. }) => {
            assert_eq!(kind, FailureKind::Application);
            assert_eq!(
                reason,
                "Validation failed: question 1: correct_answer not in options"
            );
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_validation_reports_every_error_in_order() {
    let store = ExecutionStore::open_in_memory().unwrap();
    let client = WorkflowClient::new(store.clone());
    let provider = ScriptedProvider::returning(json!({
        "questions": [
            { "sentence": "Yo ___ aquí.", "options": ["estoy"], "correct_answer": "estoy", "explanation": "x" },
            { "blank_position": 0, "options": ["a", "b"], "correct_answer": "a", "explanation": "x" }
        ]
    }));
    let games = MemoryGameStore::new();
    let worker = worker(&store, provider, games.clone(), &fast_options());

    client
        .start(
            "generateGrammarWorkflow",
            TASK_QUEUE,
            grammar_input("estar", 3),
        )
        .await
        .unwrap();

    let execution = worker.poll_once().await.unwrap().unwrap();
    assert_eq!(
        execution.failure_reason.as_deref(),
        Some(
            "Validation failed: question 1: missing blank_position, \
             question 1: must have at least 2 options, \
             question 2: missing or invalid sentence, \
             expected 3 questions, got 2"
        )
    );
    assert_eq!(games.calls(), 0);
}

#[tokio::test]
async fn test_retry_budget_is_exactly_three_attempts() {
    let store = ExecutionStore::open_in_memory().unwrap();
    let client = WorkflowClient::new(store.clone());
    let provider = ScriptedProvider::new(|_| Scripted::Fail(server_error()));
    let games = MemoryGameStore::new();
    let worker = worker(&store, provider.clone(), games.clone(), &fast_options());

    let id = client
        .start(
            "generateGrammarWorkflow",
            TASK_QUEUE,
            grammar_input("ser vs estar", 5),
        )
        .await
        .unwrap();

    let execution = worker.poll_once().await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.failure_kind, Some(FailureKind::ActivityFailed));
    assert_eq!(provider.calls(), 3);
    assert_eq!(games.calls(), 0);

    let reason = execution.failure_reason.unwrap();
    assert!(reason.starts_with("Activity 'generateStructuredContent' failed after 3 attempt(s)"));
    assert!(reason.contains("502 Bad Gateway"));

    let history = client.history(&id).await.unwrap();
    let count = |t: EventType| history.iter().filter(|e| e.event_type == t).count();
    assert_eq!(count(EventType::ActivityStarted), 3);
    assert_eq!(count(EventType::ActivityRetrying), 2);
    assert_eq!(count(EventType::ActivityFailed), 1);
    assert_eq!(count(EventType::ExecutionFailed), 1);
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let store = ExecutionStore::open_in_memory().unwrap();
    let client = WorkflowClient::new(store.clone());
    let provider = ScriptedProvider::new(|call| {
        if call < 3 {
            Scripted::Fail(server_error())
        } else {
            Scripted::Json(ser_estar_content())
        }
    });
    let games = MemoryGameStore::with_fixed_id("game-123");
    let worker = worker(&store, provider.clone(), games, &fast_options());

    let id = client
        .start(
            "generateGrammarWorkflow",
            TASK_QUEUE,
            grammar_input("ser vs estar", 5),
        )
        .await
        .unwrap();

    worker.poll_once().await.unwrap();
    assert_eq!(provider.calls(), 3);
    assert_eq!(
        client.result(&id, Duration::ZERO).await.unwrap(),
        json!({ "gameId": "game-123" })
    );
}

#[tokio::test]
async fn test_attempt_timeout_consumes_a_retry() {
    let store = ExecutionStore::open_in_memory().unwrap();
    let client = WorkflowClient::new(store.clone());
    let provider = ScriptedProvider::new(|call| {
        if call == 1 {
            Scripted::Delay(Duration::from_secs(5), ser_estar_content())
        } else {
            Scripted::Json(ser_estar_content())
        }
    });
    let games = MemoryGameStore::new();
    let options = fast_options().with_start_to_close_timeout(Duration::from_millis(100));
    let worker = worker(&store, provider.clone(), games, &options);

    let id = client
        .start(
            "generateGrammarWorkflow",
            TASK_QUEUE,
            grammar_input("ser vs estar", 5),
        )
        .await
        .unwrap();

    let execution = worker.poll_once().await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(provider.calls(), 2);

    let history = client.history(&id).await.unwrap();
    let timed_out: Vec<_> = history
        .iter()
        .filter(|e| e.event_type == EventType::ActivityTimedOut)
        .collect();
    assert_eq!(timed_out.len(), 1);
    assert_eq!(timed_out[0].attempt, Some(1));
}

#[tokio::test]
async fn test_attempt_timeouts_exhaust_retries() {
    let store = ExecutionStore::open_in_memory().unwrap();
    let client = WorkflowClient::new(store.clone());
    let provider =
        ScriptedProvider::new(|_| Scripted::Delay(Duration::from_secs(5), ser_estar_content()));
    let games = MemoryGameStore::new();
    let options = fast_options().with_start_to_close_timeout(Duration::from_millis(50));
    let worker = worker(&store, provider.clone(), games, &options);

    client
        .start(
            "generateGrammarWorkflow",
            TASK_QUEUE,
            grammar_input("ser vs estar", 5),
        )
        .await
        .unwrap();

    let execution = worker.poll_once().await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.failure_kind, Some(FailureKind::ActivityTimeout));
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_non_retryable_failure_stops_immediately() {
    let store = ExecutionStore::open_in_memory().unwrap();
    let client = WorkflowClient::new(store.clone());
    let provider = ScriptedProvider::new(|_| Scripted::Fail(auth_error()));
    let games = MemoryGameStore::new();
    let worker = worker(&store, provider.clone(), games, &fast_options());

    client
        .start(
            "generateGrammarWorkflow",
            TASK_QUEUE,
            grammar_input("ser vs estar", 5),
        )
        .await
        .unwrap();

    let execution = worker.poll_once().await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.failure_kind, Some(FailureKind::ActivityNonRetryable));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_invalid_request_fails_before_generation() {
    let store = ExecutionStore::open_in_memory().unwrap();
    let client = WorkflowClient::new(store.clone());
    let provider = ScriptedProvider::returning(ser_estar_content());
    let worker = worker(&store, provider.clone(), MemoryGameStore::new(), &fast_options());

    client
        .start(
            "generateGrammarWorkflow",
            TASK_QUEUE,
            grammar_input("ser vs estar", 0),
        )
        .await
        .unwrap();

    let execution = worker.poll_once().await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(
        execution.failure_reason.as_deref(),
        Some("Invalid request: questionCount must be greater than 0")
    );
    assert_eq!(provider.calls(), 0);

    // Malformed input never reaches the workflow body
    client
        .start(
            "generateGrammarWorkflow",
            TASK_QUEUE,
            json!({ "topic": "ser vs estar", "difficulty": "expert", "questionCount": 5 }),
        )
        .await
        .unwrap();

    let execution = worker.poll_once().await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.failure_kind, Some(FailureKind::Application));
    assert!(execution
        .failure_reason
        .unwrap()
        .starts_with("Invalid input for workflow 'generateGrammarWorkflow'"));
}
