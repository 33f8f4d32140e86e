//! Activity definitions and registration.
//!
//! An activity is a named unit of (possibly impure) work. Workflows never
//! call activities directly; they go through an `ActivityProxy`, which
//! looks the activity up in the worker's registry by name and applies the
//! caller's timeout and retry policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Failure reported by a single activity attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    /// Transient failure; the invocation may be retried per policy
    #[error("{0}")]
    Retryable(String),

    /// Permanent failure; no further attempts are made
    #[error("{0}")]
    NonRetryable(String),

    /// The attempt exceeded its start-to-close timeout
    #[error("Activity timed out after {0:?}")]
    Timeout(Duration),
}

impl ActivityError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable(message.into())
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::NonRetryable(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NonRetryable(_))
    }
}

/// A named unit of work callable from workflows.
///
/// Inputs and outputs cross the orchestration boundary as JSON, so both
/// must round-trip through serde.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Registered activity name
    const NAME: &'static str;

    type Input: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Send + 'static;

    async fn execute(&self, input: Self::Input) -> Result<Self::Output, ActivityError>;
}

/// Object-safe view of an activity over JSON values
#[async_trait]
pub(crate) trait ErasedActivity: Send + Sync {
    async fn invoke(&self, input: serde_json::Value) -> Result<serde_json::Value, ActivityError>;
}

#[async_trait]
impl<A> ErasedActivity for A
where
    A: Activity + 'static,
{
    async fn invoke(&self, input: serde_json::Value) -> Result<serde_json::Value, ActivityError> {
        let input: A::Input = serde_json::from_value(input).map_err(|e| {
            ActivityError::non_retryable(format!("Invalid input for activity '{}': {}", A::NAME, e))
        })?;

        let output = self.execute(input).await?;

        serde_json::to_value(output).map_err(|e| {
            ActivityError::non_retryable(format!(
                "Failed to serialize output of activity '{}': {}",
                A::NAME,
                e
            ))
        })
    }
}

/// Activities a worker can execute, keyed by name
#[derive(Default, Clone)]
pub struct ActivityRegistry {
    activities: HashMap<&'static str, Arc<dyn ErasedActivity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity under its `NAME` (replaces any previous one)
    pub fn register<A>(&mut self, activity: A)
    where
        A: Activity + 'static,
    {
        self.activities.insert(A::NAME, Arc::new(activity));
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn ErasedActivity>> {
        self.activities.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.activities.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Activity for Echo {
        const NAME: &'static str = "echo";
        type Input = String;
        type Output = String;

        async fn execute(&self, input: String) -> Result<String, ActivityError> {
            Ok(input)
        }
    }

    #[tokio::test]
    async fn test_registry_invokes_by_name() {
        let mut registry = ActivityRegistry::new();
        registry.register(Echo);

        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["echo"]);

        let activity = registry.get("echo").unwrap();
        let output = activity.invoke(serde_json::json!("hola")).await.unwrap();
        assert_eq!(output, serde_json::json!("hola"));
    }

    #[tokio::test]
    async fn test_invalid_input_is_non_retryable() {
        let mut registry = ActivityRegistry::new();
        registry.register(Echo);

        let err = registry
            .get("echo")
            .unwrap()
            .invoke(serde_json::json!({ "not": "a string" }))
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Invalid input for activity 'echo'"));
    }

    #[test]
    fn test_error_classification() {
        assert!(ActivityError::retryable("rate limited").is_retryable());
        assert!(ActivityError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!ActivityError::non_retryable("bad request").is_retryable());
    }
}
