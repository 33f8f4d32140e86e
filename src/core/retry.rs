//! Retry and timeout options for activity calls.
//!
//! Each activity call made by a workflow carries its own options. The
//! orchestration layer, not the workflow, acts on them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-call activity options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOptions {
    /// Upper bound on a single attempt, in milliseconds
    #[serde(default = "default_start_to_close")]
    pub start_to_close_timeout_ms: u64,

    /// Retry policy for failed attempts
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_start_to_close() -> u64 {
    5 * 60 * 1000
} // 5 min

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close_timeout_ms: default_start_to_close(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ActivityOptions {
    pub fn start_to_close_timeout(&self) -> Duration {
        Duration::from_millis(self.start_to_close_timeout_ms)
    }

    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Retry policy for failed activity attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_interval")]
    pub initial_interval_ms: u64,

    /// Maximum number of attempts (including first try)
    #[serde(default = "default_maximum_attempts")]
    pub maximum_attempts: u32,

    /// Backoff multiplier (delay *= coefficient after each retry)
    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,

    /// Cap on the delay between retries; defaults to 100x the initial interval
    #[serde(default)]
    pub maximum_interval_ms: Option<u64>,
}

fn default_initial_interval() -> u64 {
    1000
}
fn default_maximum_attempts() -> u32 {
    3
}
fn default_backoff_coefficient() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval(),
            maximum_attempts: default_maximum_attempts(),
            backoff_coefficient: default_backoff_coefficient(),
            maximum_interval_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            maximum_attempts: 1,
            ..Default::default()
        }
    }

    pub fn maximum_interval(&self) -> Duration {
        let ms = self
            .maximum_interval_ms
            .unwrap_or_else(|| self.initial_interval_ms.saturating_mul(100));
        Duration::from_millis(ms)
    }

    /// Calculate the delay after a failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_interval_ms).min(self.maximum_interval());
        }

        let delay = self.initial_interval_ms as f64
            * self.backoff_coefficient.max(1.0).powi((attempt - 1) as i32);

        let capped = delay.min(self.maximum_interval().as_millis() as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if another attempt is allowed after `attempt` attempts
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.maximum_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_delays() {
        let policy = RetryPolicy {
            initial_interval_ms: 1000,
            backoff_coefficient: 2.0,
            maximum_interval_ms: Some(10000),
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(10000)); // Capped
    }

    #[test]
    fn test_default_maximum_interval() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.maximum_interval(), Duration::from_secs(100));
    }

    #[test]
    fn test_coefficient_below_one_does_not_shrink() {
        let policy = RetryPolicy {
            initial_interval_ms: 500,
            backoff_coefficient: 0.5,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        assert!(!RetryPolicy::no_retry().should_retry(1));
    }

    #[test]
    fn test_options_yaml_defaults() {
        let options: ActivityOptions = serde_yaml::from_str(
            r#"
retry:
  maximum_attempts: 5
  backoff_coefficient: 1.5
"#,
        )
        .unwrap();

        assert_eq!(options.start_to_close_timeout(), Duration::from_secs(300));
        assert_eq!(options.retry.maximum_attempts, 5);
        assert_eq!(options.retry.initial_interval_ms, 1000);
        assert_eq!(options.retry.backoff_coefficient, 1.5);
    }
}
