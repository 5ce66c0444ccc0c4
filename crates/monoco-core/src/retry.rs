//! Retry utilities with exponential backoff.
//!
//! Used for watcher restarts and other transient-failure loops.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Maximum number of retry attempts (0 = only the initial attempt).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the exponential growth.
    pub max_delay: Duration,
    /// Multiplier applied per attempt (typically 2.0).
    pub factor: f64,
}

impl BackoffConfig {
    /// Create a new backoff schedule.
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration, factor: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            factor,
        }
    }

    /// Schedule for restarting a failed filesystem watcher: 1, 2, 4, 8 ...
    /// seconds, capped at 30 s, retrying indefinitely.
    #[must_use]
    pub fn watcher_restart() -> Self {
        Self {
            max_attempts: u32::MAX,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
        }
    }

    /// Delay for a given attempt number (0-indexed; attempt 0 is immediate).
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.factor.powi(exponent);
        let capped = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Whether another attempt is allowed after `current_attempt` failures.
    #[must_use]
    pub fn should_retry(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(100), Duration::from_secs(10), 2.0)
    }
}

/// Result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded.
    Success(T),
    /// All attempts failed.
    Exhausted {
        /// The final error.
        error: E,
        /// Total attempts made.
        attempts: u32,
    },
}

impl<T, E> RetryOutcome<T, E> {
    /// Whether the operation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert to a `Result`, discarding the attempt count.
    #[allow(clippy::missing_errors_doc)]
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Exhausted { error, .. } => Err(error),
        }
    }
}

/// Execute an async operation with exponential backoff.
///
/// The `should_retry` predicate inspects the error; return `false` to abort
/// early on non-retryable failures.
pub async fn retry<T, E, Fut, F, P>(
    config: &BackoffConfig,
    mut operation: F,
    should_retry: P,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => return RetryOutcome::Success(value),
            Err(error) => {
                if !config.should_retry(attempt) || !should_retry(&error) {
                    return RetryOutcome::Exhausted {
                        error,
                        attempts: attempt.saturating_add(1),
                    };
                }
                attempt = attempt.saturating_add(1);
                tokio::time::sleep(config.delay_for_attempt(attempt)).await;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_and_caps() {
        let config = BackoffConfig::watcher_restart();

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn test_should_retry_bounds() {
        let config = BackoffConfig::new(2, Duration::from_millis(1), Duration::from_secs(1), 2.0);
        assert!(config.should_retry(0));
        assert!(config.should_retry(1));
        assert!(!config.should_retry(2));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_failures() {
        let config = BackoffConfig::new(5, Duration::from_millis(1), Duration::from_millis(5), 2.0);
        let outcome = retry(
            &config,
            |attempt| async move {
                if attempt < 2 { Err("transient") } else { Ok("ok") }
            },
            |_| true,
        )
        .await;
        assert_eq!(outcome, RetryOutcome::Success("ok"));
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let config = BackoffConfig::new(1, Duration::from_millis(1), Duration::from_millis(5), 2.0);
        let outcome = retry(&config, |_| async { Err::<(), _>("down") }, |_| true).await;
        assert!(matches!(
            outcome,
            RetryOutcome::Exhausted {
                error: "down",
                attempts: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_retry_aborts_on_non_retryable() {
        let config = BackoffConfig::default();
        let outcome = retry(&config, |_| async { Err::<(), _>("fatal") }, |_| false).await;
        assert!(matches!(
            outcome,
            RetryOutcome::Exhausted {
                error: "fatal",
                attempts: 1
            }
        ));
    }
}
