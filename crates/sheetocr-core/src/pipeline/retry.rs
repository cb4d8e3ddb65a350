//! Bounded exponential backoff for document acquisition.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier for each subsequent wait.
    pub backoff_factor: f64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay_ms = self.base_delay_ms as f64 * self.backoff_factor.powi((attempt - 1) as i32);
        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// `retryable` decides whether an error is worth another attempt. The last
/// error is returned when attempts run out.
pub async fn retry<T, E, F, Fut, R>(policy: &RetryPolicy, label: &str, mut op: F, retryable: R) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) && policy.should_retry(attempt) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "{} failed, will retry: {}",
                    label,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            ..Default::default()
        }
    }

    #[test]
    fn exponential_backoff_grows() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4_000));
    }

    #[test]
    fn respects_max_delay() {
        let policy = RetryPolicy {
            max_delay_ms: 5_000,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(10), Duration::from_millis(5_000));
    }

    #[test]
    fn exhaustion_after_max_attempts() {
        let policy = fast(2);
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::none().should_retry(1));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry(
            &fast(3),
            "fetch",
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { if attempt < 3 { Err("flaky".to_string()) } else { Ok(attempt) } }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry(
            &fast(5),
            "fetch",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("not found".to_string()) }
            },
            |e| e != "not found",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_with_last_error() {
        let result: Result<(), String> = retry(
            &fast(2),
            "fetch",
            |attempt| async move { Err(format!("attempt {attempt}")) },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("attempt 2".to_string()));
    }
}
