//! Reusable retry-with-backoff policy.
//!
//! The policy is decoupled from any specific backend: it takes an
//! operation and a predicate deciding which errors are worth retrying,
//! so every [`CompletionBackend`](crate::backend::CompletionBackend)
//! implementation shares one retry engine.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};

/// Retry policy: attempt cap plus exponential backoff bounds.
///
/// Defaults mirror the usual posture against a completion backend:
/// three attempts total, backoff starting at two seconds and capped at
/// ten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Backoff floor in seconds.
    #[serde(default = "default_min_backoff", with = "crate::config::duration_secs")]
    pub min_backoff: Duration,

    /// Backoff ceiling in seconds.
    #[serde(default = "default_max_backoff", with = "crate::config::duration_secs")]
    pub max_backoff: Duration,
}

fn default_max_attempts() -> usize {
    3
}

fn default_min_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(10)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_backoff: default_min_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl RetryPolicy {
    /// Run an operation under this policy.
    ///
    /// `retryable` classifies errors: only errors it accepts are
    /// retried, and only while attempts remain. Everything else
    /// propagates immediately.
    pub async fn run<T, E, Fut, Op, C>(&self, op: Op, retryable: C) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.min_backoff)
            .with_max_delay(self.max_backoff)
            .with_max_times(self.max_attempts.saturating_sub(1));

        op.retry(backoff)
            .when(|e| retryable(e))
            .notify(|err, delay| {
                tracing::warn!(error = %err, backoff = ?delay, "transient failure, retrying");
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_until_success() {
        let calls = AtomicUsize::new(0);
        let result: Result<&str, BackendError> = fast_policy()
            .run(
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(BackendError::Connection("refused".to_string()))
                    } else {
                        Ok("done")
                    }
                },
                BackendError::is_transient,
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), BackendError> = fast_policy()
            .run(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(BackendError::Auth)
                },
                BackendError::is_transient,
            )
            .await;

        assert!(matches!(result, Err(BackendError::Auth)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempts_exhausted_surfaces_last_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), BackendError> = fast_policy()
            .run(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(BackendError::Timeout(Duration::from_secs(1)))
                },
                BackendError::is_transient,
            )
            .await;

        assert!(matches!(result, Err(BackendError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_calls_once() {
        let calls = AtomicUsize::new(0);
        let result: Result<&str, BackendError> = fast_policy()
            .run(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("first")
                },
                BackendError::is_transient,
            )
            .await;

        assert_eq!(result.unwrap(), "first");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
