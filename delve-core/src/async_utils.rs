//! Async utilities and patterns
//!
//! Retry with exponential backoff, timeouts, and bounded ordered concurrency.

use crate::error::{DelveError, DelveResult, ErrorContext};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: usize,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier (exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration that never sleeps between attempts
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    fn jittered(&self, delay_ms: u64) -> u64 {
        if !self.jitter || delay_ms == 0 {
            return delay_ms;
        }
        let jitter_factor = 0.1;
        let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_factor;
        ((delay_ms as f64) * (1.0 + jitter)) as u64
    }

    fn delay_with_hint(&self, backoff_ms: u64, hint_ms: Option<u64>) -> u64 {
        match hint_ms {
            Some(hint) => backoff_ms.max(hint).min(self.max_delay_ms),
            None => backoff_ms,
        }
    }

    fn next_delay(&self, delay_ms: u64) -> u64 {
        (((delay_ms as f64) * self.backoff_multiplier) as u64).min(self.max_delay_ms)
    }
}

/// Retry an async operation with exponential backoff
pub async fn retry_async<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_async_if(operation, config, operation_name, |_| true).await
}

/// Retry an async operation while `should_retry` accepts the error
pub async fn retry_async_if<F, Fut, T, E, P>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    retry_async_with_hint(operation, config, operation_name, should_retry, |_| None).await
}

/// Retry recoverable [`DelveError`]s, waiting at least as long as the error
/// asks for (a server's Retry-After, for example)
pub async fn retry_recoverable<F, Fut, T>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> DelveResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DelveResult<T>>,
{
    retry_async_with_hint(
        operation,
        config,
        operation_name,
        DelveError::is_recoverable,
        DelveError::retry_delay_ms,
    )
    .await
}

/// Retry like [`retry_async_if`], but never sleep less than `delay_hint`
/// reports for the failed attempt. The result is still capped by
/// `max_delay_ms`.
pub async fn retry_async_with_hint<F, Fut, T, E, P, H>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    delay_hint: H,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
    H: Fn(&E) -> Option<u64>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut delay = config.initial_delay_ms;

    loop {
        attempt += 1;

        debug!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = max_attempts,
            "Attempting operation"
        );

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if attempt >= max_attempts || !should_retry(&error) {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %error,
                        "Operation failed, giving up"
                    );
                    return Err(error);
                }

                let actual_delay =
                    config.delay_with_hint(config.jittered(delay), delay_hint(&error));
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %error,
                    delay_ms = actual_delay,
                    "Operation failed, retrying"
                );

                if actual_delay > 0 {
                    sleep(Duration::from_millis(actual_delay)).await;
                }
                delay = config.next_delay(delay);
            }
        }
    }
}

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(future: F, timeout_ms: u64, operation_name: &str) -> DelveResult<T>
where
    F: Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(DelveError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_metadata("timeout_ms", &timeout_ms.to_string())
                .with_suggestion("Increase timeout duration")
                .with_suggestion("Verify service availability"),
        }),
    }
}

/// Run `processor` over `items` with at most `max_concurrent` futures in
/// flight. Results come back in input order regardless of completion order,
/// and every future has finished when this returns.
pub async fn process_concurrently<T, R, F, Fut>(
    items: Vec<T>,
    max_concurrent: usize,
    processor: F,
) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items)
        .map(processor)
        .buffered(max_concurrent.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 3000,
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(config.next_delay(1000), 2000);
        assert_eq!(config.next_delay(2000), 3000);
        assert_eq!(config.jittered(1500), 1500);
    }

    #[test]
    fn test_delay_hint_raises_backoff_up_to_cap() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 3000,
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(config.delay_with_hint(100, None), 100);
        assert_eq!(config.delay_with_hint(100, Some(50)), 100);
        assert_eq!(config.delay_with_hint(100, Some(1200)), 1200);
        assert_eq!(config.delay_with_hint(100, Some(60_000)), 3000);
        assert_eq!(RetryConfig::immediate(3).delay_with_hint(0, Some(5000)), 0);
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let results = process_concurrently(vec![30u64, 1, 10], 3, |ms| async move {
            sleep(Duration::from_millis(ms)).await;
            ms
        })
        .await;
        assert_eq!(results, vec![30, 1, 10]);
    }
}
