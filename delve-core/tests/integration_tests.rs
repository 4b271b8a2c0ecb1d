//! Integration tests for delve-core infrastructure

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use delve_core::{
    config_error, llm_error, not_found_error, retry_async, retry_async_if, retry_recoverable,
    validation_error, with_timeout, DelveConfig, DelveError, ErrorContext, RetryConfig,
};

#[tokio::test]
async fn test_error_handling() {
    let error = llm_error!("model overloaded", "test_component", "openai");

    match &error {
        DelveError::Llm {
            message,
            provider,
            context,
        } => {
            assert_eq!(message, "model overloaded");
            assert_eq!(provider.as_deref(), Some("openai"));
            assert_eq!(context.component, "test_component");
            assert!(!context.error_id.is_empty());
        }
        _ => panic!("Expected Llm error"),
    }

    // Should not panic
    error.log();
    assert!(error.is_recoverable());

    let network_error = DelveError::Network {
        message: "Connection failed".to_string(),
        source: None,
        context: ErrorContext::new("test"),
    };
    assert!(network_error.is_recoverable());
    assert!(network_error.retry_delay_ms().is_some());

    let config_error = config_error!("Invalid config", "test");
    assert!(!config_error.is_recoverable());
    assert!(config_error.retry_delay_ms().is_none());

    let validation = validation_error!("empty query", "query", "test");
    assert!(!validation.is_recoverable());

    let missing = not_found_error!("record 42", "test");
    assert!(missing.to_string().contains("record 42"));
}

#[tokio::test]
async fn test_retry_mechanism() {
    let attempt_count = Arc::new(AtomicUsize::new(0));

    let operation = {
        let attempt_count = Arc::clone(&attempt_count);
        move || {
            let count = attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if count < 3 {
                    Err(std::io::Error::other("Temporary failure"))
                } else {
                    Ok("Success")
                }
            }
        }
    };

    let config = RetryConfig {
        max_attempts: 5,
        initial_delay_ms: 5,
        max_delay_ms: 20,
        backoff_multiplier: 2.0,
        jitter: false,
    };

    let result = retry_async(operation, &config, "test_operation").await;
    assert_eq!(result.unwrap(), "Success");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_gives_up_after_max_attempts() {
    let attempts = AtomicUsize::new(0);

    let result: Result<(), std::io::Error> = retry_async(
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(std::io::Error::other("always down")) }
        },
        &RetryConfig::immediate(4),
        "always_failing",
    )
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_retry_stops_on_unrecoverable_error() {
    let attempts = AtomicUsize::new(0);

    let result: Result<(), DelveError> = retry_async_if(
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(config_error!("bad key", "test")) }
        },
        &RetryConfig::immediate(5),
        "unrecoverable",
        DelveError::is_recoverable,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

fn rate_limited(retry_after_ms: u64) -> DelveError {
    DelveError::RateLimit {
        message: "Too many requests".to_string(),
        retry_after_ms: Some(retry_after_ms),
        context: ErrorContext::new("test"),
    }
}

#[tokio::test]
async fn test_retry_waits_for_retry_after() {
    let attempts = AtomicUsize::new(0);
    let config = RetryConfig {
        max_attempts: 2,
        initial_delay_ms: 10,
        max_delay_ms: 1000,
        backoff_multiplier: 2.0,
        jitter: false,
    };

    let start = Instant::now();
    let result = retry_recoverable(
        || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(rate_limited(200))
                } else {
                    Ok("done")
                }
            }
        },
        &config,
        "rate_limited",
    )
    .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_retry_after_is_capped_by_max_delay() {
    let attempts = AtomicUsize::new(0);
    let config = RetryConfig {
        max_attempts: 2,
        initial_delay_ms: 1,
        max_delay_ms: 20,
        backoff_multiplier: 2.0,
        jitter: false,
    };

    let start = Instant::now();
    let result: Result<(), DelveError> = retry_recoverable(
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(rate_limited(60_000)) }
        },
        &config,
        "capped",
    )
    .await;

    assert!(matches!(result, Err(DelveError::RateLimit { .. })));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_timeout_mechanism() {
    let quick = with_timeout(async { 7 }, 100, "quick").await;
    assert_eq!(quick.unwrap(), 7);

    let slow = with_timeout(sleep(Duration::from_millis(200)), 10, "slow").await;
    match slow {
        Err(DelveError::Timeout {
            operation,
            duration_ms,
            ..
        }) => {
            assert_eq!(operation, "slow");
            assert_eq!(duration_ms, 10);
        }
        other => panic!("Expected timeout, got {:?}", other),
    }
}

#[test]
fn test_config_round_trip_and_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = DelveConfig::default();
    config.research.breadth = 3;
    config.save_to_file(&path).unwrap();

    let loaded = DelveConfig::from_file(&path).unwrap();
    assert_eq!(loaded.research.breadth, 3);
    assert_eq!(loaded.research.depth, 2);

    let mut broken = DelveConfig::default();
    broken.research.depth = 0;
    assert!(matches!(broken.validate(), Err(DelveError::Config { .. })));

    let mut unknown = DelveConfig::default();
    unknown.llm.provider = "mystery".to_string();
    assert!(unknown.validate().is_err());
}

#[test]
fn test_partial_config_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("delve.toml");
    std::fs::write(&path, "[research]\nbreadth = 6\n").unwrap();

    let config = DelveConfig::from_file(&path).unwrap();
    assert_eq!(config.research.breadth, 6);
    assert_eq!(config.research.concurrency, 2);
    assert_eq!(config.llm.provider, "openai");
}
