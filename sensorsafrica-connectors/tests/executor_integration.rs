//! Integration tests for the ingestion executor
//!
//! Backpressure, bounded retry, per-statement independence and
//! cancellation, driven through a scripted pool manager.

mod common;

use std::time::{Duration, Instant};

use sensorsafrica_connectors::{IngestError, RetryPolicy};

use common::{executor, fast_retry, statement, Outcome, Script};

#[tokio::test]
async fn saturated_pool_yields_pool_exhausted() {
    let script = Script::new();
    let executor = executor(&script, 1, Duration::from_millis(50), RetryPolicy::none());
    let held = executor.pool().get().await.unwrap();

    let started = Instant::now();
    let result = executor.execute(&statement("sensor_PM_data")).await;

    assert_eq!(
        result,
        Err(IngestError::PoolExhausted {
            waited: Duration::from_millis(50)
        })
    );
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(result.unwrap_err().is_retryable());
    assert_eq!(executor.stats().pool_timeouts, 1);
    assert_eq!(script.attempts(), 0);

    drop(held);
    assert_eq!(executor.execute(&statement("sensor_PM_data")).await, Ok(1));
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let script = Script::new().times(Outcome::Transient, 2);
    let executor = executor(&script, 2, Duration::from_secs(1), fast_retry(3));

    assert_eq!(executor.execute(&statement("sensor_PM_data")).await, Ok(1));

    let stats = executor.stats();
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.executed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(script.attempts(), 3);
    // Connections that failed transiently are discarded, not reused
    assert_eq!(script.created(), 3);
}

#[tokio::test]
async fn retries_are_bounded() {
    let script = Script::new().times(Outcome::Transient, 10);
    let executor = executor(&script, 2, Duration::from_secs(1), fast_retry(2));

    let result = executor.execute(&statement("sensor_PM_data")).await;

    assert!(matches!(
        result,
        Err(IngestError::Unavailable { attempts: 3, ref table, .. }) if table == "sensor_PM_data"
    ));
    assert_eq!(script.attempts(), 3);
    assert_eq!(executor.stats().failed, 1);
    assert!(executor.stats().last_error.is_some());
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let script = Script::new().then(Outcome::Permanent);
    let executor = executor(&script, 2, Duration::from_secs(1), fast_retry(3));

    let result = executor.execute(&statement("sensor_PM_data")).await;

    assert!(matches!(result, Err(IngestError::Persistence { .. })));
    assert!(!result.unwrap_err().is_retryable());
    assert_eq!(script.attempts(), 1);
    assert_eq!(executor.stats().retries, 0);
}

#[tokio::test]
async fn refused_connection_is_retried() {
    let script = Script::new().refuse_connections(1);
    let executor = executor(&script, 1, Duration::from_secs(1), fast_retry(2));

    assert_eq!(executor.execute(&statement("sensor_PM_data")).await, Ok(1));
    assert_eq!(executor.stats().retries, 1);
}

#[tokio::test]
async fn statements_fail_independently() {
    let script = Script::new().reject_table("sensor_temp_humidity_data");
    let executor = executor(&script, 2, Duration::from_secs(1), fast_retry(1));

    let results = executor
        .execute_all(&[statement("sensor_PM_data"), statement("sensor_temp_humidity_data")])
        .await;

    assert_eq!(results[0], Ok(1));
    assert!(matches!(
        &results[1],
        Err(IngestError::Persistence { table, .. }) if table == "sensor_temp_humidity_data"
    ));
}

#[tokio::test]
async fn cancelled_wait_does_not_leak() {
    let script = Script::new();
    let executor = executor(&script, 1, Duration::from_secs(5), RetryPolicy::none());
    let held = executor.pool().get().await.unwrap();

    let pm = statement("sensor_PM_data");
    let abandoned = tokio::time::timeout(Duration::from_millis(20), executor.execute(&pm)).await;
    assert!(abandoned.is_err());

    drop(held);
    assert_eq!(executor.execute(&statement("sensor_PM_data")).await, Ok(1));
    assert_eq!(executor.status().waiting, 0);
    assert_eq!(script.created(), 1);
}

#[tokio::test]
async fn cancelled_insert_returns_connection() {
    let script = Script::new().then(Outcome::Slow(Duration::from_millis(500)));
    let executor = executor(&script, 1, Duration::from_millis(200), RetryPolicy::none());

    let pm = statement("sensor_PM_data");
    let abandoned = tokio::time::timeout(Duration::from_millis(20), executor.execute(&pm)).await;
    assert!(abandoned.is_err());

    // The single connection went back to the pool; otherwise this would time out
    assert_eq!(executor.execute(&statement("sensor_PM_data")).await, Ok(1));
    assert_eq!(script.created(), 1);
}

#[tokio::test]
async fn closed_executor_refuses_work() {
    let script = Script::new();
    let executor = executor(&script, 1, Duration::from_secs(1), RetryPolicy::none());

    executor.close();

    assert!(executor.is_closed());
    assert_eq!(
        executor.execute(&statement("sensor_PM_data")).await,
        Err(IngestError::PoolClosed)
    );
}
