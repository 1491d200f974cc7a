//! Ingestion Executor
//!
//! Runs parameter-bound inserts through a bounded pool. One call appends one
//! row; kinds of the same payload run as independent calls and may fail
//! independently.
//!
//! ## Cancellation
//!
//! Dropping an `execute` future at any await point is safe. A pending
//! checkout is abandoned without taking a slot, and a checked-out connection
//! goes back to the pool when its guard drops.

use deadpool::managed::{Manager, Object, Pool, PoolError, Status, TimeoutType, Timeouts};
use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sensorsafrica_core::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS,
};
use sensorsafrica_schemas::InsertStatement;

use crate::{ConnectionError, ConnectionStats, IngestError, InsertConnection};

/// Bounded exponential backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retry
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Cap on any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Why a single attempt failed
enum Attempt {
    Transient(String),
    Fatal(IngestError),
}

/// Executes inserts through a pool of `M` connections
pub struct IngestionExecutor<M: Manager> {
    pool: Pool<M>,
    timeouts: Timeouts,
    acquire_timeout: Duration,
    retry: RetryPolicy,
    stats: Arc<Mutex<ConnectionStats>>,
}

impl<M> IngestionExecutor<M>
where
    M: Manager,
    M::Type: InsertConnection,
    M::Error: Display,
{
    /// Executor over an already built pool
    pub fn new(pool: Pool<M>, acquire_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            pool,
            timeouts: Timeouts {
                wait: Some(acquire_timeout),
                create: Some(acquire_timeout),
                recycle: Some(acquire_timeout),
            },
            acquire_timeout,
            retry,
            stats: Arc::new(Mutex::new(ConnectionStats::default())),
        }
    }

    /// Append one row, retrying transient failures.
    ///
    /// Returns rows affected. `PoolExhausted` is returned without retrying:
    /// it tells the caller to back off.
    pub async fn execute(&self, statement: &InsertStatement) -> Result<u64, IngestError> {
        let mut retries = 0;

        loop {
            match self.attempt(statement).await {
                Ok(rows) => {
                    self.record(|stats| {
                        stats.executed += 1;
                        stats.rows_inserted += rows;
                    });
                    debug!("inserted {} row(s) into {}", rows, statement.table);
                    return Ok(rows);
                }
                Err(Attempt::Transient(message)) if retries < self.retry.max_retries => {
                    retries += 1;
                    let delay = self.retry.delay(retries);
                    warn!(
                        "transient failure inserting into {} (retry {}/{} in {:?}): {}",
                        statement.table, retries, self.retry.max_retries, delay, message
                    );
                    self.record(|stats| stats.retries += 1);
                    tokio::time::sleep(delay).await;
                }
                Err(Attempt::Transient(message)) => {
                    return Err(self.failed(IngestError::Unavailable {
                        table: statement.table.clone(),
                        attempts: retries + 1,
                        last_error: message,
                    }));
                }
                Err(Attempt::Fatal(error)) => return Err(self.failed(error)),
            }
        }
    }

    /// Run independent inserts concurrently, one result per statement in order
    pub async fn execute_all(
        &self,
        statements: &[InsertStatement],
    ) -> Vec<Result<u64, IngestError>> {
        join_all(statements.iter().map(|s| self.execute(s))).await
    }

    async fn attempt(&self, statement: &InsertStatement) -> Result<u64, Attempt> {
        let mut conn = self.checkout().await?;

        match conn.insert(statement).await {
            Ok(rows) => Ok(rows),
            Err(ConnectionError::Transient(message)) => {
                // Never hand a possibly broken connection to the next caller
                drop(Object::take(conn));
                Err(Attempt::Transient(message))
            }
            Err(ConnectionError::Permanent(message)) => {
                Err(Attempt::Fatal(IngestError::Persistence {
                    table: statement.table.clone(),
                    message,
                }))
            }
        }
    }

    async fn checkout(&self) -> Result<Object<M>, Attempt> {
        match self.pool.timeout_get(&self.timeouts).await {
            Ok(conn) => Ok(conn),
            Err(PoolError::Timeout(TimeoutType::Wait)) => {
                warn!(
                    "connection pool exhausted, gave up after {:?} ({:?})",
                    self.acquire_timeout,
                    self.pool.status()
                );
                self.record(|stats| stats.pool_timeouts += 1);
                Err(Attempt::Fatal(IngestError::PoolExhausted {
                    waited: self.acquire_timeout,
                }))
            }
            Err(PoolError::Closed) => Err(Attempt::Fatal(IngestError::PoolClosed)),
            Err(PoolError::NoRuntimeSpecified) => Err(Attempt::Fatal(IngestError::Configuration(
                "pool was built without an async runtime".to_string(),
            ))),
            Err(other) => Err(Attempt::Transient(other.to_string())),
        }
    }

    fn failed(&self, error: IngestError) -> IngestError {
        self.record(|stats| {
            stats.failed += 1;
            stats.last_error = Some(error.to_string());
        });
        error
    }

    fn record(&self, update: impl FnOnce(&mut ConnectionStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut stats);
    }

    /// Snapshot of the statistics
    pub fn stats(&self) -> ConnectionStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Current pool occupancy
    pub fn status(&self) -> Status {
        self.pool.status()
    }

    /// The pool this executor draws from
    pub fn pool(&self) -> &Pool<M> {
        &self.pool
    }

    /// Stop handing out connections and drop idle ones.
    ///
    /// Checkouts in flight finish normally; later calls fail with `PoolClosed`.
    pub fn close(&self) {
        self.pool.close();
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
