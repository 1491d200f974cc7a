//! Storage Connectors for Registry and Time-Series Data
//!
//! ## Overview
//!
//! Everything that talks to a database lives here. Two paths share one
//! process-scoped connection pool:
//!
//! - **Registry writes** go through [`PgRegistryStore`], which implements the
//!   registry store seam with one upsert per resolve-or-create step.
//! - **Measurement appends** go through [`IngestionExecutor`], which owns pool
//!   checkout, backpressure and retry for parameter-bound inserts.
//!
//! ## Backpressure
//!
//! The pool is bounded. A caller waits for a free connection at most the
//! configured acquire timeout, then gets [`IngestError::PoolExhausted`]. A
//! write is never dropped silently and a caller never waits forever.
//!
//! ## Retry
//!
//! Transient failures (connection reset, server restart, serialization
//! conflicts) are retried with capped exponential backoff:
//!
//! ```text
//! retry_delay = min(base * 2^(attempt - 1), max_delay)
//! ```
//!
//! Permanent failures (constraint violations, malformed statements) surface
//! immediately. A connection that failed transiently is detached from the
//! pool rather than handed to the next caller.
//!
//! ## Backends
//!
//! | Backend | Pool manager | Use |
//! |---------|--------------|-----|
//! | Postgres / TimescaleDB | `deadpool_postgres::Manager` | production |
//! | [`MemTimeseries`] | in-process manager | tests, `--memory` runs |
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sensorsafrica_connectors::{DatabaseConfig, IngestionExecutor, RetryPolicy};
//!
//! # async fn demo(statement: sensorsafrica_schemas::InsertStatement) -> Result<(), Box<dyn std::error::Error>> {
//! let config = DatabaseConfig::default();
//! let executor = IngestionExecutor::new(
//!     config.create_pool()?,
//!     config.acquire_timeout(),
//!     RetryPolicy::default(),
//! );
//!
//! let rows = executor.execute(&statement).await?;
//! assert_eq!(rows, 1);
//! executor.close();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod executor;
pub mod mem;
pub mod migrate;
pub mod pool;
pub mod postgres;

// Re-export common types
pub use executor::{IngestionExecutor, RetryPolicy};
pub use mem::{MemConnection, MemRow, MemTimeseries};
pub use pool::{build_pool, DatabaseConfig};
pub use postgres::PgRegistryStore;

use sensorsafrica_schemas::InsertStatement;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure of one statement on one connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The connection or server hiccupped; the same statement may succeed later
    #[error("transient: {0}")]
    Transient(String),

    /// The statement itself was rejected
    #[error("permanent: {0}")]
    Permanent(String),
}

/// Ingestion failures, reported per metric kind
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("connection pool exhausted after waiting {waited:?}")]
    PoolExhausted { waited: Duration },

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("insert into {table} failed after {attempts} attempts: {last_error}")]
    Unavailable {
        table: String,
        attempts: u32,
        last_error: String,
    },

    #[error("insert into {table} rejected: {message}")]
    Persistence { table: String, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl IngestError {
    /// Whether the caller may retry the same write later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::Unavailable { .. })
    }
}

/// A pooled connection able to run one bound insert
#[async_trait::async_trait]
pub trait InsertConnection: Send {
    /// Run the statement, returning rows affected
    async fn insert(&mut self, statement: &InsertStatement) -> Result<u64, ConnectionError>;
}

/// Connection statistics for one executor
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Statements that completed
    pub executed: u64,
    /// Statements that failed after any retries
    pub failed: u64,
    /// Rows appended
    pub rows_inserted: u64,
    /// Retry attempts after transient failures
    pub retries: u64,
    /// Checkouts that gave up waiting for a connection
    pub pool_timeouts: u64,
    /// Last error message
    pub last_error: Option<String>,
}
