//! Connection Pool Sizing and Retry Timing
//!
//! The pool is the only shared mutable resource in the ingestion path. These
//! defaults size it for a single ingestion process in front of one Postgres
//! instance.

// ===== POOL SIZING =====

/// Default number of pooled database connections.
///
/// Ten connections keep per-kind inserts of a few concurrent payloads flowing
/// without exhausting a default Postgres `max_connections` of 100 when several
/// ingestion processes share a database.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Upper bound accepted by configuration validation.
pub const MAX_POOL_SIZE: usize = 64;

/// How long a caller waits for a free connection before `PoolExhausted`.
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

// ===== RETRY TIMING =====

/// Retries after the first attempt for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// First backoff delay; doubled on each further attempt.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;

/// Ceiling for a single backoff delay.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 2_000;
