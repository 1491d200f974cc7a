//! Connection pool construction
//!
//! Pools are built once at startup and injected into the executor and the
//! registry store; nothing reaches for a global pool.

use deadpool::managed::{Manager, Pool, Timeouts};
use deadpool::Runtime;
use deadpool_postgres::{Config, ManagerConfig, PoolConfig, RecyclingMethod};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_postgres::NoTls;

use sensorsafrica_core::constants::{DEFAULT_ACQUIRE_TIMEOUT_MS, DEFAULT_POOL_SIZE, MAX_POOL_SIZE};

use crate::IngestError;

/// Database connection pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub pool_max_size: usize,
    /// How long a checkout may wait for a free connection
    pub acquire_timeout_ms: u64,
    /// Convert kind tables to TimescaleDB hypertables during migration
    pub timescale: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "sensorsafrica".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            pool_max_size: DEFAULT_POOL_SIZE,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            timescale: true,
        }
    }
}

impl DatabaseConfig {
    /// Acquire timeout as a duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Reject sizes and timeouts the pool cannot work with
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.pool_max_size == 0 || self.pool_max_size > MAX_POOL_SIZE {
            return Err(IngestError::Configuration(format!(
                "pool_max_size must be between 1 and {MAX_POOL_SIZE}, got {}",
                self.pool_max_size
            )));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(IngestError::Configuration(
                "acquire_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Timeouts applied to every checkout
    pub fn timeouts(&self) -> Timeouts {
        let timeout = Some(self.acquire_timeout());
        Timeouts {
            wait: timeout,
            create: timeout,
            recycle: timeout,
        }
    }

    /// Create a Postgres connection pool from this configuration.
    ///
    /// Connections are opened lazily on first checkout.
    pub fn create_pool(&self) -> Result<deadpool_postgres::Pool, IngestError> {
        self.validate()?;

        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = PoolConfig::new(self.pool_max_size);
        pool_config.timeouts = self.timeouts();
        cfg.pool = Some(pool_config);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| IngestError::Configuration(format!("failed to create pool: {e}")))
    }
}

/// Bounded pool over any manager, with tokio timeouts enabled
pub fn build_pool<M: Manager>(manager: M, max_size: usize) -> Result<Pool<M>, IngestError> {
    if max_size == 0 || max_size > MAX_POOL_SIZE {
        return Err(IngestError::Configuration(format!(
            "pool size must be between 1 and {MAX_POOL_SIZE}, got {max_size}"
        )));
    }

    Pool::builder(manager)
        .max_size(max_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| IngestError::Configuration(format!("failed to build pool: {e}")))
}
