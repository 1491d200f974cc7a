//! Service configuration
//!
//! Layers, lowest to highest precedence:
//!
//! 1. built-in defaults
//! 2. a JSON file (`--config path`)
//! 3. `SENSORSAFRICA_*` environment variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `SENSORSAFRICA_DB_HOST` | `database.host` |
//! | `SENSORSAFRICA_DB_PORT` | `database.port` |
//! | `SENSORSAFRICA_DB_NAME` | `database.dbname` |
//! | `SENSORSAFRICA_DB_USER` | `database.user` |
//! | `SENSORSAFRICA_DB_PASSWORD` | `database.password` |
//! | `SENSORSAFRICA_POOL_SIZE` | `database.pool_max_size` |
//! | `SENSORSAFRICA_ACQUIRE_TIMEOUT_MS` | `database.acquire_timeout_ms` |
//! | `SENSORSAFRICA_TIMESCALE` | `database.timescale` |
//! | `SENSORSAFRICA_MAX_RETRIES` | `retry.max_retries` |
//! | `SENSORSAFRICA_API_TOKEN` | one token for subject `default` |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use sensorsafrica_connectors::{DatabaseConfig, RetryPolicy};

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "SENSORSAFRICA_";

/// Subject given to the token supplied through the environment
pub const ENV_TOKEN_SUBJECT: &str = "default";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    Env { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// API tokens accepted by the static authenticator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token to caller subject
    pub tokens: BTreeMap<String, String>,
}

/// Service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Connection pool and database
    pub database: DatabaseConfig,

    /// Backoff for transient persistence failures
    pub retry: RetryPolicy,

    /// Caller verification
    pub auth: AuthConfig,
}

impl ServiceConfig {
    /// Create a new config builder
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON file; absent keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from `SENSORSAFRICA_*` variables found through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        let db = &mut self.database;
        if let Some((_, value)) = var("DB_HOST") {
            db.host = value;
        }
        if let Some(pair) = var("DB_PORT") {
            db.port = parse(pair)?;
        }
        if let Some((_, value)) = var("DB_NAME") {
            db.dbname = value;
        }
        if let Some((_, value)) = var("DB_USER") {
            db.user = value;
        }
        if let Some((_, value)) = var("DB_PASSWORD") {
            db.password = value;
        }
        if let Some(pair) = var("POOL_SIZE") {
            db.pool_max_size = parse(pair)?;
        }
        if let Some(pair) = var("ACQUIRE_TIMEOUT_MS") {
            db.acquire_timeout_ms = parse(pair)?;
        }
        if let Some(pair) = var("TIMESCALE") {
            db.timescale = parse_flag(pair)?;
        }
        if let Some(pair) = var("MAX_RETRIES") {
            self.retry.max_retries = parse(pair)?;
        }
        if let Some((_, token)) = var("API_TOKEN") {
            if !token.trim().is_empty() {
                self.auth
                    .tokens
                    .insert(token.trim().to_string(), ENV_TOKEN_SUBJECT.to_string());
            }
        }
        Ok(())
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if self.auth.tokens.keys().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid("empty API token".to_string()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>((key, value): (String, String)) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env { key, value })
}

fn parse_flag((key, value): (String, String)) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env { key, value }),
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    database: Option<DatabaseConfig>,
    pool_max_size: Option<usize>,
    acquire_timeout_ms: Option<u64>,
    retry: Option<RetryPolicy>,
    tokens: BTreeMap<String, String>,
}

impl ServiceConfigBuilder {
    /// Replace the whole database section
    pub fn database(mut self, database: DatabaseConfig) -> Self {
        self.database = Some(database);
        self
    }

    /// Set maximum pool size
    pub fn pool_max_size(mut self, size: usize) -> Self {
        self.pool_max_size = Some(size);
        self
    }

    /// Set how long a checkout may wait for a connection
    pub fn acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = Some(ms);
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Accept `token` for `subject`
    pub fn token(mut self, token: impl Into<String>, subject: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), subject.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> ServiceConfig {
        let defaults = ServiceConfig::default();

        let mut database = self.database.unwrap_or(defaults.database);
        if let Some(size) = self.pool_max_size {
            database.pool_max_size = size;
        }
        if let Some(ms) = self.acquire_timeout_ms {
            database.acquire_timeout_ms = ms;
        }

        ServiceConfig {
            database,
            retry: self.retry.unwrap_or(defaults.retry),
            auth: AuthConfig {
                tokens: self.tokens,
            },
        }
    }
}
