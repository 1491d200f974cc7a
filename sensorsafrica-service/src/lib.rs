//! sensors.AFRICA Service Layer
//!
//! ## Overview
//!
//! Wires the registry resolver, the metric-kind registry and the ingestion
//! executor into the boundary operations exposed to sensor nodes and
//! operators:
//!
//! | Operation | Caller check | Result |
//! |-----------|--------------|--------|
//! | [`register_node`](SensorService::register_node) | yes | composed node |
//! | [`fetch_node`](SensorService::fetch_node) | no | composed node or `NotFound` |
//! | [`list_nodes`](SensorService::list_nodes) | no | one page of nodes |
//! | [`list_locations`](SensorService::list_locations) | no | one page of locations |
//! | [`push_sensor_data`](SensorService::push_sensor_data) | yes | per-kind [`IngestReport`] |
//!
//! Caller verification happens before any of the core is reached: the two
//! write operations take a [`VerifiedCaller`], which only an
//! [`Authenticator`] can produce.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sensorsafrica_connectors::{build_pool, IngestionExecutor, MemTimeseries, RetryPolicy};
//! use sensorsafrica_core::MemRegistryStore;
//! use sensorsafrica_service::{SensorService, ServiceConfig, StaticTokenAuthenticator};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::builder().token("secret", "field-team").build();
//! let store = Arc::new(MemRegistryStore::new());
//! let pool = build_pool(MemTimeseries::new().referencing(store.clone()), 4)?;
//! let executor = IngestionExecutor::new(pool, config.database.acquire_timeout(), RetryPolicy::default());
//!
//! let service = SensorService::new(store, executor, Arc::new(StaticTokenAuthenticator::new(&config.auth)));
//! let caller = service.authenticate("secret").await?;
//! let nodes = service.list_nodes(0, 100).await?;
//! # let _ = (caller, nodes);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod report;
pub mod service;
pub mod simulate;

pub use auth::{Authenticator, StaticTokenAuthenticator, VerifiedCaller};
pub use config::{AuthConfig, ConfigError, ServiceConfig, ServiceConfigBuilder};
pub use report::{IngestReport, IngestStatus, KindReport, KindStatus};
pub use service::SensorService;

use sensorsafrica_core::RegistryError;
use sensorsafrica_schemas::EnvelopeError;
use thiserror::Error;

/// Errors surfaced by the boundary operations
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing, unknown or revoked API token
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The payload as a whole is unusable
    #[error("invalid payload: {0}")]
    Envelope(#[from] EnvelopeError),
}

impl ServiceError {
    /// HTTP-style status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::Envelope(_) => 400,
            Self::Registry(RegistryError::InvalidRequest(_)) => 400,
            Self::Registry(RegistryError::NotFound { .. }) => 404,
            Self::Registry(RegistryError::AmbiguousMatch { .. }) => 409,
            Self::Registry(RegistryError::Store(e)) if e.is_transient() => 503,
            Self::Registry(RegistryError::Store(_)) => 500,
        }
    }
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_class() {
        assert_eq!(ServiceError::Unauthorized("no token".into()).status_code(), 401);
        assert_eq!(ServiceError::Envelope(EnvelopeError::MissingNodeId).status_code(), 400);
        assert_eq!(
            ServiceError::Registry(RegistryError::invalid("limit")).status_code(),
            400
        );
        assert_eq!(
            ServiceError::Registry(RegistryError::NotFound {
                entity: "node",
                key: "x".into()
            })
            .status_code(),
            404
        );
    }
}
