//! Shared harness: the full service over in-memory stores

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use deadpool::managed::Pool;
use sensorsafrica_connectors::{build_pool, IngestionExecutor, MemTimeseries, RetryPolicy};
use sensorsafrica_core::{FixedTime, MemRegistryStore};
use sensorsafrica_schemas::MetricRegistry;
use sensorsafrica_service::simulate::seed_reference;
use sensorsafrica_service::{
    SensorService, ServiceConfig, StaticTokenAuthenticator, VerifiedCaller,
};

pub const TOKEN: &str = "t0k3n";
pub const SUBJECT: &str = "gateway";

pub type MemService = SensorService<MemRegistryStore, MemTimeseries>;

pub struct Harness {
    pub service: MemService,
    pub store: Arc<MemRegistryStore>,
    pub timeseries: MemTimeseries,
    /// Same pool the service writes through
    pub pool: Pool<MemTimeseries>,
    pub kinds: Arc<MetricRegistry>,
}

impl Harness {
    /// Service with default kinds, tables migrated and reference data seeded
    pub async fn new() -> Self {
        let kinds = Arc::new(MetricRegistry::with_defaults().unwrap());
        Self::with_kinds(kinds).await
    }

    /// Tables are created for the kinds registered at call time only
    pub async fn with_kinds(kinds: Arc<MetricRegistry>) -> Self {
        Self::build(kinds, 4, 500).await
    }

    /// Default kinds over a pool of `size` connections
    pub async fn with_pool(size: usize, acquire_timeout_ms: u64) -> Self {
        let kinds = Arc::new(MetricRegistry::with_defaults().unwrap());
        Self::build(kinds, size, acquire_timeout_ms).await
    }

    async fn build(kinds: Arc<MetricRegistry>, size: usize, acquire_timeout_ms: u64) -> Self {
        let config = ServiceConfig::builder()
            .pool_max_size(size)
            .acquire_timeout_ms(acquire_timeout_ms)
            .retry(RetryPolicy::none())
            .token(TOKEN, SUBJECT)
            .build();

        let store = Arc::new(MemRegistryStore::new());
        seed_reference(store.as_ref()).await.unwrap();

        let timeseries = MemTimeseries::new().referencing(store.clone());
        timeseries.migrate(&kinds);

        let pool = build_pool(timeseries.clone(), config.database.pool_max_size).unwrap();
        let acquire_timeout = config.database.acquire_timeout();
        let executor = IngestionExecutor::new(pool.clone(), acquire_timeout, config.retry);

        let service = SensorService::new(
            store.clone(),
            executor,
            Arc::new(StaticTokenAuthenticator::new(&config.auth)),
        )
        .with_kinds(kinds.clone())
        .with_time_source(Arc::new(FixedTime::new(registered_at())));

        Self {
            service,
            store,
            timeseries,
            pool,
            kinds,
        }
    }

    pub async fn caller(&self) -> VerifiedCaller {
        self.service.authenticate(TOKEN).await.unwrap()
    }
}

pub fn registered_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn reading_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap()
}
