//! Constants for sensors.AFRICA
//!
//! Numeric limits used across the workspace live here so the registry, the
//! ingestion executor and configuration loading agree on them.
//!
//! Constants are grouped by domain:
//! - **Paging**: list endpoint limits
//! - **Pool**: connection pool sizing, acquisition and retry timing
//! - **Geo**: coordinate bounds

/// Paging limits for list operations.
pub mod paging;

/// Connection pool sizing and retry timing.
pub mod pool;

pub use paging::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

pub use pool::{
    DEFAULT_ACQUIRE_TIMEOUT_MS, DEFAULT_MAX_RETRIES, DEFAULT_POOL_SIZE,
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS, MAX_POOL_SIZE,
};

/// Latitude bounds in degrees.
pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);

/// Longitude bounds in degrees.
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);
