//! Error Types for Registry Resolution
//!
//! ## Error Categories
//!
//! Registration failures fall into three groups:
//!
//! ### Caller Mistakes
//! - `InvalidRequest`: a mandatory field is missing or malformed. Never retried,
//!   maps to a 4xx at whatever boundary sits in front of the resolver.
//!
//! ### Data Integrity Violations
//! - `AmbiguousMatch`: more than one existing row matches a uniqueness key.
//!   The resolver refuses to pick one; the condition is logged and surfaced so
//!   an operator can repair the data.
//!
//! ### Storage Issues
//! - `Store`: the backing store failed. `StoreError::is_transient` tells callers
//!   whether a retry has any chance of succeeding.
//!
//! ```rust
//! use sensorsafrica_core::{RegistryError, StoreError};
//!
//! fn status_code(error: &RegistryError) -> u16 {
//!     match error {
//!         RegistryError::InvalidRequest(_) => 400,
//!         RegistryError::NotFound { .. } => 404,
//!         RegistryError::AmbiguousMatch { .. } => 409,
//!         RegistryError::Store(e) if e.is_transient() => 503,
//!         RegistryError::Store(_) => 500,
//!     }
//! }
//!
//! assert_eq!(status_code(&RegistryError::Store(StoreError::Unavailable("reset".into()))), 503);
//! ```

use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Failures reported by a [`RegistryStore`](crate::store::RegistryStore) backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// More than one row matched a key that should identify at most one
    #[error("{matches} {entity} rows match {key}")]
    Ambiguous {
        /// Entity kind, e.g. "location"
        entity: &'static str,
        /// Human readable rendering of the uniqueness key
        key: String,
        /// Number of rows that matched
        matches: usize,
    },

    /// Backend could not be reached; retrying later may succeed
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected the operation
    #[error("store error: {0}")]
    Backend(String),

    /// In-process state guarded by a poisoned lock
    #[error("store state lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Whether retrying the same operation could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Registration and lookup errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Missing or malformed mandatory field
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Existing data violates a uniqueness invariant
    #[error("ambiguous {entity} match for {key}: {matches} existing rows")]
    AmbiguousMatch {
        /// Entity kind, e.g. "custodian"
        entity: &'static str,
        /// Rendering of the key that matched several rows
        key: String,
        /// Number of rows that matched
        matches: usize,
    },

    /// Lookup target does not exist
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity kind, e.g. "node"
        entity: &'static str,
        /// The key that was looked up
        key: String,
    },

    /// Backing store failure
    #[error(transparent)]
    Store(StoreError),
}

impl RegistryError {
    /// Shorthand for [`RegistryError::InvalidRequest`]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

impl From<StoreError> for RegistryError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Ambiguous { entity, key, matches } => {
                Self::AmbiguousMatch { entity, key, matches }
            }
            other => Self::Store(other),
        }
    }
}
