//! Metric Kinds, Telemetry Normalization and Insert Synthesis
//!
//! ## Overview
//!
//! Sensor nodes push one envelope per reading cycle. The envelope groups raw
//! values by *metric kind*:
//!
//! ```json
//! {
//!   "timestamp": "2024-05-01T06:00:00Z",
//!   "node_id": "esp8266-12",
//!   "location": "Ruiru",
//!   "sensordata": {
//!     "particulate_matter": {
//!       "sensor_name": "SDS011",
//!       "values": { "PM1": 35.2, "PM2_5": null, "PM10": null }
//!     }
//!   }
//! }
//! ```
//!
//! This crate turns that envelope into parameter-bound inserts in two steps:
//!
//! 1. [`Normalizer`] checks each kind against its [`MetricKind`] definition,
//!    drops null values and yields one [`CanonicalRecord`] per kind that still
//!    carries data. Unknown kinds are skipped, not rejected.
//! 2. [`QuerySynthesizer`] maps a record to its kind's table and produces an
//!    [`InsertStatement`] whose columns follow the kind's field declaration
//!    order. Values are never formatted into statement text.
//!
//! ## Kinds as Data
//!
//! Kinds live in a [`MetricRegistry`]. Adding a kind means registering one
//! more definition, not adding a branch:
//!
//! ```rust
//! use sensorsafrica_schemas::{MetricKind, MetricRegistry};
//! use serde_json::json;
//!
//! let registry = MetricRegistry::with_defaults()?;
//! registry.register(MetricKind::from_json(json!({
//!     "name": "gas",
//!     "table": "sensor_gas_data",
//!     "fields": [{ "name": "CO2", "unit": "ppm", "min": 0.0 }]
//! }))?)?;
//!
//! assert_eq!(registry.get("gas")?.table, "sensor_gas_data");
//! # Ok::<(), sensorsafrica_schemas::SchemaError>(())
//! ```

#![deny(unsafe_code)]

pub mod envelope;
pub mod kind;
pub mod registry;
pub mod schemas;
pub mod synthesis;
pub mod validation;

pub use envelope::{EnvelopeError, KindReadings, SensorEnvelope};
pub use kind::{FieldSpec, MetricKind, RESERVED_COLUMNS};
pub use registry::{MetricRegistry, GLOBAL_REGISTRY};
pub use synthesis::{quote_ident, BoundValue, InsertStatement, QuerySynthesizer};
pub use validation::{CanonicalRecord, KindOutcome, Normalized, Normalizer, ValidationError};

/// Kind definition and lookup errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("unknown metric kind: {0}")]
    UnknownKind(String),

    #[error("metric kind already registered: {0}")]
    DuplicateKind(String),

    #[error("invalid definition for kind {kind}: {reason}")]
    InvalidDefinition { kind: String, reason: String },

    #[error("kind {kind} has no field {field}")]
    UnknownField { kind: String, field: String },

    #[error("record for kind {0} carries no values")]
    EmptyRecord(String),
}
