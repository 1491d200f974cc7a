//! Measurement Normalizer
//!
//! Checks each kind in an envelope against its registered definition and
//! flattens it into a [`CanonicalRecord`]. Outcomes are per kind: one bad kind
//! never hides the others.
//!
//! | Kind state | Outcome |
//! |---|---|
//! | not registered | [`KindOutcome::Unknown`], logged at info |
//! | unknown field, non-numeric or out-of-range value | [`KindOutcome::Invalid`] listing every issue |
//! | every value null or absent | [`KindOutcome::Empty`], logged at debug |
//! | otherwise | [`KindOutcome::Record`] with the null values dropped |

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap};

use crate::{EnvelopeError, KindReadings, MetricKind, MetricRegistry, SensorEnvelope};

/// A field value that fails its kind's schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum ValidationError {
    #[error("field {field} is not part of this kind")]
    UnknownField { field: String },

    #[error("field {field} is not numeric: {value}")]
    NotNumeric { field: String, value: String },

    #[error("field {field} value {value} outside physical bounds [{min:?}, {max:?}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },

    #[error("readings carry no sensor_name")]
    MissingSensorName,
}

/// Validated, null-free measurements of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub location: String,
    pub sensor_name: String,
    /// Non-null values keyed by field name
    pub values: BTreeMap<String, f64>,
}

/// Result of normalizing one kind of an envelope
#[derive(Debug, Clone, PartialEq)]
pub enum KindOutcome {
    Record(CanonicalRecord),
    Empty { kind: String },
    Unknown { kind: String },
    Invalid { kind: String, issues: Vec<ValidationError> },
}

impl KindOutcome {
    /// Kind this outcome belongs to
    pub fn kind(&self) -> &str {
        match self {
            Self::Record(record) => &record.kind,
            Self::Empty { kind } | Self::Unknown { kind } | Self::Invalid { kind, .. } => kind,
        }
    }

    /// The record, when the kind produced one
    pub fn into_record(self) -> Option<CanonicalRecord> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }
}

/// Normalizes envelopes against a registry
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'r> {
    registry: &'r MetricRegistry,
}

impl<'r> Normalizer<'r> {
    pub fn new(registry: &'r MetricRegistry) -> Self {
        Self { registry }
    }

    /// Start normalizing an envelope.
    ///
    /// Envelope-level defects fail here; kinds are examined lazily as the
    /// returned iterator is driven.
    pub fn normalize<'a>(
        &'a self,
        envelope: &'a SensorEnvelope,
    ) -> Result<Normalized<'a>, EnvelopeError> {
        let node_id = envelope.node_id.trim();
        if node_id.is_empty() {
            return Err(EnvelopeError::MissingNodeId);
        }

        Ok(Normalized {
            registry: self.registry,
            envelope,
            node_id,
            kinds: envelope.sensordata.iter(),
        })
    }
}

/// Lazy per-kind outcomes of one envelope, in kind name order
#[derive(Debug)]
pub struct Normalized<'a> {
    registry: &'a MetricRegistry,
    envelope: &'a SensorEnvelope,
    node_id: &'a str,
    kinds: btree_map::Iter<'a, String, KindReadings>,
}

impl<'a> Normalized<'a> {
    /// Only the kinds that produced a record
    pub fn records(self) -> impl Iterator<Item = CanonicalRecord> + 'a {
        self.filter_map(KindOutcome::into_record)
    }

    fn outcome(&self, kind_name: &str, readings: &KindReadings) -> KindOutcome {
        let Some(kind) = self.registry.lookup(kind_name) else {
            info!(
                "node {} sent unknown metric kind {}; skipped",
                self.node_id, kind_name
            );
            return KindOutcome::Unknown {
                kind: kind_name.to_string(),
            };
        };

        let (values, issues) = check_values(&kind, readings);
        let sensor_name = readings.sensor_name.trim();

        if !issues.is_empty() {
            return KindOutcome::Invalid {
                kind: kind.name.clone(),
                issues,
            };
        }
        if values.is_empty() {
            debug!("node {} sent only nulls for {}; dropped", self.node_id, kind.name);
            return KindOutcome::Empty {
                kind: kind.name.clone(),
            };
        }
        if sensor_name.is_empty() {
            return KindOutcome::Invalid {
                kind: kind.name.clone(),
                issues: vec![ValidationError::MissingSensorName],
            };
        }

        KindOutcome::Record(CanonicalRecord {
            kind: kind.name.clone(),
            timestamp: self.envelope.timestamp,
            node_id: self.node_id.to_string(),
            location: self.envelope.location.clone(),
            sensor_name: sensor_name.to_string(),
            values,
        })
    }
}

impl Iterator for Normalized<'_> {
    type Item = KindOutcome;

    fn next(&mut self) -> Option<KindOutcome> {
        let (kind_name, readings) = self.kinds.next()?;
        Some(self.outcome(kind_name, readings))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.kinds.size_hint()
    }
}

/// Non-null values and every issue found among them
fn check_values(
    kind: &MetricKind,
    readings: &KindReadings,
) -> (BTreeMap<String, f64>, Vec<ValidationError>) {
    let mut values = BTreeMap::new();
    let mut issues = Vec::new();

    for (name, raw) in &readings.values {
        let Some(field) = kind.field(name) else {
            issues.push(ValidationError::UnknownField { field: name.clone() });
            continue;
        };

        let value = match raw {
            serde_json::Value::Null => continue,
            serde_json::Value::Number(n) => n.as_f64(),
            _ => None,
        };
        let Some(value) = value else {
            issues.push(ValidationError::NotNumeric {
                field: name.clone(),
                value: raw.to_string(),
            });
            continue;
        };

        if !field.admits(value) {
            issues.push(ValidationError::OutOfRange {
                field: name.clone(),
                value,
                min: field.min,
                max: field.max,
            });
            continue;
        }

        values.insert(name.clone(), value);
    }

    (values, issues)
}
