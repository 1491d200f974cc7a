//! Metric kind definitions
//!
//! A [`MetricKind`] names a category of telemetry, the time-series table it
//! lands in and its ordered numeric fields. Every kind table shares the same
//! frame of columns around the fields:
//!
//! ```text
//! time | node_id | <fields in declaration order> | location | sensor_name
//! ```

use serde::{Deserialize, Serialize};

use crate::SchemaError;

/// Frame columns present in every kind table; fields may not reuse them
pub const RESERVED_COLUMNS: [&str; 4] = ["time", "node_id", "location", "sensor_name"];

/// One numeric field of a kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Column name, e.g. `PM2_5`
    pub name: String,

    /// Display unit
    #[serde(default)]
    pub unit: String,

    /// Physical lower bound, inclusive
    #[serde(default)]
    pub min: Option<f64>,

    /// Physical upper bound, inclusive
    #[serde(default)]
    pub max: Option<f64>,
}

impl FieldSpec {
    /// Whether `value` lies within the declared physical bounds
    pub fn admits(&self, value: f64) -> bool {
        value.is_finite()
            && self.min.map_or(true, |min| value >= min)
            && self.max.map_or(true, |max| value <= max)
    }
}

/// A named telemetry category with its target table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricKind {
    /// Key used in the envelope's `sensordata` map
    pub name: String,

    /// Target time-series table
    pub table: String,

    /// Fields in column order
    pub fields: Vec<FieldSpec>,
}

impl MetricKind {
    /// Parse and check a JSON kind definition
    pub fn from_json(value: serde_json::Value) -> Result<Self, SchemaError> {
        let kind: MetricKind =
            serde_json::from_value(value).map_err(|e| SchemaError::InvalidDefinition {
                kind: "<unparsed>".to_string(),
                reason: e.to_string(),
            })?;
        kind.check()?;
        Ok(kind)
    }

    /// Field by column name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in column order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Reject definitions that cannot back a table
    pub fn check(&self) -> Result<(), SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidDefinition {
            kind: self.name.clone(),
            reason,
        };

        if !is_identifier(&self.name) {
            return Err(invalid(format!("kind name {:?} is not an identifier", self.name)));
        }
        if !is_identifier(&self.table) {
            return Err(invalid(format!("table {:?} is not an identifier", self.table)));
        }
        if self.fields.is_empty() {
            return Err(invalid("no fields declared".to_string()));
        }

        for (i, field) in self.fields.iter().enumerate() {
            if !is_identifier(&field.name) {
                return Err(invalid(format!("field {:?} is not an identifier", field.name)));
            }
            if RESERVED_COLUMNS.contains(&field.name.as_str()) {
                return Err(invalid(format!("field {} shadows a frame column", field.name)));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(invalid(format!("field {} declared twice", field.name)));
            }
            if let (Some(min), Some(max)) = (field.min, field.max) {
                if min > max {
                    return Err(invalid(format!("field {} has min > max", field.name)));
                }
            }
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
