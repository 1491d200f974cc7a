//! Query Synthesizer
//!
//! Maps a [`CanonicalRecord`] to a parameter-bound insert against its kind's
//! table. Column order is fixed by the kind definition:
//!
//! ```text
//! INSERT INTO "sensor_PM_data" ("time", "node_id", "PM1", "PM10", "location", "sensor_name")
//! VALUES ($1, $2, $3, $4, $5, $6)
//! ```
//!
//! Identifiers are quoted (kind tables use mixed case) and every value travels
//! as a bound parameter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CanonicalRecord, MetricRegistry, SchemaError};

/// A value bound to one statement parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundValue {
    Timestamp(DateTime<Utc>),
    Text(String),
    Float(f64),
}

impl fmt::Display for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Target table with ordered columns and their bound values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<BoundValue>,
}

impl InsertStatement {
    /// Statement text with `$n` placeholders
    pub fn sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=self.columns.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            columns,
            placeholders
        )
    }

    /// Bound value of a column
    pub fn value(&self, column: &str) -> Option<&BoundValue> {
        let i = self.columns.iter().position(|c| c == column)?;
        self.values.get(i)
    }
}

/// Double-quote an SQL identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Builds inserts for records of registered kinds
#[derive(Debug, Clone, Copy)]
pub struct QuerySynthesizer<'r> {
    registry: &'r MetricRegistry,
}

impl<'r> QuerySynthesizer<'r> {
    pub fn new(registry: &'r MetricRegistry) -> Self {
        Self { registry }
    }

    /// Insert for `record` into the table of `kind`.
    ///
    /// Fields appear in declaration order; fields absent from the record are
    /// left out. A field the kind does not declare is an error, never ignored.
    pub fn synthesize(
        &self,
        kind: &str,
        record: &CanonicalRecord,
    ) -> Result<InsertStatement, SchemaError> {
        let metric = self.registry.get(kind)?;

        if let Some(field) = record.values.keys().find(|f| metric.field(f).is_none()) {
            return Err(SchemaError::UnknownField {
                kind: kind.to_string(),
                field: field.clone(),
            });
        }
        if record.values.is_empty() {
            return Err(SchemaError::EmptyRecord(kind.to_string()));
        }

        let mut columns = vec!["time".to_string(), "node_id".to_string()];
        let mut values = vec![
            BoundValue::Timestamp(record.timestamp),
            BoundValue::Text(record.node_id.clone()),
        ];

        for field in &metric.fields {
            if let Some(value) = record.values.get(&field.name) {
                columns.push(field.name.clone());
                values.push(BoundValue::Float(*value));
            }
        }

        columns.push("location".to_string());
        values.push(BoundValue::Text(record.location.clone()));
        columns.push("sensor_name".to_string());
        values.push(BoundValue::Text(record.sensor_name.clone()));

        Ok(InsertStatement {
            table: metric.table.clone(),
            columns,
            values,
        })
    }
}
