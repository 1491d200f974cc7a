//! In-memory time-series backend.
//!
//! A deadpool [`Manager`] whose connections append rows to shared process
//! memory. Tables must be created from a [`MetricRegistry`] first, and when a
//! registry store is attached, rows for unregistered nodes are rejected the
//! way the node foreign key rejects them in Postgres.

use async_trait::async_trait;
use deadpool::managed::{Manager, Metrics, RecycleResult};
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use sensorsafrica_core::{MemRegistryStore, RegistryStore};
use sensorsafrica_schemas::{BoundValue, InsertStatement, MetricRegistry, RESERVED_COLUMNS};

use crate::{ConnectionError, InsertConnection};

/// One stored row
#[derive(Debug, Clone, PartialEq)]
pub struct MemRow {
    pub columns: Vec<String>,
    pub values: Vec<BoundValue>,
}

impl MemRow {
    /// Value of a column, if the row has it
    pub fn get(&self, column: &str) -> Option<&BoundValue> {
        let i = self.columns.iter().position(|c| c == column)?;
        self.values.get(i)
    }
}

#[derive(Debug, Default)]
struct MemTable {
    columns: BTreeSet<String>,
    rows: Vec<MemRow>,
}

type Tables = Arc<Mutex<BTreeMap<String, MemTable>>>;

/// Pool manager for the in-memory backend
#[derive(Debug, Clone, Default)]
pub struct MemTimeseries {
    tables: Tables,
    nodes: Option<Arc<MemRegistryStore>>,
}

impl MemTimeseries {
    /// Backend with no tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject rows whose node is not registered in `store`
    pub fn referencing(mut self, store: Arc<MemRegistryStore>) -> Self {
        self.nodes = Some(store);
        self
    }

    /// Create a table for every kind in `registry`; existing tables are kept
    pub fn migrate(&self, registry: &MetricRegistry) {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        for kind in registry.kinds() {
            let table = tables.entry(kind.table.clone()).or_default();
            table.columns = RESERVED_COLUMNS
                .iter()
                .map(|c| c.to_string())
                .chain(kind.fields.iter().map(|f| f.name.clone()))
                .collect();
        }
    }

    /// Rows stored in `table`
    pub fn rows(&self, table: &str) -> Vec<MemRow> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    /// Number of rows in `table`
    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.get(table).map_or(0, |t| t.rows.len())
    }
}

impl Manager for MemTimeseries {
    type Type = MemConnection;
    type Error = Infallible;

    async fn create(&self) -> Result<MemConnection, Infallible> {
        Ok(MemConnection {
            tables: self.tables.clone(),
            nodes: self.nodes.clone(),
        })
    }

    async fn recycle(
        &self,
        _conn: &mut MemConnection,
        _metrics: &Metrics,
    ) -> RecycleResult<Infallible> {
        Ok(())
    }
}

/// Connection handed out by [`MemTimeseries`]
#[derive(Debug)]
pub struct MemConnection {
    tables: Tables,
    nodes: Option<Arc<MemRegistryStore>>,
}

#[async_trait]
impl InsertConnection for MemConnection {
    async fn insert(&mut self, statement: &InsertStatement) -> Result<u64, ConnectionError> {
        if statement.columns.len() != statement.values.len() {
            return Err(ConnectionError::Permanent(format!(
                "{} columns but {} values",
                statement.columns.len(),
                statement.values.len()
            )));
        }

        if let Some(nodes) = &self.nodes {
            let node_id = match statement.value("node_id") {
                Some(BoundValue::Text(node_id)) => node_id.as_str(),
                _ => return Err(ConnectionError::Permanent("node_id is not text".to_string())),
            };
            let known = nodes
                .get_node(node_id)
                .await
                .map_err(|e| ConnectionError::Transient(e.to_string()))?;
            if known.is_none() {
                return Err(ConnectionError::Permanent(format!(
                    "insert into {} violates foreign key: node {} is not registered",
                    statement.table, node_id
                )));
            }
        }

        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let table = tables.get_mut(&statement.table).ok_or_else(|| {
            ConnectionError::Permanent(format!("relation {} does not exist", statement.table))
        })?;
        if let Some(column) = statement.columns.iter().find(|c| !table.columns.contains(*c)) {
            return Err(ConnectionError::Permanent(format!(
                "column {} of relation {} does not exist",
                column, statement.table
            )));
        }

        table.rows.push(MemRow {
            columns: statement.columns.clone(),
            values: statement.values.clone(),
        });
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn statement(table: &str, node_id: &str) -> InsertStatement {
        InsertStatement {
            table: table.into(),
            columns: vec![
                "time".into(),
                "node_id".into(),
                "PM1".into(),
                "location".into(),
                "sensor_name".into(),
            ],
            values: vec![
                BoundValue::Timestamp(Utc::now()),
                BoundValue::Text(node_id.into()),
                BoundValue::Float(35.2),
                BoundValue::Text("Ruiru".into()),
                BoundValue::Text("SDS011".into()),
            ],
        }
    }

    #[tokio::test]
    async fn insert_into_migrated_table() {
        let backend = MemTimeseries::new();
        backend.migrate(&MetricRegistry::with_defaults().unwrap());
        let mut conn = backend.create().await.unwrap();

        assert_eq!(conn.insert(&statement("sensor_PM_data", "esp8266-12")).await, Ok(1));
        assert_eq!(backend.row_count("sensor_PM_data"), 1);
    }

    #[tokio::test]
    async fn missing_table_is_permanent() {
        let backend = MemTimeseries::new();
        let mut conn = backend.create().await.unwrap();

        assert!(matches!(
            conn.insert(&statement("sensor_PM_data", "esp8266-12")).await,
            Err(ConnectionError::Permanent(_))
        ));
    }

    #[tokio::test]
    async fn unregistered_node_is_rejected() {
        let backend = MemTimeseries::new().referencing(Arc::new(MemRegistryStore::new()));
        backend.migrate(&MetricRegistry::with_defaults().unwrap());
        let mut conn = backend.create().await.unwrap();

        let result = conn.insert(&statement("sensor_PM_data", "esp8266-99")).await;
        assert!(matches!(result, Err(ConnectionError::Permanent(m)) if m.contains("foreign key")));
        assert_eq!(backend.row_count("sensor_PM_data"), 0);
    }
}
