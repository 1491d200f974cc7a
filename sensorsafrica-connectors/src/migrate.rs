//! Schema migrations
//!
//! Idempotent DDL for the registry tables and one time-series table per
//! registered metric kind. Safe to run on every start.

use log::info;

use sensorsafrica_schemas::{quote_ident, MetricKind, MetricRegistry};

/// Registry tables, in dependency order
pub const REGISTRY_DDL: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS organization (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    headquarters TEXT,
    email TEXT
);"#,
    r#"
CREATE TABLE IF NOT EXISTS project (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    organization_id BIGINT REFERENCES organization (id)
);"#,
    r#"
CREATE TABLE IF NOT EXISTS location (
    id BIGSERIAL PRIMARY KEY,
    country TEXT NOT NULL,
    location_name TEXT NOT NULL,
    city TEXT,
    UNIQUE (country, location_name)
);"#,
    r#"
CREATE TABLE IF NOT EXISTS location_tag (
    id BIGSERIAL PRIMARY KEY,
    location_id BIGINT NOT NULL REFERENCES location (id),
    tag TEXT NOT NULL,
    UNIQUE (location_id, tag)
);"#,
    r#"
CREATE TABLE IF NOT EXISTS custodian (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT,
    phone TEXT,
    project_id BIGINT REFERENCES project (id),
    CHECK (email IS NOT NULL OR phone IS NOT NULL)
);"#,
    r#"
CREATE TABLE IF NOT EXISTS node (
    id BIGSERIAL PRIMARY KEY,
    node_id TEXT NOT NULL UNIQUE,
    lat DOUBLE PRECISION NOT NULL,
    long DOUBLE PRECISION NOT NULL,
    location_id BIGINT REFERENCES location (id),
    custodian_id BIGINT REFERENCES custodian (id),
    commissioned BOOLEAN NOT NULL DEFAULT FALSE,
    registered_at TIMESTAMPTZ NOT NULL
);"#,
];

/// Table for one kind: frame columns around the kind's fields
pub fn kind_table_ddl(kind: &MetricKind) -> String {
    let fields: String = kind
        .fields
        .iter()
        .map(|f| format!("    {} DOUBLE PRECISION,\n", quote_ident(&f.name)))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    \"time\" TIMESTAMPTZ NOT NULL,\n    \"node_id\" TEXT NOT NULL REFERENCES node (node_id),\n{fields}    \"location\" TEXT NOT NULL,\n    \"sensor_name\" TEXT NOT NULL\n);",
        table = quote_ident(&kind.table),
    )
}

/// Turn a kind table into a TimescaleDB hypertable partitioned on time
pub fn hypertable_ddl(kind: &MetricKind) -> String {
    // Kind tables are checked identifiers, so they cannot close the literal
    format!(
        "SELECT create_hypertable('{}', 'time', if_not_exists => TRUE);",
        quote_ident(&kind.table)
    )
}

/// Every statement needed for `registry`, in execution order
pub fn statements(registry: &MetricRegistry, timescale: bool) -> Vec<String> {
    let mut statements: Vec<String> = REGISTRY_DDL.iter().map(|s| s.trim().to_string()).collect();
    if timescale {
        statements.push("CREATE EXTENSION IF NOT EXISTS timescaledb;".to_string());
    }

    for kind in registry.kinds() {
        statements.push(kind_table_ddl(&kind));
        if timescale {
            statements.push(hypertable_ddl(&kind));
        }
    }
    statements
}

/// Apply all migrations, returning the number of statements run
pub async fn run(
    client: &tokio_postgres::Client,
    registry: &MetricRegistry,
    timescale: bool,
) -> Result<usize, tokio_postgres::Error> {
    let statements = statements(registry, timescale);
    for statement in &statements {
        client.batch_execute(statement).await?;
    }
    info!(
        "schema up to date: {} statements, {} metric kind tables",
        statements.len(),
        registry.len()
    );
    Ok(statements.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pm_table_columns() {
        let registry = MetricRegistry::with_defaults().unwrap();
        let ddl = kind_table_ddl(&registry.get("particulate_matter").unwrap());

        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"sensor_PM_data\""));
        let pm1 = ddl.find("\"PM1\"").unwrap();
        let pm25 = ddl.find("\"PM2_5\"").unwrap();
        let pm10 = ddl.find("\"PM10\"").unwrap();
        assert!(pm1 < pm25 && pm25 < pm10);
        assert!(ddl.contains("REFERENCES node (node_id)"));
    }

    #[test]
    fn hypertables_only_with_timescale() {
        let registry = MetricRegistry::with_defaults().unwrap();

        let plain = statements(&registry, false);
        assert_eq!(plain.len(), REGISTRY_DDL.len() + 2);
        assert!(!plain.iter().any(|s| s.contains("create_hypertable")));

        let timescale = statements(&registry, true);
        assert_eq!(
            timescale.iter().filter(|s| s.contains("create_hypertable")).count(),
            2
        );
    }

    #[test]
    fn registry_tables_come_first() {
        let registry = MetricRegistry::with_defaults().unwrap();
        let all = statements(&registry, false);
        let node = all.iter().position(|s| s.contains("TABLE IF NOT EXISTS node")).unwrap();
        let pm = all.iter().position(|s| s.contains("sensor_PM_data")).unwrap();
        assert!(node < pm);
    }
}
