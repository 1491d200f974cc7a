//! Postgres backends
//!
//! - [`InsertConnection`] for pooled `deadpool_postgres` clients, running
//!   synthesized inserts as cached prepared statements.
//! - [`PgRegistryStore`], the registry store over the same pool.
//!
//! Every resolve-or-create step is one round trip that cannot create a
//! second row for the same key:
//!
//! | Entity | Key | Statement |
//! |---|---|---|
//! | location | `(country, location_name)` | `INSERT .. ON CONFLICT DO UPDATE .. RETURNING` |
//! | location_tag | `(location_id, tag)` | `INSERT .. ON CONFLICT DO UPDATE .. RETURNING` |
//! | node | `node_id` | `INSERT .. ON CONFLICT DO NOTHING`, then select |
//! | custodian | name AND (email OR phone) | transaction holding an advisory lock on the name |
//!
//! The no-op `DO UPDATE SET col = table.col` makes `RETURNING` yield the
//! existing row untouched when the key already exists.

use async_trait::async_trait;
use deadpool_postgres::{ClientWrapper, Pool};
use log::warn;
use std::error::Error as _;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use sensorsafrica_core::model::{
    Coordinates, Custodian, Location, LocationTag, NewCustodian, NewLocation, NewNode,
    NewOrganization, NewProject, Node, NodeDetails, Organization, Page, Project,
};
use sensorsafrica_core::store::{ReferenceStore, RegistryStore, StoreResult};
use sensorsafrica_core::StoreError;
use sensorsafrica_schemas::{BoundValue, InsertStatement};

use crate::{ConnectionError, InsertConnection};

/// SQLSTATE classes and codes worth retrying
const TRANSIENT_STATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "53300", // too_many_connections
    "57P01", // admin_shutdown
    "57P02", // crash_shutdown
    "57P03", // cannot_connect_now
];

/// Whether a failed statement may succeed if simply run again
pub fn is_transient(error: &tokio_postgres::Error) -> bool {
    if error.is_closed() {
        return true;
    }
    if let Some(state) = error.code() {
        let code = state.code();
        // Class 08: connection exception
        return code.starts_with("08") || TRANSIENT_STATES.contains(&code);
    }
    error
        .source()
        .map_or(false, |source| source.is::<std::io::Error>())
}

fn connection_error(error: tokio_postgres::Error) -> ConnectionError {
    if is_transient(&error) {
        ConnectionError::Transient(error.to_string())
    } else {
        ConnectionError::Permanent(error.to_string())
    }
}

fn store_error(error: tokio_postgres::Error) -> StoreError {
    if is_transient(&error) {
        StoreError::Unavailable(error.to_string())
    } else {
        StoreError::Backend(error.to_string())
    }
}

fn bind(value: &BoundValue) -> &(dyn ToSql + Sync) {
    match value {
        BoundValue::Timestamp(t) => t,
        BoundValue::Text(s) => s,
        BoundValue::Float(v) => v,
    }
}

#[async_trait]
impl InsertConnection for ClientWrapper {
    async fn insert(&mut self, statement: &InsertStatement) -> Result<u64, ConnectionError> {
        let prepared = self
            .prepare_cached(&statement.sql())
            .await
            .map_err(connection_error)?;
        let params: Vec<&(dyn ToSql + Sync)> = statement.values.iter().map(bind).collect();

        self.execute(&prepared, &params).await.map_err(connection_error)
    }
}

// ===== ROW MAPPING =====

fn location_from_row(row: &Row) -> Result<Location, tokio_postgres::Error> {
    Ok(Location {
        id: row.try_get("id")?,
        country: row.try_get("country")?,
        location_name: row.try_get("location_name")?,
        city: row.try_get("city")?,
    })
}

fn tag_from_row(row: &Row) -> Result<LocationTag, tokio_postgres::Error> {
    Ok(LocationTag {
        id: row.try_get("id")?,
        location_id: row.try_get("location_id")?,
        tag: row.try_get("tag")?,
    })
}

fn custodian_from_row(row: &Row) -> Result<Custodian, tokio_postgres::Error> {
    Ok(Custodian {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        project_id: row.try_get("project_id")?,
    })
}

fn node_from_row(row: &Row) -> Result<Node, tokio_postgres::Error> {
    Ok(Node {
        id: row.try_get("id")?,
        node_id: row.try_get("node_id")?,
        coordinates: Coordinates {
            lat: row.try_get("lat")?,
            long: row.try_get("long")?,
        },
        location_id: row.try_get("location_id")?,
        custodian_id: row.try_get("custodian_id")?,
        commissioned: row.try_get("commissioned")?,
        registered_at: row.try_get("registered_at")?,
    })
}

fn project_from_row(row: &Row) -> Result<Project, tokio_postgres::Error> {
    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        organization_id: row.try_get("organization_id")?,
    })
}

fn organization_from_row(row: &Row) -> Result<Organization, tokio_postgres::Error> {
    Ok(Organization {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        headquarters: row.try_get("headquarters")?,
        email: row.try_get("email")?,
    })
}

/// Registry store backed by Postgres
#[derive(Clone)]
pub struct PgRegistryStore {
    pool: Pool,
}

impl std::fmt::Debug for PgRegistryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgRegistryStore")
            .field("status", &self.pool.status())
            .finish()
    }
}

impl PgRegistryStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> StoreResult<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(format!("registry pool: {e}")))
    }

    async fn node_by_id(
        client: &tokio_postgres::Client,
        node_id: &str,
    ) -> StoreResult<Option<Node>> {
        let row = client
            .query_opt(
                "SELECT id, node_id, lat, long, location_id, custodian_id, commissioned, registered_at FROM node WHERE node_id = $1",
                &[&node_id],
            )
            .await
            .map_err(store_error)?;
        row.as_ref().map(node_from_row).transpose().map_err(store_error)
    }
}

fn page_params(page: Page) -> (i64, i64) {
    (
        i64::try_from(page.offset).unwrap_or(i64::MAX),
        i64::from(page.limit),
    )
}

#[async_trait]
impl RegistryStore for PgRegistryStore {
    async fn get_node(&self, node_id: &str) -> StoreResult<Option<Node>> {
        let client = self.client().await?;
        Self::node_by_id(&**client, node_id).await
    }

    async fn get_node_details(&self, node_id: &str) -> StoreResult<Option<NodeDetails>> {
        let client = self.client().await?;
        let Some(node) = Self::node_by_id(&**client, node_id).await? else {
            return Ok(None);
        };

        let (location, tags) = match node.location_id {
            Some(location_id) => {
                let location = client
                    .query_opt(
                        "SELECT id, country, location_name, city FROM location WHERE id = $1",
                        &[&location_id],
                    )
                    .await
                    .map_err(store_error)?;
                let tags = client
                    .query(
                        "SELECT id, location_id, tag FROM location_tag WHERE location_id = $1 ORDER BY id",
                        &[&location_id],
                    )
                    .await
                    .map_err(store_error)?;

                (
                    location.as_ref().map(location_from_row).transpose().map_err(store_error)?,
                    tags.iter().map(tag_from_row).collect::<Result<_, _>>().map_err(store_error)?,
                )
            }
            None => (None, Vec::new()),
        };

        let custodian = match node.custodian_id {
            Some(custodian_id) => client
                .query_opt(
                    "SELECT id, name, email, phone, project_id FROM custodian WHERE id = $1",
                    &[&custodian_id],
                )
                .await
                .map_err(store_error)?
                .as_ref()
                .map(custodian_from_row)
                .transpose()
                .map_err(store_error)?,
            None => None,
        };

        Ok(Some(NodeDetails {
            node,
            location,
            tags,
            custodian,
        }))
    }

    async fn list_nodes(&self, page: Page) -> StoreResult<Vec<Node>> {
        let client = self.client().await?;
        let (offset, limit) = page_params(page);
        let rows = client
            .query(
                "SELECT id, node_id, lat, long, location_id, custodian_id, commissioned, registered_at FROM node ORDER BY id OFFSET $1 LIMIT $2",
                &[&offset, &limit],
            )
            .await
            .map_err(store_error)?;
        rows.iter().map(node_from_row).collect::<Result<_, _>>().map_err(store_error)
    }

    async fn list_locations(&self, page: Page) -> StoreResult<Vec<Location>> {
        let client = self.client().await?;
        let (offset, limit) = page_params(page);
        let rows = client
            .query(
                "SELECT id, country, location_name, city FROM location ORDER BY id OFFSET $1 LIMIT $2",
                &[&offset, &limit],
            )
            .await
            .map_err(store_error)?;
        rows.iter().map(location_from_row).collect::<Result<_, _>>().map_err(store_error)
    }

    async fn create_or_get_location(&self, location: &NewLocation) -> StoreResult<Location> {
        let client = self.client().await?;
        let row = client
            .query_one(
                r#"
INSERT INTO location (country, location_name, city)
VALUES ($1, $2, $3)
ON CONFLICT (country, location_name)
DO UPDATE SET country = location.country
RETURNING id, country, location_name, city;
"#,
                &[&location.country, &location.location_name, &location.city],
            )
            .await
            .map_err(store_error)?;
        location_from_row(&row).map_err(store_error)
    }

    async fn create_or_get_location_tag(
        &self,
        location_id: i64,
        tag: &str,
    ) -> StoreResult<LocationTag> {
        let client = self.client().await?;
        let row = client
            .query_one(
                r#"
INSERT INTO location_tag (location_id, tag)
VALUES ($1, $2)
ON CONFLICT (location_id, tag)
DO UPDATE SET tag = location_tag.tag
RETURNING id, location_id, tag;
"#,
                &[&location_id, &tag],
            )
            .await
            .map_err(store_error)?;
        tag_from_row(&row).map_err(store_error)
    }

    async fn create_or_get_custodian(&self, custodian: &NewCustodian) -> StoreResult<Custodian> {
        let mut client = self.client().await?;
        let tx = client.transaction().await.map_err(store_error)?;

        // Custodians have no unique key; serialize resolution per name instead.
        tx.execute("SELECT pg_advisory_xact_lock(hashtext($1))", &[&custodian.name])
            .await
            .map_err(store_error)?;

        let rows = tx
            .query(
                r#"
SELECT id, name, email, phone, project_id FROM custodian
WHERE name = $1
  AND ((email IS NOT NULL AND email = $2) OR (phone IS NOT NULL AND phone = $3))
ORDER BY id;
"#,
                &[&custodian.name, &custodian.email, &custodian.phone],
            )
            .await
            .map_err(store_error)?;

        let resolved = match rows.as_slice() {
            [] => {
                let row = tx
                    .query_one(
                        r#"
INSERT INTO custodian (name, email, phone, project_id)
VALUES ($1, $2, $3, $4)
RETURNING id, name, email, phone, project_id;
"#,
                        &[
                            &custodian.name,
                            &custodian.email,
                            &custodian.phone,
                            &custodian.project_id,
                        ],
                    )
                    .await
                    .map_err(store_error)?;
                custodian_from_row(&row).map_err(store_error)?
            }
            [row] => custodian_from_row(row).map_err(store_error)?,
            rows => {
                warn!(
                    "{} custodian rows match {}; refusing to pick one",
                    rows.len(),
                    custodian.key()
                );
                return Err(StoreError::Ambiguous {
                    entity: "custodian",
                    key: custodian.key(),
                    matches: rows.len(),
                });
            }
        };

        tx.commit().await.map_err(store_error)?;
        Ok(resolved)
    }

    async fn get_project(&self, name: &str) -> StoreResult<Option<Project>> {
        let client = self.client().await?;
        let row = client
            .query_opt("SELECT id, name, organization_id FROM project WHERE name = $1", &[&name])
            .await
            .map_err(store_error)?;
        row.as_ref().map(project_from_row).transpose().map_err(store_error)
    }

    async fn create_node(&self, node: &NewNode) -> StoreResult<Node> {
        let client = self.client().await?;
        client
            .execute(
                r#"
INSERT INTO node (node_id, lat, long, location_id, custodian_id, commissioned, registered_at)
VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (node_id)
DO NOTHING;
"#,
                &[
                    &node.node_id,
                    &node.coordinates.lat,
                    &node.coordinates.long,
                    &node.location_id,
                    &node.custodian_id,
                    &node.commissioned,
                    &node.registered_at,
                ],
            )
            .await
            .map_err(store_error)?;

        Self::node_by_id(&**client, &node.node_id)
            .await?
            .ok_or_else(|| {
                StoreError::Backend(format!("node {} vanished after insert", node.node_id))
            })
    }
}

#[async_trait]
impl ReferenceStore for PgRegistryStore {
    async fn create_or_get_organization(
        &self,
        organization: &NewOrganization,
    ) -> StoreResult<Organization> {
        let client = self.client().await?;
        let row = client
            .query_one(
                r#"
INSERT INTO organization (name, headquarters, email)
VALUES ($1, $2, $3)
ON CONFLICT (name)
DO UPDATE SET name = organization.name
RETURNING id, name, headquarters, email;
"#,
                &[&organization.name, &organization.headquarters, &organization.email],
            )
            .await
            .map_err(store_error)?;
        organization_from_row(&row).map_err(store_error)
    }

    async fn create_or_get_project(&self, project: &NewProject) -> StoreResult<Project> {
        let client = self.client().await?;
        let row = client
            .query_one(
                r#"
INSERT INTO project (name, organization_id)
VALUES ($1, $2)
ON CONFLICT (name)
DO UPDATE SET name = project.name
RETURNING id, name, organization_id;
"#,
                &[&project.name, &project.organization_id],
            )
            .await
            .map_err(store_error)?;
        project_from_row(&row).map_err(store_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn bound_values_keep_their_sql_type() {
        let ts = BoundValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap());
        let text = BoundValue::Text("Ruiru".into());
        let float = BoundValue::Float(35.2);

        // Each variant must bind without conversion
        let params: Vec<&(dyn ToSql + Sync)> = [&ts, &text, &float].into_iter().map(bind).collect();
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn page_params_saturate() {
        let page = Page::new(u64::MAX, 100).unwrap();
        assert_eq!(page_params(page), (i64::MAX, 100));
    }
}
