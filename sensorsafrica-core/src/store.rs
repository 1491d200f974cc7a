//! Registry Store Interface
//!
//! The resolver drives the registration cascade through this trait. Each
//! `create_or_get_*` method is a single atomic resolve-or-create step keyed on
//! the entity's uniqueness columns: a backend must never create a second row
//! when two callers race on the same key. The in-memory store achieves this by
//! holding one lock per step; the Postgres store uses
//! `INSERT .. ON CONFLICT .. RETURNING` and, where no unique index exists
//! (custodians), a transaction-scoped advisory lock.

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::model::{
    Custodian, Location, LocationTag, NewCustodian, NewLocation, NewNode, NewOrganization,
    NewProject, Node, NodeDetails, Organization, Page, Project,
};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for the registry entities
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Node by its device identity
    async fn get_node(&self, node_id: &str) -> StoreResult<Option<Node>>;

    /// Node joined with location, location tags and custodian
    async fn get_node_details(&self, node_id: &str) -> StoreResult<Option<NodeDetails>>;

    /// Nodes ordered by internal id
    async fn list_nodes(&self, page: Page) -> StoreResult<Vec<Node>>;

    /// Locations ordered by internal id
    async fn list_locations(&self, page: Page) -> StoreResult<Vec<Location>>;

    /// Resolve a location by `(country, location_name)`, creating it if absent.
    ///
    /// An existing row is returned unchanged, including its city.
    async fn create_or_get_location(&self, location: &NewLocation) -> StoreResult<Location>;

    /// Resolve a tag within one location, creating it if absent
    async fn create_or_get_location_tag(
        &self,
        location_id: i64,
        tag: &str,
    ) -> StoreResult<LocationTag>;

    /// Resolve a custodian by name AND (email OR phone), creating it if absent.
    ///
    /// More than one matching row is [`StoreError::Ambiguous`].
    async fn create_or_get_custodian(&self, custodian: &NewCustodian) -> StoreResult<Custodian>;

    /// Project by name
    async fn get_project(&self, name: &str) -> StoreResult<Option<Project>>;

    /// Insert a node unless one with the same `node_id` exists.
    ///
    /// Returns the stored row, which is the pre-existing one when another
    /// caller won the race.
    async fn create_node(&self, node: &NewNode) -> StoreResult<Node>;
}

/// Out-of-band administration of reference metadata.
///
/// Not reachable from the registration or ingestion entry points.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Resolve an organization by name, creating it if absent
    async fn create_or_get_organization(
        &self,
        organization: &NewOrganization,
    ) -> StoreResult<Organization>;

    /// Resolve a project by name, creating it if absent
    async fn create_or_get_project(&self, project: &NewProject) -> StoreResult<Project>;
}
