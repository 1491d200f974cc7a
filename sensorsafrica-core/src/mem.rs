//! In-memory implementation of the registry store.
//!
//! Used by tests and by the CLI's `--memory` mode. Every trait method takes
//! the state lock once and releases it before returning, which makes each
//! resolve-or-create step atomic with respect to concurrent callers.

use async_trait::async_trait;
use log::warn;
use std::sync::{Mutex, MutexGuard};

use crate::errors::StoreError;
use crate::model::{
    Custodian, Location, LocationTag, NewCustodian, NewLocation, NewNode, NewOrganization,
    NewProject, Node, NodeDetails, Organization, Page, Project,
};
use crate::store::{ReferenceStore, RegistryStore, StoreResult};

#[derive(Debug, Default)]
struct MemState {
    organizations: Vec<Organization>,
    projects: Vec<Project>,
    locations: Vec<Location>,
    tags: Vec<LocationTag>,
    custodians: Vec<Custodian>,
    nodes: Vec<Node>,
    last_id: i64,
}

impl MemState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// Registry store holding all rows in process memory
#[derive(Debug, Default)]
pub struct MemRegistryStore {
    state: Mutex<MemState>,
}

impl MemRegistryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, MemState>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert a location row as-is, bypassing the uniqueness check.
    ///
    /// Mirrors importing legacy rows that predate the unique constraint.
    pub fn insert_raw_location(&self, location: &NewLocation) -> StoreResult<Location> {
        let mut state = self.state()?;
        let row = Location {
            id: state.next_id(),
            country: location.country.clone(),
            location_name: location.location_name.clone(),
            city: location.city.clone(),
        };
        state.locations.push(row.clone());
        Ok(row)
    }

    /// Number of node rows
    pub fn node_count(&self) -> StoreResult<usize> {
        Ok(self.state()?.nodes.len())
    }

    /// Number of location rows
    pub fn location_count(&self) -> StoreResult<usize> {
        Ok(self.state()?.locations.len())
    }

    /// Number of location tag rows
    pub fn tag_count(&self) -> StoreResult<usize> {
        Ok(self.state()?.tags.len())
    }

    /// Number of custodian rows
    pub fn custodian_count(&self) -> StoreResult<usize> {
        Ok(self.state()?.custodians.len())
    }
}

/// Exactly one match, none, or an ambiguity error
fn single<'a, T>(
    mut matches: impl Iterator<Item = &'a T>,
    entity: &'static str,
    key: impl FnOnce() -> String,
) -> StoreResult<Option<&'a T>> {
    let first = matches.next();
    let rest = matches.count();
    if rest > 0 {
        let key = key();
        warn!("{} rows share key {}; refusing to pick one", entity, key);
        return Err(StoreError::Ambiguous {
            entity,
            key,
            matches: rest + 1,
        });
    }
    Ok(first)
}

#[async_trait]
impl RegistryStore for MemRegistryStore {
    async fn get_node(&self, node_id: &str) -> StoreResult<Option<Node>> {
        let state = self.state()?;
        Ok(state.nodes.iter().find(|n| n.node_id == node_id).cloned())
    }

    async fn get_node_details(&self, node_id: &str) -> StoreResult<Option<NodeDetails>> {
        let state = self.state()?;
        let Some(node) = state.nodes.iter().find(|n| n.node_id == node_id) else {
            return Ok(None);
        };

        let location = node
            .location_id
            .and_then(|id| state.locations.iter().find(|l| l.id == id))
            .cloned();
        let tags = node
            .location_id
            .map(|id| state.tags.iter().filter(|t| t.location_id == id).cloned().collect())
            .unwrap_or_default();
        let custodian = node
            .custodian_id
            .and_then(|id| state.custodians.iter().find(|c| c.id == id))
            .cloned();

        Ok(Some(NodeDetails {
            node: node.clone(),
            location,
            tags,
            custodian,
        }))
    }

    async fn list_nodes(&self, page: Page) -> StoreResult<Vec<Node>> {
        let state = self.state()?;
        Ok(state.nodes[page.bounds(state.nodes.len())].to_vec())
    }

    async fn list_locations(&self, page: Page) -> StoreResult<Vec<Location>> {
        let state = self.state()?;
        Ok(state.locations[page.bounds(state.locations.len())].to_vec())
    }

    async fn create_or_get_location(&self, location: &NewLocation) -> StoreResult<Location> {
        let mut state = self.state()?;

        let existing = single(
            state.locations.iter().filter(|l| {
                l.country == location.country && l.location_name == location.location_name
            }),
            "location",
            || location.key(),
        )?;
        if let Some(existing) = existing {
            return Ok(existing.clone());
        }

        let row = Location {
            id: state.next_id(),
            country: location.country.clone(),
            location_name: location.location_name.clone(),
            city: location.city.clone(),
        };
        state.locations.push(row.clone());
        Ok(row)
    }

    async fn create_or_get_location_tag(
        &self,
        location_id: i64,
        tag: &str,
    ) -> StoreResult<LocationTag> {
        let mut state = self.state()?;

        let existing = single(
            state.tags.iter().filter(|t| t.location_id == location_id && t.tag == tag),
            "location_tag",
            || format!("{location_id}/{tag}"),
        )?;
        if let Some(existing) = existing {
            return Ok(existing.clone());
        }

        let row = LocationTag {
            id: state.next_id(),
            location_id,
            tag: tag.to_string(),
        };
        state.tags.push(row.clone());
        Ok(row)
    }

    async fn create_or_get_custodian(&self, custodian: &NewCustodian) -> StoreResult<Custodian> {
        let mut state = self.state()?;

        let existing = single(
            state.custodians.iter().filter(|c| {
                c.matches(
                    &custodian.name,
                    custodian.email.as_deref(),
                    custodian.phone.as_deref(),
                )
            }),
            "custodian",
            || custodian.key(),
        )?;
        if let Some(existing) = existing {
            return Ok(existing.clone());
        }

        let row = Custodian {
            id: state.next_id(),
            name: custodian.name.clone(),
            email: custodian.email.clone(),
            phone: custodian.phone.clone(),
            project_id: custodian.project_id,
        };
        state.custodians.push(row.clone());
        Ok(row)
    }

    async fn get_project(&self, name: &str) -> StoreResult<Option<Project>> {
        let state = self.state()?;
        let project = single(
            state.projects.iter().filter(|p| p.name == name),
            "project",
            || name.to_string(),
        )?;
        Ok(project.cloned())
    }

    async fn create_node(&self, node: &NewNode) -> StoreResult<Node> {
        let mut state = self.state()?;

        if let Some(existing) = state.nodes.iter().find(|n| n.node_id == node.node_id) {
            return Ok(existing.clone());
        }

        let row = Node {
            id: state.next_id(),
            node_id: node.node_id.clone(),
            coordinates: node.coordinates,
            location_id: node.location_id,
            custodian_id: node.custodian_id,
            commissioned: node.commissioned,
            registered_at: node.registered_at,
        };
        state.nodes.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl ReferenceStore for MemRegistryStore {
    async fn create_or_get_organization(
        &self,
        organization: &NewOrganization,
    ) -> StoreResult<Organization> {
        let mut state = self.state()?;
        if let Some(existing) = state.organizations.iter().find(|o| o.name == organization.name) {
            return Ok(existing.clone());
        }

        let row = Organization {
            id: state.next_id(),
            name: organization.name.clone(),
            headquarters: organization.headquarters.clone(),
            email: organization.email.clone(),
        };
        state.organizations.push(row.clone());
        Ok(row)
    }

    async fn create_or_get_project(&self, project: &NewProject) -> StoreResult<Project> {
        let mut state = self.state()?;
        if let Some(existing) = state.projects.iter().find(|p| p.name == project.name) {
            return Ok(existing.clone());
        }

        let row = Project {
            id: state.next_id(),
            name: project.name.clone(),
            organization_id: project.organization_id,
        };
        state.projects.push(row.clone());
        Ok(row)
    }
}
