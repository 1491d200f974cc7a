//! Registry Resolver - Idempotent Registration Cascade
//!
//! ## Overview
//!
//! Registering a node resolves (or creates) every entity it references, in
//! dependency order:
//!
//! ```text
//! node_id known? ──yes──▶ return stored node unchanged
//!      │no
//!      ▼
//! Location (country, location_name)
//!      ▼
//! LocationTag (location_id, tag)          [if a tag was supplied]
//!      ▼
//! Custodian name AND (email OR phone)     [if name + a contact channel were supplied]
//!      ▼
//! Node
//! ```
//!
//! ## Consistency
//!
//! The cascade reads then writes across several tables, so two concurrent
//! registrations of the same new node could otherwise both pass the "unknown
//! node" check. Two mechanisms close that window:
//!
//! 1. **Per-node serialization**: registrations for one `node_id` run one at a
//!    time inside this process. The second caller re-checks after acquiring
//!    the slot and finds the node the first one created.
//! 2. **Atomic steps**: every store step is a single resolve-or-create keyed on
//!    the entity's uniqueness columns, so separate processes sharing a
//!    database still converge on one row per key.
//!
//! Re-registration is a no-op: an already known node is returned as stored,
//! even when the request carries different coordinates or metadata.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::errors::{RegistryError, RegistryResult, StoreError};
use crate::model::{
    present, Custodian, Location, NewCustodian, NewLocation, NewNode, Node, NodeDetails, Page,
    RegisterNode,
};
use crate::store::RegistryStore;
use crate::time::{SystemClock, TimeSource};

/// One async mutex per key, dropped once nobody holds or waits on it
#[derive(Debug, Default)]
struct KeyedLocks {
    slots: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    fn slot(&self, key: &str) -> RegistryResult<Arc<tokio::sync::Mutex<()>>> {
        let mut slots = self.slots.lock().map_err(|_| StoreError::Poisoned)?;

        if let Some(slot) = slots.get(key).and_then(Weak::upgrade) {
            return Ok(slot);
        }

        slots.retain(|_, slot| slot.strong_count() > 0);
        let slot = Arc::new(tokio::sync::Mutex::new(()));
        slots.insert(key.to_string(), Arc::downgrade(&slot));
        Ok(slot)
    }
}

/// Resolves registration requests against a [`RegistryStore`]
pub struct RegistryResolver<S> {
    store: Arc<S>,
    time: Arc<dyn TimeSource>,
    node_locks: KeyedLocks,
}

impl<S: RegistryStore> RegistryResolver<S> {
    /// Resolver stamping registrations with the system clock
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            time: Arc::new(SystemClock),
            node_locks: KeyedLocks::default(),
        }
    }

    /// Replace the clock used for `registered_at`
    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Register a node, resolving or creating everything it references.
    ///
    /// Returns the composed node. Calling this again for a known `node_id`
    /// returns the stored node without touching any table.
    pub async fn resolve_node(&self, request: &RegisterNode) -> RegistryResult<NodeDetails> {
        let node_id = request.node_id.trim();
        if node_id.is_empty() {
            return Err(RegistryError::invalid("node_id is required"));
        }

        if let Some(details) = self.store.get_node_details(node_id).await? {
            debug!("node {} already registered", node_id);
            return Ok(details);
        }

        let slot = self.node_locks.slot(node_id)?;
        let _guard = slot.lock().await;

        // Another registration of this node may have finished while we waited.
        if let Some(details) = self.store.get_node_details(node_id).await? {
            debug!("node {} registered concurrently", node_id);
            return Ok(details);
        }

        self.register_new(node_id, request).await
    }

    async fn register_new(
        &self,
        node_id: &str,
        request: &RegisterNode,
    ) -> RegistryResult<NodeDetails> {
        let new_location = location_of(request)?;
        let coordinates = request.coordinates.ok_or_else(|| {
            RegistryError::invalid("location and geolocation coordinates are required")
        })?;
        coordinates.validate()?;

        let project_id = match present(&request.project_name) {
            Some(name) => {
                let project = self.store.get_project(name).await?.ok_or_else(|| {
                    RegistryError::invalid(format!("unknown project '{name}'"))
                })?;
                Some(project.id)
            }
            None => None,
        };

        let location = self.resolve_location(&new_location).await?;

        let mut tags = Vec::new();
        if let Some(tag) = present(&request.location.tag) {
            tags.push(self.store.create_or_get_location_tag(location.id, tag).await?);
        }

        let custodian = match custodian_of(request, project_id) {
            Some(new_custodian) => Some(self.resolve_custodian(&new_custodian).await?),
            None => None,
        };

        let node = self
            .store
            .create_node(&NewNode {
                node_id: node_id.to_string(),
                coordinates,
                location_id: Some(location.id),
                custodian_id: custodian.as_ref().map(|c| c.id),
                commissioned: false,
                registered_at: self.time.now(),
            })
            .await?;

        if is_own_node(&node, location.id, custodian.as_ref()) {
            info!(
                "registered node {} at {} (custodian: {})",
                node.node_id,
                new_location.key(),
                custodian.as_ref().map(|c| c.name.as_str()).unwrap_or("none"),
            );
        }

        // Re-read so the composed view reflects the stored row and all of the
        // location's tags, not just the one supplied here.
        match self.store.get_node_details(node_id).await? {
            Some(details) => Ok(details),
            None => Ok(NodeDetails {
                node,
                location: Some(location),
                tags,
                custodian,
            }),
        }
    }

    async fn resolve_location(&self, location: &NewLocation) -> RegistryResult<Location> {
        self.store
            .create_or_get_location(location)
            .await
            .map_err(|e| ambiguity_logged(e, "location"))
    }

    async fn resolve_custodian(&self, custodian: &NewCustodian) -> RegistryResult<Custodian> {
        self.store
            .create_or_get_custodian(custodian)
            .await
            .map_err(|e| ambiguity_logged(e, "custodian"))
    }

    /// Node joined with its metadata, or `NotFound`
    pub async fn fetch_node(&self, node_id: &str) -> RegistryResult<NodeDetails> {
        self.store
            .get_node_details(node_id.trim())
            .await?
            .ok_or_else(|| RegistryError::NotFound {
                entity: "node",
                key: node_id.to_string(),
            })
    }

    /// One page of nodes
    pub async fn list_nodes(&self, page: Page) -> RegistryResult<Vec<Node>> {
        Ok(self.store.list_nodes(page).await?)
    }

    /// One page of locations
    pub async fn list_locations(&self, page: Page) -> RegistryResult<Vec<Location>> {
        Ok(self.store.list_locations(page).await?)
    }
}

fn ambiguity_logged(error: StoreError, step: &str) -> RegistryError {
    if let StoreError::Ambiguous { key, matches, .. } = &error {
        warn!(
            "registration stopped at {} step: {} existing rows match {}",
            step, matches, key
        );
    }
    error.into()
}

/// Whether `create_node` inserted our row rather than returning a rival's
fn is_own_node(node: &Node, location_id: i64, custodian: Option<&Custodian>) -> bool {
    node.location_id == Some(location_id) && node.custodian_id == custodian.map(|c| c.id)
}

fn location_of(request: &RegisterNode) -> RegistryResult<NewLocation> {
    let location = &request.location;
    match (present(&location.country), present(&location.location_name)) {
        (Some(country), Some(location_name)) => Ok(NewLocation {
            country: country.to_string(),
            location_name: location_name.to_string(),
            city: present(&location.city).map(str::to_string),
        }),
        _ => Err(RegistryError::invalid(
            "location and geolocation coordinates are required",
        )),
    }
}

/// Custodian to resolve, when a name and at least one contact channel exist
fn custodian_of(request: &RegisterNode, project_id: Option<i64>) -> Option<NewCustodian> {
    let custodian = &request.custodian;
    let name = present(&custodian.name)?;
    let email = present(&custodian.email).map(str::to_string);
    let phone = present(&custodian.phone).map(str::to_string);

    if email.is_none() && phone.is_none() {
        info!("custodian {} has no email or phone; node registered without custodian", name);
        return None;
    }

    Some(NewCustodian {
        name: name.to_string(),
        email,
        phone,
        project_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemRegistryStore;
    use crate::model::{Coordinates, CustodianRequest, LocationRequest};

    fn request(node_id: &str) -> RegisterNode {
        RegisterNode {
            node_id: node_id.into(),
            coordinates: Some(Coordinates { lat: -1.158124, long: 36.977224 }),
            location: LocationRequest {
                country: Some("Kenya".into()),
                location_name: Some("Ruiru".into()),
                city: Some("Kiambu".into()),
                tag: None,
            },
            custodian: CustodianRequest::default(),
            project_name: None,
        }
    }

    fn resolver() -> RegistryResolver<MemRegistryStore> {
        RegistryResolver::new(Arc::new(MemRegistryStore::new()))
    }

    #[tokio::test]
    async fn missing_location_is_invalid() {
        let resolver = resolver();
        let mut req = request("esp8266-12");
        req.location.country = Some("  ".into());

        let err = resolver.resolve_node(&req).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRequest(_)));
        assert_eq!(resolver.store().location_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_coordinates_are_invalid() {
        let resolver = resolver();
        let mut req = request("esp8266-12");
        req.coordinates = None;

        let err = resolver.resolve_node(&req).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn empty_node_id_is_invalid() {
        let err = resolver().resolve_node(&request(" ")).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn known_node_ignores_missing_location() {
        let resolver = resolver();
        let first = resolver.resolve_node(&request("esp8266-12")).await.unwrap();

        let bare = RegisterNode {
            node_id: "esp8266-12".into(),
            ..Default::default()
        };
        let second = resolver.resolve_node(&bare).await.unwrap();

        assert_eq!(first.node, second.node);
    }

    #[tokio::test]
    async fn custodian_without_contact_is_skipped() {
        let resolver = resolver();
        let mut req = request("esp8266-12");
        req.custodian.name = Some("Alice".into());

        let details = resolver.resolve_node(&req).await.unwrap();
        assert!(details.custodian.is_none());
        assert_eq!(resolver.store().custodian_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_project_is_invalid() {
        let resolver = resolver();
        let mut req = request("esp8266-12");
        req.project_name = Some("Respira".into());

        let err = resolver.resolve_node(&req).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRequest(_)));
        assert_eq!(resolver.store().node_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn fetch_unknown_node_is_not_found() {
        let err = resolver().fetch_node("nope").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { entity: "node", .. }));
    }

    #[test]
    fn keyed_locks_share_slot_per_key() {
        let locks = KeyedLocks::default();
        let a = locks.slot("a").unwrap();
        let a2 = locks.slot("a").unwrap();
        let b = locks.slot("b").unwrap();

        assert!(Arc::ptr_eq(&a, &a2));
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
