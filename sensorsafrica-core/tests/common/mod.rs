//! Shared fixtures for registry integration tests
//!
//! Request builders mirror the payloads field nodes send when they first
//! boot, so tests read like the deployments they model.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use sensorsafrica_core::{
    Coordinates, CustodianRequest, FixedTime, LocationRequest, MemRegistryStore, NewOrganization,
    NewProject, ReferenceStore, RegisterNode, RegistryResolver,
};

/// Resolver over a fresh in-memory store with a pinned clock
pub fn resolver() -> RegistryResolver<MemRegistryStore> {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
    RegistryResolver::new(Arc::new(MemRegistryStore::new()))
        .with_time_source(Arc::new(FixedTime::new(start)))
}

/// Registration request for a node in Ruiru, Kenya
pub fn ruiru_node(node_id: &str) -> RegisterNode {
    RegisterNode {
        node_id: node_id.to_string(),
        coordinates: Some(Coordinates {
            lat: -1.158124,
            long: 36.977224,
        }),
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

/// Same as [`ruiru_node`] with a custodian attached
pub fn with_custodian(
    mut request: RegisterNode,
    name: &str,
    email: Option<&str>,
    phone: Option<&str>,
) -> RegisterNode {
    request.custodian = CustodianRequest {
        name: Some(name.into()),
        email: email.map(Into::into),
        phone: phone.map(Into::into),
    };
    request
}

/// Seed the reference organization and project used by project lookups
pub async fn seed_project(store: &MemRegistryStore, name: &str) -> i64 {
    let organization = store
        .create_or_get_organization(&NewOrganization {
            name: "Code for Africa".into(),
            headquarters: Some("Cape Town".into()),
            email: None,
        })
        .await
        .unwrap();

    store
        .create_or_get_project(&NewProject {
            name: name.into(),
            organization_id: Some(organization.id),
        })
        .await
        .unwrap()
        .id
}
