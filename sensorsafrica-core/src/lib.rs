//! Registry core for sensors.AFRICA
//!
//! Owns the node registry: the data model, the store seam and the resolver
//! that turns a loosely filled registration request into a node row plus the
//! location, tag and custodian rows it references.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sensorsafrica_core::{MemRegistryStore, RegisterNode, RegistryResolver};
//!
//! # async fn demo() -> sensorsafrica_core::RegistryResult<()> {
//! let resolver = RegistryResolver::new(Arc::new(MemRegistryStore::new()));
//!
//! let request: RegisterNode = RegisterNode {
//!     node_id: "esp8266-12".into(),
//!     ..Default::default()
//! };
//! // Missing location and coordinates: rejected before anything is written
//! assert!(resolver.resolve_node(&request).await.is_err());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod mem;
pub mod model;
pub mod resolver;
pub mod store;
pub mod time;

// Public API
pub use errors::{RegistryError, RegistryResult, StoreError};
pub use mem::MemRegistryStore;
pub use model::{
    present, Coordinates, Custodian, CustodianRequest, Location, LocationRequest, LocationTag,
    NewCustodian, NewLocation, NewNode, NewOrganization, NewProject, Node, NodeDetails,
    Organization, Page, Project, RegisterNode,
};
pub use resolver::RegistryResolver;
pub use store::{ReferenceStore, RegistryStore, StoreResult};
pub use time::{FixedTime, SystemClock, TimeSource};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
