//! Registry Data Model
//!
//! ## Entities
//!
//! ```text
//! Organization ──< Project ──< Custodian ──< Node >── Location ──< LocationTag
//! ```
//!
//! - **Node**: a deployed sensor board, identified by its firmware `node_id`
//!   (e.g. `esp8266-12`). Globally unique.
//! - **Location**: a `(country, location_name)` pair with an optional city.
//!   At most one row per pair.
//! - **LocationTag**: free text scoped to one location; unique per location,
//!   not globally.
//! - **Custodian**: the person operating a node. Needs at least one contact
//!   channel (email or phone).
//! - **Organization / Project**: reference metadata created out-of-band.
//!
//! ## Requests
//!
//! Registration requests arrive loosely filled in: optional strings may be
//! absent, empty or whitespace. [`present`] is the single definition of
//! "supplied" used throughout the cascade: a value is present when it is
//! non-empty after trimming.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PAGE_LIMIT, LATITUDE_RANGE, LONGITUDE_RANGE, MAX_PAGE_LIMIT};
use crate::errors::{RegistryError, RegistryResult};

/// Trimmed contents of an optional string, or `None` when absent or blank
pub fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Geographic position of a node in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude, -90..=90
    pub lat: f64,
    /// Longitude, -180..=180
    pub long: f64,
}

impl Coordinates {
    /// Build coordinates, rejecting non-finite or out of range values
    pub fn new(lat: f64, long: f64) -> RegistryResult<Self> {
        let coords = Self { lat, long };
        coords.validate()?;
        Ok(coords)
    }

    /// Check both components are finite and within bounds
    pub fn validate(&self) -> RegistryResult<()> {
        let in_range = |v: f64, (min, max): (f64, f64)| v.is_finite() && v >= min && v <= max;

        if !in_range(self.lat, LATITUDE_RANGE) {
            return Err(RegistryError::invalid(format!("latitude {} out of range", self.lat)));
        }
        if !in_range(self.long, LONGITUDE_RANGE) {
            return Err(RegistryError::invalid(format!("longitude {} out of range", self.long)));
        }
        Ok(())
    }
}

/// A `(country, location_name)` place where nodes are deployed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub country: String,
    pub location_name: String,
    pub city: Option<String>,
}

/// Free text tag attached to one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationTag {
    pub id: i64,
    pub location_id: i64,
    pub tag: String,
}

/// Contact identity of a node operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Custodian {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Project the custodian was affiliated with at creation
    pub project_id: Option<i64>,
}

impl Custodian {
    /// Name-AND-(email-OR-phone) match rule.
    ///
    /// The name must always be equal. Contact channels only count when both
    /// sides carry a value: an absent email never equals another absent email.
    pub fn matches(&self, name: &str, email: Option<&str>, phone: Option<&str>) -> bool {
        let same = |stored: &Option<String>, requested: Option<&str>| match (stored, requested) {
            (Some(stored), Some(requested)) => stored == requested,
            _ => false,
        };

        self.name == name && (same(&self.email, email) || same(&self.phone, phone))
    }
}

/// Partner organization, reference data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub headquarters: Option<String>,
    pub email: Option<String>,
}

/// Deployment project, reference data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub organization_id: Option<i64>,
}

/// A registered sensor node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    /// Stable device identity reported by the firmware
    pub node_id: String,
    pub coordinates: Coordinates,
    pub location_id: Option<i64>,
    pub custodian_id: Option<i64>,
    pub commissioned: bool,
    pub registered_at: DateTime<Utc>,
}

/// A node joined with the metadata it references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDetails {
    pub node: Node,
    pub location: Option<Location>,
    /// Tags of the node's location
    pub tags: Vec<LocationTag>,
    pub custodian: Option<Custodian>,
}

// ===== INSERT SHAPES =====

/// Location to resolve or create
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocation {
    pub country: String,
    pub location_name: String,
    pub city: Option<String>,
}

impl NewLocation {
    /// Rendering of the uniqueness key for logs and errors
    pub fn key(&self) -> String {
        format!("{}/{}", self.country, self.location_name)
    }
}

/// Custodian to resolve or create; at least one of email/phone is set
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustodian {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub project_id: Option<i64>,
}

impl NewCustodian {
    /// Rendering of the match key for logs and errors
    pub fn key(&self) -> String {
        format!(
            "{} <{}|{}>",
            self.name,
            self.email.as_deref().unwrap_or("-"),
            self.phone.as_deref().unwrap_or("-"),
        )
    }
}

/// Node row to create once its references are resolved
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub node_id: String,
    pub coordinates: Coordinates,
    pub location_id: Option<i64>,
    pub custodian_id: Option<i64>,
    pub commissioned: bool,
    pub registered_at: DateTime<Utc>,
}

/// Organization reference row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    pub headquarters: Option<String>,
    pub email: Option<String>,
}

/// Project reference row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub organization_id: Option<i64>,
}

// ===== REQUESTS =====

/// Location part of a registration request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationRequest {
    #[serde(default)]
    pub country: Option<String>,
    /// Named `location` on the wire
    #[serde(default, rename = "location")]
    pub location_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

/// Custodian part of a registration request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustodianRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Node registration request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterNode {
    pub node_id: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub location: LocationRequest,
    #[serde(default)]
    pub custodian: CustodianRequest,
    #[serde(default)]
    pub project_name: Option<String>,
}

/// Offset/limit window for list operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u64,
    pub limit: u32,
}

impl Page {
    /// Build a page, rejecting a limit outside `1..=MAX_PAGE_LIMIT`
    pub fn new(offset: u64, limit: u32) -> RegistryResult<Self> {
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(RegistryError::invalid(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}, got {limit}"
            )));
        }
        Ok(Self { offset, limit })
    }

    /// Slice bounds of this page over a collection of `len` items
    pub fn bounds(&self, len: usize) -> std::ops::Range<usize> {
        let start = usize::try_from(self.offset).unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(self.limit as usize).min(len);
        start..end
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bob() -> Custodian {
        Custodian {
            id: 1,
            name: "Bob".into(),
            email: Some("b@x.com".into()),
            phone: Some("111".into()),
            project_id: None,
        }
    }

    #[test]
    fn blank_strings_are_not_present() {
        assert_eq!(present(&None), None);
        assert_eq!(present(&Some(String::new())), None);
        assert_eq!(present(&Some("   ".into())), None);
        assert_eq!(present(&Some(" Ruiru ".into())), Some("Ruiru"));
    }

    #[test]
    fn custodian_matches_on_name_and_any_contact() {
        let bob = bob();

        assert!(bob.matches("Bob", Some("b@x.com"), None));
        assert!(bob.matches("Bob", None, Some("111")));
        assert!(bob.matches("Bob", Some("other@x.com"), Some("111")));
        assert!(!bob.matches("Bob", None, Some("999")));
    }

    #[test]
    fn custodian_name_mismatch_never_matches() {
        let bob = bob();

        assert!(!bob.matches("Alice", Some("b@x.com"), Some("111")));
    }

    #[test]
    fn absent_contacts_do_not_match_each_other() {
        let mut bob = bob();
        bob.email = None;

        assert!(!bob.matches("Bob", None, Some("999")));
    }

    #[test]
    fn page_limits() {
        assert!(Page::new(0, 0).is_err());
        assert!(Page::new(0, 101).is_err());
        assert_eq!(Page::new(5, 100).unwrap().limit, 100);
    }

    #[test]
    fn page_bounds_clip_to_len() {
        let page = Page::new(8, 5).unwrap();
        assert_eq!(page.bounds(10), 8..10);
        assert_eq!(page.bounds(3), 3..3);
    }

    #[test]
    fn coordinates_reject_out_of_range() {
        assert!(Coordinates::new(-1.158124, 36.977224).is_ok());
        assert!(Coordinates::new(91.0, 0.0).is_err());
        assert!(Coordinates::new(0.0, f64::NAN).is_err());
    }

    #[test]
    fn registration_request_from_wire_json() {
        let json = r#"{
            "node_id": "esp8266-12",
            "coordinates": {"lat": -1.158124, "long": 36.977224},
            "location": {"country": "Kenya", "location": "Ruiru", "city": "Kiambu"}
        }"#;

        let request: RegisterNode = serde_json::from_str(json).unwrap();
        assert_eq!(request.location.location_name.as_deref(), Some("Ruiru"));
        assert_eq!(request.custodian, CustodianRequest::default());
    }
}
