//! Demonstration fleet and payload generator
//!
//! Four ESP8266 boards around Nairobi, their custodians and the partner
//! organizations funding them. Used by the `seed` and `simulate` CLI commands
//! and by tests that want a realistic registry.

use chrono::{DateTime, Utc};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use sensorsafrica_core::{
    Coordinates, CustodianRequest, LocationRequest, NewOrganization, NewProject, ReferenceStore,
    RegisterNode, StoreResult,
};
use sensorsafrica_schemas::SensorEnvelope;

/// Kind carrying PM1 / PM2.5 / PM10
pub const PARTICULATE_MATTER: &str = "particulate_matter";

/// Kind carrying temperature and relative humidity
pub const TEMPERATURE_HUMIDITY: &str = "temperature_humidity";

struct Site {
    country: &'static str,
    location: &'static str,
    city: &'static str,
    lat: f64,
    long: f64,
}

static SITES: [Site; 4] = [
    Site {
        country: "Kenya",
        location: "Ruiru",
        city: "Kiambu",
        lat: -1.158124,
        long: 36.977224,
    },
    Site {
        country: "Kenya",
        location: "Mathare",
        city: "Nairobi",
        lat: -1.261843,
        long: 36.853302,
    },
    Site {
        country: "Kenya",
        location: "Langas",
        city: "Nakuru",
        lat: 0.304553,
        long: 36.062612,
    },
    Site {
        country: "Kenya",
        location: "Makongeni",
        city: "Thika",
        lat: 1.296904,
        long: 36.849754,
    },
];

/// (name, headquarters, email)
const ORGANIZATIONS: [(&str, &str, &str); 4] = [
    ("Air Gradient", "Somewhere in Malaysia", "air@gradient.com"),
    ("GIZ", "Somewhere in Nairobi", "giz@gmbh.de"),
    ("UNEP", "Gigiri, Nairobi", "info@unep.org"),
    ("WRI", "westlands, nairobi", "hello@wri.org"),
];

/// (project, funding organization)
const PROJECTS: [(&str, &str); 3] = [
    ("Clean Air Catalyst", "Air Gradient"),
    ("Respira", "GIZ"),
    ("Clean Air One", "UNEP"),
];

/// (name, phone, email)
const CUSTODIANS: [(&str, &str, &str); 4] = [
    ("Alice", "+1 (123) 456-7890", "alice@example.com"),
    ("Bob", "+1 (987) 654-3210", "bob@example.com"),
    ("Charlie", "+1 (555) 555-5555", "charlie@example.com"),
    ("John", "+1 (666) 666-666", "charlie@example.com"),
];

/// (node_id, site, custodian, project)
const NODES: [(&str, usize, usize, Option<usize>); 4] = [
    ("esp8266-12", 0, 0, Some(0)),
    ("esp8266-34", 1, 1, Some(1)),
    ("esp8266-56", 2, 2, Some(2)),
    ("esp8266-78", 3, 3, None),
];

/// Registration requests for the whole fleet
pub fn fleet() -> Vec<RegisterNode> {
    NODES
        .iter()
        .map(|&(node_id, site, custodian, project)| {
            let site = &SITES[site];
            let (name, phone, email) = CUSTODIANS[custodian];
            RegisterNode {
                node_id: node_id.to_string(),
                coordinates: Some(Coordinates {
                    lat: site.lat,
                    long: site.long,
                }),
                location: LocationRequest {
                    country: Some(site.country.to_string()),
                    location_name: Some(site.location.to_string()),
                    city: Some(site.city.to_string()),
                    tag: None,
                },
                custodian: CustodianRequest {
                    name: Some(name.to_string()),
                    email: Some(email.to_string()),
                    phone: Some(phone.to_string()),
                },
                project_name: project.map(|p| PROJECTS[p].0.to_string()),
            }
        })
        .collect()
}

/// Create the partner organizations and their projects.
///
/// Safe to run repeatedly; existing rows are reused.
pub async fn seed_reference<R: ReferenceStore + ?Sized>(store: &R) -> StoreResult<usize> {
    let mut organizations = Vec::with_capacity(ORGANIZATIONS.len());
    for (name, headquarters, email) in ORGANIZATIONS {
        let org = store
            .create_or_get_organization(&NewOrganization {
                name: name.to_string(),
                headquarters: Some(headquarters.to_string()),
                email: Some(email.to_string()),
            })
            .await?;
        organizations.push(org);
    }

    for (project, funder) in PROJECTS {
        let organization_id = organizations.iter().find(|o| o.name == funder).map(|o| o.id);
        store
            .create_or_get_project(&NewProject {
                name: project.to_string(),
                organization_id,
            })
            .await?;
    }

    let rows = organizations.len() + PROJECTS.len();
    info!("seeded {} organizations and {} projects", organizations.len(), PROJECTS.len());
    Ok(rows)
}

/// Seeded generator of plausible readings
#[derive(Debug)]
pub struct PayloadGenerator {
    rng: StdRng,
    /// Chance that any single value is reported as null
    null_rate: f64,
}

impl PayloadGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            null_rate: 0.1,
        }
    }

    /// Change how often values are reported as null
    pub fn with_null_rate(mut self, rate: f64) -> Self {
        self.null_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// One reading cycle of `node`: particulate matter plus temperature/humidity
    pub fn envelope(&mut self, node: &RegisterNode, at: DateTime<Utc>) -> SensorEnvelope {
        let location = node.location.location_name.clone().unwrap_or_default();

        let pm2_5 = self.rng.gen_range(5.0..80.0);
        let pm1 = pm2_5 * self.rng.gen_range(0.5..0.9);
        let pm10 = pm2_5 * self.rng.gen_range(1.2..2.0);
        let temperature = self.rng.gen_range(15.0..32.0);
        let humidity = self.rng.gen_range(35.0..95.0);

        let pm = [("PM1", pm1), ("PM2_5", pm2_5), ("PM10", pm10)]
            .map(|(field, value)| (field, self.reading(value)));
        let climate = [("temperature", temperature), ("humidity", humidity)]
            .map(|(field, value)| (field, self.reading(value)));

        SensorEnvelope::new(at, node.node_id.clone(), location)
            .with_kind(PARTICULATE_MATTER, "SDS011", pm)
            .with_kind(TEMPERATURE_HUMIDITY, "DHT22", climate)
    }

    fn reading(&mut self, value: f64) -> Value {
        if self.rng.gen_bool(self.null_rate) {
            return Value::Null;
        }
        let rounded = (value * 10.0).round() / 10.0;
        serde_json::Number::from_f64(rounded).map_or(Value::Null, Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sensorsafrica_core::{MemRegistryStore, RegistryStore};

    #[test]
    fn fleet_matches_sites() {
        let fleet = fleet();

        assert_eq!(fleet.len(), 4);
        assert_eq!(fleet[0].node_id, "esp8266-12");
        assert_eq!(fleet[0].location.location_name.as_deref(), Some("Ruiru"));
        assert_eq!(fleet[3].project_name, None);
        assert!(fleet.iter().all(|n| n.coordinates.is_some()));
    }

    #[tokio::test]
    async fn seeding_twice_reuses_rows() {
        let store = MemRegistryStore::new();

        assert_eq!(seed_reference(&store).await.unwrap(), 7);
        assert_eq!(seed_reference(&store).await.unwrap(), 7);

        let respira = store.get_project("Respira").await.unwrap().unwrap();
        assert!(respira.organization_id.is_some());
    }

    #[test]
    fn same_seed_same_payload() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        let fleet = fleet();

        let a = PayloadGenerator::new(7).envelope(&fleet[0], at);
        let b = PayloadGenerator::new(7).envelope(&fleet[0], at);

        assert_eq!(a, b);
        assert_eq!(a.location, "Ruiru");
        assert_eq!(a.sensordata.len(), 2);
    }

    #[test]
    fn zero_null_rate_fills_every_field() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        let envelope = PayloadGenerator::new(1)
            .with_null_rate(0.0)
            .envelope(&fleet()[1], at);

        let pm = &envelope.sensordata[PARTICULATE_MATTER];
        assert!(pm.values.values().all(Value::is_number));
        let pm1 = pm.values["PM1"].as_f64().unwrap();
        let pm10 = pm.values["PM10"].as_f64().unwrap();
        assert!(pm1 <= pm10);
    }
}
