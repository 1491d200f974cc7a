//! Telemetry envelope as pushed by sensor nodes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw readings of one metric kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindReadings {
    /// Hardware sensor that produced the values, e.g. `SDS011`
    #[serde(default)]
    pub sensor_name: String,

    /// Field name to value; `null` means "not measured this cycle"
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,
}

/// One push from a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEnvelope {
    pub timestamp: DateTime<Utc>,

    pub node_id: String,

    #[serde(default)]
    pub location: String,

    /// Metric kind name to readings
    #[serde(default)]
    pub sensordata: BTreeMap<String, KindReadings>,
}

impl SensorEnvelope {
    /// Envelope with no readings yet
    pub fn new(
        timestamp: DateTime<Utc>,
        node_id: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            node_id: node_id.into(),
            location: location.into(),
            sensordata: BTreeMap::new(),
        }
    }

    /// Add one kind's readings
    pub fn with_kind<I, K>(mut self, kind: &str, sensor_name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        self.sensordata.insert(
            kind.to_string(),
            KindReadings {
                sensor_name: sensor_name.to_string(),
                values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            },
        );
        self
    }
}

/// Defects that reject a whole envelope
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope has no node_id")]
    MissingNodeId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_payload() {
        let json = r#"{
            "timestamp": "2024-05-01T06:00:00Z",
            "node_id": "esp8266-12",
            "location": "Ruiru",
            "sensordata": {
                "particulate_matter": {
                    "sensor_name": "SDS011",
                    "values": {"PM1": 35.2, "PM2_5": null, "PM10": null}
                }
            }
        }"#;

        let envelope: SensorEnvelope = serde_json::from_str(json).unwrap();
        let pm = &envelope.sensordata["particulate_matter"];
        assert_eq!(pm.sensor_name, "SDS011");
        assert!(pm.values["PM2_5"].is_null());
    }

    #[test]
    fn sensordata_defaults_to_empty() {
        let json = r#"{"timestamp": "2024-05-01T06:00:00Z", "node_id": "esp8266-12"}"#;
        let envelope: SensorEnvelope = serde_json::from_str(json).unwrap();
        assert!(envelope.sensordata.is_empty());
        assert_eq!(envelope.location, "");
    }
}
