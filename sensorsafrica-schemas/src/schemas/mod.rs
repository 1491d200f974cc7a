//! Built-in metric kinds
//!
//! Each kind is declared as JSON, the same document shape operators use to
//! register additional kinds at runtime. Field order in the document is the
//! column order of the kind's time-series table.

use serde_json::json;

use crate::{MetricKind, SchemaError};

/// Particulate matter concentrations, µg/m³
pub fn particulate_matter() -> Result<MetricKind, SchemaError> {
    MetricKind::from_json(json!({
        "name": "particulate_matter",
        "table": "sensor_PM_data",
        "fields": [
            { "name": "PM1",   "unit": "µg/m³", "min": 0.0 },
            { "name": "PM2_5", "unit": "µg/m³", "min": 0.0 },
            { "name": "PM10",  "unit": "µg/m³", "min": 0.0 }
        ]
    }))
}

/// Air temperature and relative humidity
pub fn temperature_humidity() -> Result<MetricKind, SchemaError> {
    MetricKind::from_json(json!({
        "name": "temperature_humidity",
        "table": "sensor_temp_humidity_data",
        "fields": [
            { "name": "temperature", "unit": "°C",  "min": -273.15 },
            { "name": "humidity",    "unit": "%RH", "min": 0.0, "max": 100.0 }
        ]
    }))
}

/// All built-in kinds
pub fn defaults() -> Result<Vec<MetricKind>, SchemaError> {
    Ok(vec![particulate_matter()?, temperature_humidity()?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particulate_matter_field_order() {
        let kind = particulate_matter().unwrap();
        let names: Vec<_> = kind.field_names().collect();
        assert_eq!(names, ["PM1", "PM2_5", "PM10"]);
        assert_eq!(kind.table, "sensor_PM_data");
    }

    #[test]
    fn humidity_is_bounded() {
        let kind = temperature_humidity().unwrap();
        let humidity = kind.field("humidity").unwrap();
        assert_eq!(humidity.min, Some(0.0));
        assert_eq!(humidity.max, Some(100.0));
    }
}
