//! Property tests for normalization and synthesis
//!
//! Nulls never reach a record, and synthesis is a pure function of its input.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};

use sensorsafrica_schemas::{
    BoundValue, KindOutcome, MetricRegistry, Normalizer, QuerySynthesizer, SensorEnvelope,
};

const PM_FIELDS: [&str; 3] = ["PM1", "PM2_5", "PM10"];

fn pm_value() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![Just(None), (0.0f64..1000.0).prop_map(Some)]
}

fn envelope(readings: &[Option<f64>]) -> SensorEnvelope {
    let values = PM_FIELDS
        .iter()
        .zip(readings)
        .map(|(field, value)| (*field, value.map_or(Value::Null, |v| json!(v))));

    SensorEnvelope::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap(),
        "esp8266-12",
        "Ruiru",
    )
    .with_kind("particulate_matter", "SDS011", values)
}

proptest! {
    #[test]
    fn records_hold_exactly_the_non_null_fields(
        readings in proptest::collection::vec(pm_value(), 3)
    ) {
        let registry = MetricRegistry::with_defaults().unwrap();
        let envelope = envelope(&readings);

        let outcomes: Vec<_> = Normalizer::new(&registry).normalize(&envelope).unwrap().collect();
        prop_assert_eq!(outcomes.len(), 1);

        let present = readings.iter().filter(|r| r.is_some()).count();
        match &outcomes[0] {
            KindOutcome::Record(record) => {
                prop_assert_eq!(record.values.len(), present);
                for (field, reading) in PM_FIELDS.iter().zip(&readings) {
                    prop_assert_eq!(record.values.get(*field).copied(), *reading);
                }
            }
            KindOutcome::Empty { .. } => {
                prop_assert_eq!(present, 0);
            }
            other => {
                prop_assert!(false, "unexpected outcome {:?}", other);
            }
        }
    }

    #[test]
    fn synthesis_is_deterministic(readings in proptest::collection::vec(pm_value(), 3)) {
        let registry = MetricRegistry::with_defaults().unwrap();
        let envelope = envelope(&readings);
        let synthesizer = QuerySynthesizer::new(&registry);

        for record in Normalizer::new(&registry).normalize(&envelope).unwrap().records() {
            let first = synthesizer.synthesize(&record.kind, &record).unwrap();
            let second = synthesizer.synthesize(&record.kind, &record.clone()).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.columns.len(), first.values.len());

            // Field columns sit between the leading frame pair and trailing frame pair
            let fields: Vec<_> = first.columns[2..first.columns.len() - 2].to_vec();
            let expected: Vec<_> = PM_FIELDS
                .iter()
                .zip(&readings)
                .filter(|(_, r)| r.is_some())
                .map(|(f, _)| f.to_string())
                .collect();
            prop_assert_eq!(fields, expected);
        }
    }

    #[test]
    fn negative_concentrations_never_produce_records(value in -1000.0f64..-0.001) {
        let registry = MetricRegistry::with_defaults().unwrap();
        let envelope = envelope(&[Some(value), None, None]);

        let normalizer = Normalizer::new(&registry);
        let records: Vec<_> = normalizer.normalize(&envelope).unwrap().records().collect();
        prop_assert!(records.is_empty());
    }
}

#[test]
fn pipeline_binds_frame_columns() {
    let registry = MetricRegistry::with_defaults().unwrap();
    let envelope = envelope(&[Some(35.2), None, Some(40.0)]);

    let record = Normalizer::new(&registry)
        .normalize(&envelope)
        .unwrap()
        .records()
        .next()
        .unwrap();
    let stmt = QuerySynthesizer::new(&registry)
        .synthesize("particulate_matter", &record)
        .unwrap();

    assert_eq!(stmt.values[0], BoundValue::Timestamp(envelope.timestamp));
    assert_eq!(stmt.values[1], BoundValue::Text("esp8266-12".into()));
    assert_eq!(stmt.value("location"), Some(&BoundValue::Text("Ruiru".into())));
    assert_eq!(stmt.value("sensor_name"), Some(&BoundValue::Text("SDS011".into())));
    assert_eq!(stmt.value("PM2_5"), None);
}
