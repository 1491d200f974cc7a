//! Per-kind outcome of one telemetry push

use serde::{Deserialize, Serialize};

use sensorsafrica_connectors::IngestError;
use sensorsafrica_schemas::ValidationError;

/// What happened to one metric kind of an envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KindStatus {
    /// Row appended
    Persisted { table: String, rows: u64 },
    /// Every value was null; nothing to store
    Empty,
    /// No definition for this kind; skipped
    UnknownKind,
    /// Values failed validation; nothing stored for this kind
    Invalid { issues: Vec<ValidationError> },
    /// Persistence failed
    Failed { error: String, retryable: bool },
}

impl KindStatus {
    pub(crate) fn failed(error: &IngestError) -> Self {
        Self::Failed {
            error: error.to_string(),
            retryable: error.is_retryable(),
        }
    }

    fn is_error(&self) -> bool {
        matches!(self, Self::Invalid { .. } | Self::Failed { .. })
    }
}

/// Outcome of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindReport {
    pub kind: String,
    #[serde(flatten)]
    pub status: KindStatus,
}

/// Overall outcome of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// Every kind with data was stored
    Complete,
    /// Some kinds stored, some failed
    Partial,
    /// Nothing stored and at least one kind failed
    Failed,
    /// Nothing to store: only null, unknown or no kinds
    Empty,
}

/// Per-kind results of [`push_sensor_data`](crate::SensorService::push_sensor_data)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub node_id: String,
    /// One entry per kind in the envelope, in kind name order
    pub kinds: Vec<KindReport>,
}

impl IngestReport {
    pub fn status(&self) -> IngestStatus {
        let stored = self.rows_persisted() > 0;
        let failed = self.kinds.iter().any(|k| k.status.is_error());

        match (stored, failed) {
            (true, false) => IngestStatus::Complete,
            (true, true) => IngestStatus::Partial,
            (false, true) => IngestStatus::Failed,
            (false, false) => IngestStatus::Empty,
        }
    }

    /// Rows appended across all kinds
    pub fn rows_persisted(&self) -> u64 {
        self.kinds
            .iter()
            .map(|k| match k.status {
                KindStatus::Persisted { rows, .. } => rows,
                _ => 0,
            })
            .sum()
    }

    /// Status of one kind
    pub fn kind(&self, kind: &str) -> Option<&KindStatus> {
        self.kinds.iter().find(|k| k.kind == kind).map(|k| &k.status)
    }

    /// Whether any failed kind is worth sending again later
    pub fn is_retryable(&self) -> bool {
        self.kinds
            .iter()
            .any(|k| matches!(k.status, KindStatus::Failed { retryable: true, .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(statuses: Vec<KindStatus>) -> IngestReport {
        IngestReport {
            node_id: "esp8266-12".into(),
            kinds: statuses
                .into_iter()
                .enumerate()
                .map(|(i, status)| KindReport {
                    kind: format!("kind{i}"),
                    status,
                })
                .collect(),
        }
    }

    fn persisted() -> KindStatus {
        KindStatus::Persisted {
            table: "sensor_PM_data".into(),
            rows: 1,
        }
    }

    #[test]
    fn overall_status() {
        assert_eq!(report(vec![persisted()]).status(), IngestStatus::Complete);
        assert_eq!(
            report(vec![persisted(), KindStatus::UnknownKind]).status(),
            IngestStatus::Complete
        );
        assert_eq!(
            report(vec![persisted(), KindStatus::failed(&IngestError::PoolClosed)]).status(),
            IngestStatus::Partial
        );
        assert_eq!(
            report(vec![KindStatus::Invalid { issues: vec![] }]).status(),
            IngestStatus::Failed
        );
        assert_eq!(
            report(vec![KindStatus::Empty, KindStatus::UnknownKind]).status(),
            IngestStatus::Empty
        );
        assert_eq!(report(vec![]).status(), IngestStatus::Empty);
    }

    #[test]
    fn exhaustion_is_retryable() {
        let exhausted = IngestError::PoolExhausted {
            waited: std::time::Duration::from_millis(50),
        };
        assert!(report(vec![KindStatus::failed(&exhausted)]).is_retryable());
        assert!(!report(vec![KindStatus::failed(&IngestError::PoolClosed)]).is_retryable());
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_value(report(vec![persisted()])).unwrap();
        assert_eq!(json["kinds"][0]["status"], "persisted");
        assert_eq!(json["kinds"][0]["table"], "sensor_PM_data");
    }
}
