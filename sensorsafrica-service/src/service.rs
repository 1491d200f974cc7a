//! Boundary operations
//!
//! ## Ingestion Pipeline
//!
//! ```text
//! SensorEnvelope
//!      │ Normalizer        (per kind: record / empty / unknown / invalid)
//!      ▼
//! CanonicalRecord per kind
//!      │ QuerySynthesizer  (table + bound parameters)
//!      ▼
//! InsertStatement per kind
//!      │ IngestionExecutor (concurrent, independent results)
//!      ▼
//! IngestReport
//! ```
//!
//! Kinds never share a transaction: a failed kind leaves the others stored.
//! Ingestion does not check that the node is registered; the node foreign
//! key rejects rows for unknown nodes as a per-kind persistence failure.

use deadpool::managed::Manager;
use log::{debug, info, warn};
use std::fmt::Display;
use std::sync::Arc;

use sensorsafrica_connectors::{ConnectionStats, IngestionExecutor, InsertConnection};
use sensorsafrica_core::{
    Location, Node, NodeDetails, Page, RegisterNode, RegistryResolver, RegistryStore, TimeSource,
};
use sensorsafrica_schemas::{
    InsertStatement, KindOutcome, MetricRegistry, Normalizer, QuerySynthesizer, SensorEnvelope,
    GLOBAL_REGISTRY,
};

use crate::auth::{Authenticator, VerifiedCaller};
use crate::report::{IngestReport, KindReport, KindStatus};
use crate::ServiceError;

/// Registration and ingestion over a registry store `S` and a pool of `M`
pub struct SensorService<S, M: Manager> {
    resolver: RegistryResolver<S>,
    kinds: Arc<MetricRegistry>,
    executor: IngestionExecutor<M>,
    auth: Arc<dyn Authenticator>,
}

impl<S, M> SensorService<S, M>
where
    S: RegistryStore,
    M: Manager,
    M::Type: InsertConnection,
    M::Error: Display,
{
    /// Service using the process-wide kind registry
    pub fn new(
        store: Arc<S>,
        executor: IngestionExecutor<M>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            resolver: RegistryResolver::new(store),
            kinds: GLOBAL_REGISTRY.clone(),
            executor,
            auth,
        }
    }

    /// Use `kinds` instead of the process-wide registry
    pub fn with_kinds(mut self, kinds: Arc<MetricRegistry>) -> Self {
        self.kinds = kinds;
        self
    }

    /// Replace the clock stamping registrations
    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.resolver = self.resolver.with_time_source(time);
        self
    }

    /// Verify an API token
    pub async fn authenticate(&self, token: &str) -> Result<VerifiedCaller, ServiceError> {
        self.auth.verify(token).await
    }

    /// Register a node and everything it references.
    ///
    /// Idempotent: a known `node_id` returns the stored node unchanged.
    pub async fn register_node(
        &self,
        caller: &VerifiedCaller,
        request: &RegisterNode,
    ) -> Result<NodeDetails, ServiceError> {
        debug!("{} registering node {}", caller, request.node_id.trim());
        Ok(self.resolver.resolve_node(request).await?)
    }

    /// Node joined with location, tags and custodian
    pub async fn fetch_node(&self, node_id: &str) -> Result<NodeDetails, ServiceError> {
        Ok(self.resolver.fetch_node(node_id).await?)
    }

    /// Up to `limit` nodes starting at `offset`; `limit` must be 1..=100
    pub async fn list_nodes(&self, offset: u64, limit: u32) -> Result<Vec<Node>, ServiceError> {
        let page = Page::new(offset, limit)?;
        Ok(self.resolver.list_nodes(page).await?)
    }

    /// Up to `limit` locations starting at `offset`; `limit` must be 1..=100
    pub async fn list_locations(
        &self,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Location>, ServiceError> {
        let page = Page::new(offset, limit)?;
        Ok(self.resolver.list_locations(page).await?)
    }

    /// Normalize, synthesize and append one envelope.
    ///
    /// Only envelope-level defects fail the call. Everything per kind,
    /// including persistence failures, is reported in the returned
    /// [`IngestReport`].
    pub async fn push_sensor_data(
        &self,
        caller: &VerifiedCaller,
        envelope: &SensorEnvelope,
    ) -> Result<IngestReport, ServiceError> {
        let normalizer = Normalizer::new(&self.kinds);
        let synthesizer = QuerySynthesizer::new(&self.kinds);
        let outcomes: Vec<KindOutcome> = normalizer.normalize(envelope)?.collect();

        let mut reports = Vec::with_capacity(outcomes.len());
        let mut pending = Vec::new();
        let mut statements: Vec<InsertStatement> = Vec::new();

        for outcome in outcomes {
            let kind = outcome.kind().to_string();
            let status = match outcome {
                KindOutcome::Record(record) => match synthesizer.synthesize(&kind, &record) {
                    Ok(statement) => {
                        pending.push(reports.len());
                        statements.push(statement);
                        None
                    }
                    Err(e) => Some(KindStatus::Failed {
                        error: e.to_string(),
                        retryable: false,
                    }),
                },
                KindOutcome::Empty { .. } => Some(KindStatus::Empty),
                KindOutcome::Unknown { .. } => Some(KindStatus::UnknownKind),
                KindOutcome::Invalid { issues, .. } => {
                    warn!(
                        "node {} sent invalid {} readings: {} issue(s)",
                        envelope.node_id,
                        kind,
                        issues.len()
                    );
                    Some(KindStatus::Invalid { issues })
                }
            };
            reports.push((kind, status));
        }

        let results = self.executor.execute_all(&statements).await;
        for ((index, statement), result) in pending.into_iter().zip(&statements).zip(results) {
            let status = match result {
                Ok(rows) => KindStatus::Persisted {
                    table: statement.table.clone(),
                    rows,
                },
                Err(e) => {
                    warn!("node {}: {}", envelope.node_id, e);
                    KindStatus::failed(&e)
                }
            };
            reports[index].1 = Some(status);
        }

        let report = IngestReport {
            node_id: envelope.node_id.trim().to_string(),
            kinds: reports
                .into_iter()
                .filter_map(|(kind, status)| status.map(|status| KindReport { kind, status }))
                .collect(),
        };

        info!(
            "{} pushed data for node {}: {} row(s), {:?}",
            caller,
            report.node_id,
            report.rows_persisted(),
            report.status()
        );
        Ok(report)
    }

    /// Kind registry in use
    pub fn kinds(&self) -> &Arc<MetricRegistry> {
        &self.kinds
    }

    /// Registry store behind the resolver
    pub fn store(&self) -> &Arc<S> {
        self.resolver.store()
    }

    /// Executor statistics
    pub fn stats(&self) -> ConnectionStats {
        self.executor.stats()
    }

    /// Close the ingestion pool; later pushes report `PoolClosed` per kind
    pub fn close(&self) {
        self.executor.close();
    }
}
