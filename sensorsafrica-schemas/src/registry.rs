//! Metric Kind Registry
//!
//! Central, thread-safe lookup from kind name to definition. Readers get an
//! `Arc` snapshot of a kind, so a normalization in flight is unaffected by a
//! later registration.

use log::error;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{schemas, MetricKind, SchemaError};

/// Thread-safe registry of metric kinds, iterated in name order
#[derive(Debug, Default)]
pub struct MetricRegistry {
    kinds: RwLock<BTreeMap<String, Arc<MetricKind>>>,
}

impl MetricRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in kinds
    pub fn with_defaults() -> Result<Self, SchemaError> {
        let registry = Self::new();
        registry.load_defaults()?;
        Ok(registry)
    }

    // Writers only ever insert a fully checked kind, so a map behind a
    // poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<MetricKind>>> {
        self.kinds.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<MetricKind>>> {
        self.kinds.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a kind; names and tables must be unused
    pub fn register(&self, kind: MetricKind) -> Result<(), SchemaError> {
        kind.check()?;

        let mut kinds = self.write();
        if kinds.contains_key(&kind.name) {
            return Err(SchemaError::DuplicateKind(kind.name));
        }
        if let Some(other) = kinds.values().find(|k| k.table == kind.table) {
            return Err(SchemaError::InvalidDefinition {
                kind: kind.name.clone(),
                reason: format!("table {} already used by {}", kind.table, other.name),
            });
        }

        kinds.insert(kind.name.clone(), Arc::new(kind));
        Ok(())
    }

    /// Kind by name, if registered
    pub fn lookup(&self, name: &str) -> Option<Arc<MetricKind>> {
        self.read().get(name).cloned()
    }

    /// Kind by name, or `UnknownKind`
    pub fn get(&self, name: &str) -> Result<Arc<MetricKind>, SchemaError> {
        self.lookup(name)
            .ok_or_else(|| SchemaError::UnknownKind(name.to_string()))
    }

    /// Whether a kind is registered
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Every registered kind, by name
    pub fn kinds(&self) -> Vec<Arc<MetricKind>> {
        self.read().values().cloned().collect()
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no kinds are registered
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Register the built-in kinds
    pub fn load_defaults(&self) -> Result<(), SchemaError> {
        for kind in schemas::defaults()? {
            self.register(kind)?;
        }
        Ok(())
    }
}

lazy_static::lazy_static! {
    /// Process-wide registry with the built-in kinds loaded
    pub static ref GLOBAL_REGISTRY: Arc<MetricRegistry> = {
        let registry = MetricRegistry::new();
        if let Err(e) = registry.load_defaults() {
            error!("failed to load built-in metric kinds: {}", e);
        }
        Arc::new(registry)
    };
}
