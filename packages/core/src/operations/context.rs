//! Engine Context
//!
//! Everything a record operation needs to run: the three engine stores, the
//! schema lookup, the gateway factory, record access, configuration and the
//! per-table transform registry. The context is cheap to clone (all shared
//! state behind `Arc`) and is threaded through constructors, pipelines and
//! replay instead of living in globals.

use crate::config::BridgeConfig;
use crate::db::{DeferredOperationStore, MappingStore, PendingRelationStore};
use crate::gateway::{GatewayFactory, RecordLookup};
use crate::operations::error::OperationError;
use crate::schema::SchemaLookup;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Hook applied to an operation's staged data before sanitization.
///
/// Installations register transforms per table for site-specific shaping of
/// incoming data (value mapping, derived fields). Transforms see and mutate
/// only the staged field data.
pub trait TableTransform: Send + Sync {
    fn apply(&self, data: &mut Map<String, Value>) -> Result<(), OperationError>;
}

/// Registry of per-table transform hooks
#[derive(Default)]
pub struct TableTransformRegistry {
    transforms: HashMap<String, Vec<Arc<dyn TableTransform>>>,
}

impl TableTransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform for a table; transforms run in registration order
    pub fn register(&mut self, table: impl Into<String>, transform: Arc<dyn TableTransform>) {
        self.transforms.entry(table.into()).or_default().push(transform);
    }

    /// Transforms registered for a table
    pub fn for_table(&self, table: &str) -> &[Arc<dyn TableTransform>] {
        self.transforms
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Shared collaborators and configuration for record operations
#[derive(Clone)]
pub struct EngineContext {
    /// Remote ID → internal uid mappings
    pub mappings: Arc<MappingStore>,

    /// Relations parked until their target exists
    pub pending: Arc<PendingRelationStore>,

    /// Whole operations queued on a dependency
    pub deferred: Arc<DeferredOperationStore>,

    /// Schema knowledge (relation types, localizability)
    pub schema: Arc<dyn SchemaLookup>,

    /// Produces a fresh persistence gateway per operation
    pub gateways: Arc<dyn GatewayFactory>,

    /// Read-only record access
    pub records: Arc<dyn RecordLookup>,

    /// Engine configuration
    pub config: Arc<BridgeConfig>,

    /// Per-table transform hooks
    pub transforms: Arc<TableTransformRegistry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct UppercaseTitle;

    impl TableTransform for UppercaseTitle {
        fn apply(&self, data: &mut Map<String, Value>) -> Result<(), OperationError> {
            if let Some(Value::String(title)) = data.get("title") {
                let upper = title.to_uppercase();
                data.insert("title".to_string(), Value::String(upper));
            }
            Ok(())
        }
    }

    #[test]
    fn test_transform_registry_dispatch() {
        let mut registry = TableTransformRegistry::new();
        registry.register("pages", Arc::new(UppercaseTitle));

        assert_eq!(registry.for_table("pages").len(), 1);
        assert!(registry.for_table("content").is_empty());

        let mut data = Map::new();
        data.insert("title".to_string(), json!("home"));
        for transform in registry.for_table("pages") {
            transform.apply(&mut data).unwrap();
        }
        assert_eq!(data["title"], json!("HOME"));
    }
}
