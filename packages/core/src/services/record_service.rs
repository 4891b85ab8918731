//! Record Service - Operation Lifecycle Facade
//!
//! The entry point transport layers (REST handlers, CLI commands) call into:
//! construct-and-invoke for each operation kind, sequential batch execution
//! with per-item capture, and the read-only statistics surface used by
//! operational tooling.

use crate::config::BridgeConfig;
use crate::db::{
    DatabaseService, DeferredOperationStore, MappingCache, MappingStore, PendingRelationStat,
    PendingRelationStore, StoreError,
};
use crate::gateway::{TursoGatewayFactory, TursoRecords};
use crate::models::{RecordIdentifier, RecordRepresentation};
use crate::operations::{
    EngineContext, OperationArgs, OperationError, RecordOperation, TableTransformRegistry,
};
use crate::schema::SchemaLookup;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one item in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ItemStatus {
    /// The operation ran (or was legitimately stopped); `uid` is absent for
    /// stopped operations
    Succeeded { uid: Option<i64> },

    /// The operation failed; `code` is the stable error code
    Failed { code: String, message: String },
}

/// Structured result of a batch call, keyed by remote ID
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Per-item outcome keyed by the item's remote ID
    pub statuses: BTreeMap<String, ItemStatus>,

    /// Number of items that succeeded (stopped items count as success)
    pub succeeded: usize,

    /// Number of items that failed
    pub failed: usize,
}

impl BatchReport {
    /// Whether every single item failed
    pub fn all_failed(&self) -> bool {
        self.succeeded == 0 && self.failed > 0
    }
}

/// Facade over the record-operation engine
pub struct RecordService {
    ctx: EngineContext,
}

impl RecordService {
    /// Create a service over an existing engine context
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Wire a service over a database, using the bundled reference gateway
    /// and record lookup.
    pub fn with_database(
        db: Arc<DatabaseService>,
        schema: Arc<dyn SchemaLookup>,
        config: BridgeConfig,
    ) -> Self {
        let records = Arc::new(TursoRecords::new(db.clone()));
        let cache = Arc::new(MappingCache::new());
        let ctx = EngineContext {
            mappings: Arc::new(MappingStore::new(db.clone(), cache, records.clone())),
            pending: Arc::new(PendingRelationStore::new(db.clone())),
            deferred: Arc::new(DeferredOperationStore::new(db.clone())),
            schema,
            gateways: Arc::new(TursoGatewayFactory::new(db)),
            records,
            config: Arc::new(config),
            transforms: Arc::new(TableTransformRegistry::new()),
        };
        Self { ctx }
    }

    /// Shared engine context (stores, schema, configuration)
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Create a record under a not-yet-mapped remote ID.
    ///
    /// Returns the new internal uid, or `None` when the operation was
    /// stopped (duplicate of the previous call, deferred on a dependency).
    pub async fn create(
        &self,
        representation: RecordRepresentation,
        metadata: Map<String, Value>,
    ) -> Result<Option<i64>, OperationError> {
        self.execute(OperationArgs::Create {
            representation,
            metadata,
        })
        .await
    }

    /// Update the record a remote ID is mapped to
    pub async fn update(
        &self,
        representation: RecordRepresentation,
        metadata: Map<String, Value>,
    ) -> Result<Option<i64>, OperationError> {
        self.execute(OperationArgs::Update {
            representation,
            metadata,
        })
        .await
    }

    /// Delete the record a remote ID is mapped to
    pub async fn delete(
        &self,
        identifier: RecordIdentifier,
        metadata: Map<String, Value>,
    ) -> Result<Option<i64>, OperationError> {
        self.execute(OperationArgs::Delete {
            identifier,
            metadata,
        })
        .await
    }

    /// Copy a record to a target position, mapping the copy under a new
    /// remote ID. A positive target names a page, a negative target the
    /// same-table record the copy is placed after.
    pub async fn copy(
        &self,
        source: RecordIdentifier,
        target_table: impl Into<String>,
        target: i64,
        remote_id: impl Into<String>,
        metadata: Map<String, Value>,
    ) -> Result<Option<i64>, OperationError> {
        self.execute(OperationArgs::Copy {
            source,
            target_table: target_table.into(),
            target,
            remote_id: remote_id.into(),
            metadata,
        })
        .await
    }

    /// Run one operation through its full lifecycle
    pub async fn execute(&self, args: OperationArgs) -> Result<Option<i64>, OperationError> {
        let mut operation = RecordOperation::from_args(&self.ctx, args).await?;
        operation.prepare(&self.ctx).await?;
        operation.invoke(&self.ctx).await
    }

    /// Run a batch of operations sequentially and independently.
    ///
    /// Each item's failure is captured in the report instead of aborting
    /// the batch; there is no cross-item transaction.
    pub async fn execute_batch(&self, items: Vec<OperationArgs>) -> BatchReport {
        let mut report = BatchReport::default();
        for args in items {
            let remote_id = args.remote_id().to_string();
            match self.execute(args).await {
                Ok(uid) => {
                    report.succeeded += 1;
                    report
                        .statuses
                        .insert(remote_id, ItemStatus::Succeeded { uid });
                }
                Err(error) => {
                    warn!(remote_id = %remote_id, %error, "batch item failed");
                    report.failed += 1;
                    report.statuses.insert(
                        remote_id,
                        ItemStatus::Failed {
                            code: error.code().to_string(),
                            message: error.to_string(),
                        },
                    );
                }
            }
        }
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "batch finished"
        );
        report
    }

    /// Per-table counts of waiting and resolvable pending relations
    pub async fn pending_relation_stats(&self) -> Result<Vec<PendingRelationStat>, StoreError> {
        self.ctx.pending.stats().await
    }

    /// Number of operations currently parked in the deferred store
    pub async fn deferred_operation_count(&self) -> Result<i64, StoreError> {
        self.ctx.deferred.count().await
    }
}
