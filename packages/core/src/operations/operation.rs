//! Record Operation State Machine
//!
//! One [`RecordOperation`] is the unit of work for a single create, update,
//! delete or copy call. It moves through
//! `constructed → prepared → (stopped | done)`:
//!
//! - Construction enforces the per-kind identity contracts (a create must
//!   target an unmapped remote ID, an update/delete a mapped one, a copy a
//!   valid target) and derives the idempotence hash from the canonical
//!   constructor arguments.
//! - [`prepare`](RecordOperation::prepare) runs the setup pipeline. A setup
//!   step may stop the operation (duplicate of the previous call, deferred
//!   on a missing dependency); stopped is a legitimate terminal state, not
//!   an error.
//! - [`invoke`](RecordOperation::invoke) commits through the persistence
//!   gateway and runs the after-commit pipeline (mapping maintenance,
//!   pending-relation handling, deferred replay). Invoking a stopped
//!   operation is a no-op.
//!
//! The operation kinds are a tagged union dispatched by `match`; handlers
//! never inspect concrete types, they inspect the kind.

use crate::operations::context::EngineContext;
use crate::operations::error::{OperationError, StopReason};
use crate::operations::hash::operation_hash;
use crate::operations::message::{Message, MessageKind, Outbox};
use crate::gateway::CopyTarget;
use crate::models::{RecordIdentifier, RecordRepresentation};
use crate::pipeline::{self, Flow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

/// Canonical constructor arguments of one operation.
///
/// This is the single serialized shape used for the idempotence hash and
/// for deferred-operation persistence: stable field ordering comes from the
/// canonical serializer, the explicit `kind` tag keeps the four operation
/// kinds distinguishable across replays and versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OperationArgs {
    /// Create a record under a not-yet-mapped remote ID
    Create {
        representation: RecordRepresentation,
        #[serde(default)]
        metadata: Map<String, Value>,
    },

    /// Update the record a remote ID is mapped to
    Update {
        representation: RecordRepresentation,
        #[serde(default)]
        metadata: Map<String, Value>,
    },

    /// Delete the record a remote ID is mapped to
    Delete {
        identifier: RecordIdentifier,
        #[serde(default)]
        metadata: Map<String, Value>,
    },

    /// Copy the record behind `source` to a target position, mapping the
    /// copy under `remote_id`
    Copy {
        source: RecordIdentifier,
        target_table: String,
        /// Positive: page uid the copy lands on. Negative: uid of the
        /// same-table record the copy is placed after.
        target: i64,
        remote_id: String,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
}

impl OperationArgs {
    /// Kind tag used in hashing and deferred persistence
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Copy { .. } => "copy",
        }
    }

    /// Remote ID the operation is about (for a copy: the copy's new ID)
    pub fn remote_id(&self) -> &str {
        match self {
            Self::Create { representation, .. } | Self::Update { representation, .. } => {
                representation.remote_id()
            }
            Self::Delete { identifier, .. } => &identifier.remote_id,
            Self::Copy { remote_id, .. } => remote_id,
        }
    }

    /// Convert a create into an update with identical arguments.
    ///
    /// Used by deferred replay when a create's target turned out to exist
    /// by the time the dependency resolved.
    pub fn into_update(self) -> Option<Self> {
        match self {
            Self::Create {
                representation,
                metadata,
            } => Some(Self::Update {
                representation,
                metadata,
            }),
            _ => None,
        }
    }
}

/// Resolved operation kind with construction-time context
#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Copy {
        source_uid: i64,
        target: CopyTarget,
    },
}

/// How staged writes address the record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordHandle {
    /// Existing record
    Uid(i64),

    /// Record that will be created by this operation's commit
    Placeholder(String),
}

impl RecordHandle {
    /// Identifier string the gateway addresses writes by
    pub fn as_gateway_id(&self) -> String {
        match self {
            Self::Uid(uid) => uid.to_string(),
            Self::Placeholder(token) => token.clone(),
        }
    }

    /// Resolved uid, if any
    pub fn uid(&self) -> Option<i64> {
        match self {
            Self::Uid(uid) => Some(*uid),
            Self::Placeholder(_) => None,
        }
    }
}

/// Lifecycle state of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    /// Constructed, setup pipeline not yet run
    Constructed,

    /// Setup pipeline ran to completion; ready to invoke
    Prepared,

    /// A setup step ended the operation early; terminal, not an error
    Stopped(StopReason),

    /// Committed and after-commit pipeline finished
    Done,
}

/// One create/update/delete/copy unit of work
pub struct RecordOperation {
    args: OperationArgs,
    args_value: Value,
    kind: OperationKind,
    representation: RecordRepresentation,
    metadata: Map<String, Value>,
    composite_remote_id: String,
    handle: RecordHandle,
    storage_pid: Option<i64>,
    staged_data: Map<String, Value>,
    outbox: Outbox,
    state: OperationState,
    commit_success: Option<bool>,
    error_log: Vec<String>,
    commit_payload: Value,
    hash: String,
}

impl RecordOperation {
    /// Construct an operation from canonical arguments, enforcing the
    /// per-kind identity contracts.
    ///
    /// # Errors
    ///
    /// - Create: [`OperationError::IdentityConflict`] if the remote ID
    ///   (with aspects) is already mapped
    /// - Update/Delete: [`OperationError::NotFound`] if it is not mapped
    /// - Copy: [`OperationError::NotFound`] for an unmapped source,
    ///   [`OperationError::InvalidArgument`] for a target table that is
    ///   neither the page table nor the source's own table,
    ///   [`OperationError::IdentityConflict`] for an already-mapped
    ///   resulting remote ID
    pub async fn from_args(
        ctx: &EngineContext,
        args: OperationArgs,
    ) -> Result<Self, OperationError> {
        let args_value = serde_json::to_value(&args)
            .map_err(|e| OperationError::invalid_argument(format!("unserializable arguments: {}", e)))?;
        let hash = operation_hash(args.kind_name(), &args_value);

        let (kind, representation, metadata, composite_remote_id, handle) = match &args {
            OperationArgs::Create {
                representation,
                metadata,
            } => {
                representation.identifier.validate()?;
                let composite = composite_remote_id(ctx, &representation.identifier);
                if ctx.mappings.exists(&composite).await? {
                    return Err(OperationError::identity_conflict(composite));
                }
                let placeholder = new_placeholder();
                (
                    OperationKind::Create,
                    representation.clone(),
                    metadata.clone(),
                    composite,
                    RecordHandle::Placeholder(placeholder),
                )
            }

            OperationArgs::Update {
                representation,
                metadata,
            } => {
                representation.identifier.validate()?;
                let composite = composite_remote_id(ctx, &representation.identifier);
                let uid = ctx.mappings.get(&composite).await?;
                if uid == 0 {
                    return Err(OperationError::not_found(composite));
                }
                let mut representation = representation.clone();
                representation.identifier.set_uid(uid);
                (
                    OperationKind::Update,
                    representation,
                    metadata.clone(),
                    composite,
                    RecordHandle::Uid(uid),
                )
            }

            OperationArgs::Delete {
                identifier,
                metadata,
            } => {
                identifier.validate()?;
                let composite = composite_remote_id(ctx, identifier);
                let uid = ctx.mappings.get(&composite).await?;
                if uid == 0 {
                    return Err(OperationError::not_found(composite));
                }
                let mut identifier = identifier.clone();
                identifier.set_uid(uid);
                let representation = RecordRepresentation::empty(identifier)?;
                (
                    OperationKind::Delete,
                    representation,
                    metadata.clone(),
                    composite,
                    RecordHandle::Uid(uid),
                )
            }

            OperationArgs::Copy {
                source,
                target_table,
                target,
                remote_id,
                metadata,
            } => {
                source.validate()?;
                let source_composite = composite_remote_id(ctx, source);
                let source_uid = ctx.mappings.get(&source_composite).await?;
                if source_uid == 0 {
                    return Err(OperationError::not_found(source_composite));
                }
                if target_table != &ctx.config.page_table && target_table != &source.table {
                    return Err(OperationError::invalid_argument(format!(
                        "copy target table must be {} or {}, got {}",
                        ctx.config.page_table, source.table, target_table
                    )));
                }
                if ctx.mappings.exists(remote_id).await? {
                    return Err(OperationError::identity_conflict(remote_id.clone()));
                }
                let mut identifier = RecordIdentifier::new(source.table.clone(), remote_id.clone());
                if let Some(workspace) = source.workspace {
                    identifier = identifier.in_workspace(workspace);
                }
                let representation = RecordRepresentation::empty(identifier)?;
                (
                    OperationKind::Copy {
                        source_uid,
                        target: CopyTarget::from_signed(*target),
                    },
                    representation,
                    metadata.clone(),
                    remote_id.clone(),
                    RecordHandle::Placeholder(new_placeholder()),
                )
            }
        };

        let staged_data = representation.data.clone();

        debug!(
            kind = args.kind_name(),
            remote_id = %composite_remote_id,
            table = %representation.identifier.table,
            "record operation constructed"
        );

        Ok(Self {
            args,
            args_value,
            kind,
            representation,
            metadata,
            composite_remote_id,
            handle,
            storage_pid: None,
            staged_data,
            outbox: Outbox::new(),
            state: OperationState::Constructed,
            commit_success: None,
            error_log: Vec::new(),
            commit_payload: Value::Null,
            hash,
        })
    }

    /// Run the setup pipeline.
    ///
    /// A stop signal raised by a setup step (duplicate of the previous
    /// call, deferred on a missing dependency) moves the operation to the
    /// stopped state and returns `Ok`; stopping is not an error.
    pub async fn prepare(&mut self, ctx: &EngineContext) -> Result<(), OperationError> {
        if self.state != OperationState::Constructed {
            return Ok(());
        }
        match pipeline::run_setup(self, ctx).await? {
            Flow::Continue => {
                self.state = OperationState::Prepared;
            }
            Flow::Stop(reason) => {
                info!(
                    remote_id = %self.composite_remote_id,
                    ?reason,
                    "record operation stopped during setup"
                );
                self.state = OperationState::Stopped(reason);
            }
        }
        Ok(())
    }

    /// Commit the operation and run the after-commit pipeline.
    ///
    /// No-op for stopped operations. On success returns the record's
    /// internal uid (`None` only for stopped operations).
    ///
    /// # Errors
    ///
    /// - [`OperationError::DataHandler`] when the gateway reported errors;
    ///   carries the error log and the staged payload for diagnostics
    /// - [`OperationError::Incomplete`] when a required message was never
    ///   consumed by any pipeline step
    pub async fn invoke(&mut self, ctx: &EngineContext) -> Result<Option<i64>, OperationError> {
        self.invoke_at_depth(ctx, 0).await
    }

    /// Invoke with an explicit replay chain depth (used by deferred replay)
    pub(crate) async fn invoke_at_depth(
        &mut self,
        ctx: &EngineContext,
        depth: usize,
    ) -> Result<Option<i64>, OperationError> {
        match &self.state {
            OperationState::Stopped(reason) => {
                debug!(
                    remote_id = %self.composite_remote_id,
                    ?reason,
                    "skipping invocation of stopped operation"
                );
                return Ok(None);
            }
            OperationState::Done => return Ok(self.uid()),
            OperationState::Constructed => {
                return Err(OperationError::invalid_argument(
                    "operation invoked before prepare",
                ));
            }
            OperationState::Prepared => {}
        }

        pipeline::run_commit(self, ctx, depth).await?;

        if !self.is_successful().unwrap_or(false) {
            return Err(OperationError::data_handler(
                self.error_log.clone(),
                self.commit_payload.clone(),
            ));
        }

        let unconsumed = self.outbox.unconsumed_required();
        if !unconsumed.is_empty() {
            return Err(OperationError::Incomplete { kinds: unconsumed });
        }

        self.state = OperationState::Done;
        info!(
            kind = self.args.kind_name(),
            remote_id = %self.composite_remote_id,
            uid = self.uid(),
            "record operation done"
        );
        Ok(self.uid())
    }

    /// Commit outcome: `None` before execution, then the gateway verdict.
    ///
    /// Lazily pulls the latest commit-outcome message from the queue and
    /// caches it.
    pub fn is_successful(&mut self) -> Option<bool> {
        if self.commit_success.is_none() {
            if let Some(Message::CommitOutcome { success }) =
                self.outbox.take_latest(MessageKind::CommitOutcome)
            {
                self.commit_success = Some(success);
            }
        }
        self.commit_success
    }

    /// Whether a commit has been attempted
    pub fn has_executed(&mut self) -> bool {
        self.is_successful().is_some()
    }

    // --- accessors used by pipeline steps and callers ---

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn args(&self) -> &OperationArgs {
        &self.args
    }

    /// Canonical argument serialization (deferred-operation persistence)
    pub fn args_value(&self) -> &Value {
        &self.args_value
    }

    pub fn representation(&self) -> &RecordRepresentation {
        &self.representation
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn table(&self) -> &str {
        &self.representation.identifier.table
    }

    /// Remote ID with aspects, the identity all stores are keyed by
    pub fn composite_remote_id(&self) -> &str {
        &self.composite_remote_id
    }

    pub fn state(&self) -> &OperationState {
        &self.state
    }

    /// Idempotence hash over kind and canonical arguments
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn handle(&self) -> &RecordHandle {
        &self.handle
    }

    /// Resolved internal uid, if known
    pub fn uid(&self) -> Option<i64> {
        self.handle.uid()
    }

    /// Record the uid assigned by the gateway commit
    pub fn set_resolved_uid(&mut self, uid: i64) {
        self.handle = RecordHandle::Uid(uid);
        self.representation.identifier.set_uid(uid);
    }

    pub fn storage_pid(&self) -> Option<i64> {
        self.storage_pid
    }

    pub fn set_storage_pid(&mut self, pid: i64) {
        self.storage_pid = Some(pid);
    }

    /// Field data staged for the gateway (transformed by the pipeline)
    pub fn staged_data(&self) -> &Map<String, Value> {
        &self.staged_data
    }

    pub fn staged_data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.staged_data
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    /// Gateway error log captured by the persist step
    pub fn error_log(&self) -> &[String] {
        &self.error_log
    }

    pub(crate) fn set_commit_result(&mut self, errors: Vec<String>, payload: Value) {
        self.error_log = errors;
        self.commit_payload = payload;
    }
}

/// Remote ID with aspects for an identifier, per configuration and schema
pub(crate) fn composite_remote_id(ctx: &EngineContext, identifier: &RecordIdentifier) -> String {
    identifier.remote_id_with_aspects(
        ctx.schema.is_localizable(&identifier.table),
        &ctx.config.aspect_separator,
    )
}

/// Placeholder token for a record that does not exist yet
fn new_placeholder() -> String {
    format!("NEW{}", Uuid::new_v4().simple())
}
