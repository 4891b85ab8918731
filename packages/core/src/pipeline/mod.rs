//! Operation Event Pipelines
//!
//! The lifecycle of a record operation is an ordered table of small,
//! single-responsibility steps invoked at two points: *setup* (before any
//! persistence call) and *commit* (the gateway call and everything after
//! it). Steps are plain functions dispatched by a `match` over the step
//! enum: adding a step means adding an enum variant, a function, and a
//! position in the table.
//!
//! Setup steps may end an operation early by returning [`Flow::Stop`]; the
//! commit pipeline runs to completion and communicates through the
//! operation's typed outbox.

pub mod commit;
pub mod relations;
pub mod resolve;
pub mod sanitize;
pub mod setup;
pub mod translation;

use crate::operations::context::EngineContext;
use crate::operations::error::{OperationError, StopReason};
use crate::operations::operation::RecordOperation;
use crate::schema::RelationConfig;
use serde_json::Value;

/// Namespace the ordering handler stashes its mapping metadata under
pub(crate) const RELATION_ORDER_NAMESPACE: &str = "relation_order";

/// Outcome of one setup step
#[derive(Debug)]
pub enum Flow {
    /// Proceed with the next step
    Continue,

    /// End the operation; a legitimate terminal state, not an error
    Stop(StopReason),
}

/// Setup phase steps, in execution order
#[derive(Debug, Clone, Copy)]
enum SetupStep {
    SkipDuplicate,
    DeferOnMissingDependency,
    RemoveNullFields,
    ValidateFieldNames,
    ApplyTableTransforms,
    SanitizeFieldValues,
    InsertTranslationFields,
    ResolveStorageLocation,
    StashRelationOrderIntent,
    SubstituteRelations,
}

const SETUP_PIPELINE: &[SetupStep] = &[
    SetupStep::SkipDuplicate,
    SetupStep::DeferOnMissingDependency,
    SetupStep::RemoveNullFields,
    SetupStep::ValidateFieldNames,
    SetupStep::ApplyTableTransforms,
    SetupStep::SanitizeFieldValues,
    SetupStep::InsertTranslationFields,
    SetupStep::ResolveStorageLocation,
    SetupStep::StashRelationOrderIntent,
    SetupStep::SubstituteRelations,
];

/// Run the setup pipeline over an operation
pub(crate) async fn run_setup(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
) -> Result<Flow, OperationError> {
    for step in SETUP_PIPELINE {
        let flow = match step {
            SetupStep::SkipDuplicate => setup::skip_duplicate(operation, ctx).await?,
            SetupStep::DeferOnMissingDependency => {
                setup::defer_on_missing_dependency(operation, ctx).await?
            }
            SetupStep::RemoveNullFields => setup::remove_null_fields(operation),
            SetupStep::ValidateFieldNames => setup::validate_field_names(operation, ctx)?,
            SetupStep::ApplyTableTransforms => setup::apply_table_transforms(operation, ctx)?,
            SetupStep::SanitizeFieldValues => sanitize::sanitize_field_values(operation, ctx)?,
            SetupStep::InsertTranslationFields => {
                translation::insert_translation_fields(operation, ctx)
            }
            SetupStep::ResolveStorageLocation => {
                translation::resolve_storage_location(operation, ctx).await?
            }
            SetupStep::StashRelationOrderIntent => {
                relations::stash_relation_order_intent(operation, ctx)
            }
            SetupStep::SubstituteRelations => {
                relations::substitute_relations(operation, ctx).await?
            }
        };
        if let Flow::Stop(_) = flow {
            return Ok(flow);
        }
    }
    Ok(Flow::Continue)
}

/// Commit phase steps, in execution order
#[derive(Debug, Clone, Copy)]
enum CommitStep {
    StageInlineCountMaintenance,
    Persist,
    CaptureNewUid,
    UpdateMapping,
    StashOrderMetadata,
    ParkPendingRelations,
    ResolveWaitingRelations,
    CleanUpDeletedRecord,
    ReplayDeferred,
}

const COMMIT_PIPELINE: &[CommitStep] = &[
    CommitStep::StageInlineCountMaintenance,
    CommitStep::Persist,
    CommitStep::CaptureNewUid,
    CommitStep::UpdateMapping,
    CommitStep::StashOrderMetadata,
    CommitStep::ParkPendingRelations,
    CommitStep::ResolveWaitingRelations,
    CommitStep::CleanUpDeletedRecord,
    CommitStep::ReplayDeferred,
];

/// Run the commit pipeline over an operation
pub(crate) async fn run_commit(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
    depth: usize,
) -> Result<(), OperationError> {
    let gateway = ctx.gateways.create_gateway();
    for step in COMMIT_PIPELINE {
        match step {
            CommitStep::StageInlineCountMaintenance => {
                commit::stage_inline_count_maintenance(operation, ctx, gateway.as_ref()).await?;
            }
            CommitStep::Persist => commit::persist(operation, ctx, gateway.as_ref()).await?,
            CommitStep::CaptureNewUid => {
                commit::capture_new_uid(operation, gateway.as_ref()).await?;
            }
            CommitStep::UpdateMapping => commit::update_mapping(operation, ctx).await?,
            CommitStep::StashOrderMetadata => commit::stash_order_metadata(operation, ctx).await?,
            CommitStep::ParkPendingRelations => {
                commit::park_pending_relations(operation, ctx).await?;
            }
            CommitStep::ResolveWaitingRelations => {
                resolve::resolve_waiting_relations(operation, ctx).await?;
            }
            CommitStep::CleanUpDeletedRecord => {
                resolve::clean_up_deleted_record(operation, ctx).await?;
            }
            CommitStep::ReplayDeferred => resolve::replay_step(operation, ctx, depth).await?,
        }
    }
    Ok(())
}

// --- helpers shared by several steps ---

/// How a field came to be classified as relational
pub(crate) enum RelationClass {
    /// The schema lookup classifies the field's type as relational
    Schema(RelationConfig),

    /// A configured override classifies it, evaluated against the
    /// operation's data
    Override,
}

/// Relational classification of a field, if any
pub(crate) fn relation_class(
    ctx: &EngineContext,
    operation: &RecordOperation,
    field: &str,
    record_type: Option<&str>,
) -> Option<RelationClass> {
    if ctx
        .config
        .is_relation_override(operation.table(), field, &operation.representation().data)
    {
        return Some(RelationClass::Override);
    }
    let config = ctx.schema.field_config(operation.table(), field, record_type)?;
    config.relation.map(RelationClass::Schema)
}

/// The operation's record type, read from its staged data
pub(crate) fn record_type_of(
    operation: &RecordOperation,
    ctx: &EngineContext,
) -> Option<String> {
    let field = ctx.schema.record_type_field(operation.table())?;
    operation.staged_data().get(&field).and_then(value_to_string)
}

/// Textual form of a scalar value (string or number)
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Whether a textual value names an internal uid rather than a remote ID
pub(crate) fn is_internal_id(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a stored relation value (comma-joined string or list) into entries
pub(crate) fn parse_relation_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(text)) => text
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::Array(items)) => items.iter().filter_map(value_to_string).collect(),
        Some(Value::Number(number)) => vec![number.to_string()],
        _ => Vec::new(),
    }
}
