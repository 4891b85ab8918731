//! Setup Steps: Short Circuits and Validation
//!
//! The first setup steps decide whether the operation should run at all
//! (duplicate of the previous call, missing dependency) and validate the
//! caller's field names before any value transformation happens.

use crate::operations::context::EngineContext;
use crate::operations::error::{OperationError, StopReason};
use crate::operations::operation::{OperationKind, RecordOperation};
use crate::pipeline::{is_internal_id, Flow};
use tracing::info;

/// Stop when the incoming call is byte-for-byte identical to the last
/// operation recorded for this remote ID.
///
/// This is the mechanism that makes the engine safe against naive retries
/// and duplicate delivery: the stored change-hash covers the operation kind
/// and its full canonical arguments (metadata included).
pub(crate) async fn skip_duplicate(
    operation: &RecordOperation,
    ctx: &EngineContext,
) -> Result<Flow, OperationError> {
    if ctx
        .mappings
        .is_same_as_previous(operation.composite_remote_id(), operation.hash())
        .await?
    {
        return Ok(Flow::Stop(StopReason::DuplicateOfPrevious));
    }
    Ok(Flow::Continue)
}

/// Defer the whole operation when a hard dependency is not mapped yet.
///
/// A hard dependency is a field whose value must resolve to an existing
/// record before the operation makes sense at all: the storage location,
/// plus any per-table fields named in the configuration. Soft dependencies
/// (ordinary relation values) are parked as pending relations instead and
/// do not stop the operation.
pub(crate) async fn defer_on_missing_dependency(
    operation: &RecordOperation,
    ctx: &EngineContext,
) -> Result<Flow, OperationError> {
    if !matches!(
        operation.kind(),
        OperationKind::Create | OperationKind::Update
    ) {
        return Ok(Flow::Continue);
    }

    let Some(dependency) = missing_dependency(operation, ctx).await? else {
        return Ok(Flow::Continue);
    };

    ctx.deferred
        .add(
            &dependency,
            operation.args().kind_name(),
            operation.args_value(),
            operation.hash(),
        )
        .await?;

    info!(
        remote_id = %operation.composite_remote_id(),
        dependency = %dependency,
        "operation deferred on missing dependency"
    );
    Ok(Flow::Stop(StopReason::MissingDependency {
        remote_id: dependency,
    }))
}

/// First dependency remote ID that is not mapped yet, if any
async fn missing_dependency(
    operation: &RecordOperation,
    ctx: &EngineContext,
) -> Result<Option<String>, OperationError> {
    let mut candidates: Vec<String> = Vec::new();

    if let Some(value) = operation.staged_data().get(&ctx.config.storage_field) {
        if let Some(text) = value.as_str() {
            if !is_internal_id(text) {
                candidates.push(text.to_string());
            }
        }
    }

    for field in ctx.config.dependency_fields_for(operation.table()) {
        if let Some(value) = operation.staged_data().get(field) {
            if let Some(text) = value.as_str() {
                if !is_internal_id(text) {
                    candidates.push(text.to_string());
                }
            }
        }
    }

    for candidate in candidates {
        if ctx.mappings.get(&candidate).await? == 0 {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Drop fields whose value is null; absence and null mean the same thing to
/// the persistence backend.
pub(crate) fn remove_null_fields(operation: &mut RecordOperation) -> Flow {
    operation.staged_data_mut().retain(|_, value| !value.is_null());
    Flow::Continue
}

/// Reject field names the schema does not know.
///
/// The storage field is the single exception: it addresses the record's
/// location rather than a column of its own.
pub(crate) fn validate_field_names(
    operation: &RecordOperation,
    ctx: &EngineContext,
) -> Result<Flow, OperationError> {
    for field in operation.staged_data().keys() {
        if field == &ctx.config.storage_field {
            continue;
        }
        if !ctx.schema.has_field(operation.table(), field) {
            return Err(OperationError::unknown_field(
                operation.table().to_string(),
                field.clone(),
            ));
        }
    }
    Ok(Flow::Continue)
}

/// Run the per-table transform hooks registered for this table
pub(crate) fn apply_table_transforms(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
) -> Result<Flow, OperationError> {
    let transforms = ctx.transforms.for_table(operation.table()).to_vec();
    for transform in transforms {
        transform.apply(operation.staged_data_mut())?;
    }
    Ok(Flow::Continue)
}
