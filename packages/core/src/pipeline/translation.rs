//! Translation Fields and Storage Location
//!
//! Two setup concerns that fill in values the caller did not supply: the
//! localization pointer fields for translated records, and the storage page
//! a record lands on.

use crate::operations::context::EngineContext;
use crate::operations::error::OperationError;
use crate::operations::operation::{OperationKind, RecordOperation};
use crate::pipeline::Flow;
use serde_json::{json, Value};

/// Fill in the localization fields of a translated record.
///
/// Applies only when the target language is non-default, the table is
/// localizable and the caller did not set the language field explicitly.
/// Then:
///
/// - the language field gets the numeric language id
/// - the pointer to the default-language original gets the remote ID with
///   its language aspect stripped, unless the caller set it
/// - the pointer to the nearest translation source is rewritten to the
///   stripped remote ID only when the caller set that field; unlike the
///   other two this one never appears on its own
pub(crate) fn insert_translation_fields(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
) -> Flow {
    if !matches!(
        operation.kind(),
        OperationKind::Create | OperationKind::Update
    ) {
        return Flow::Continue;
    }

    let identifier = operation.representation().identifier.clone();
    let Some(language) = identifier.language else {
        return Flow::Continue;
    };
    if !identifier.is_translation() || !ctx.schema.is_localizable(operation.table()) {
        return Flow::Continue;
    }
    let Some(language_field) = ctx.schema.language_field(operation.table()) else {
        return Flow::Continue;
    };
    if operation.staged_data().contains_key(&language_field) {
        return Flow::Continue;
    }

    let base_remote_id = identifier.base_remote_id().to_string();
    operation
        .staged_data_mut()
        .insert(language_field, json!(language));

    if let Some(origin_field) = ctx.schema.translation_origin_field(operation.table()) {
        if !operation.staged_data().contains_key(&origin_field) {
            operation
                .staged_data_mut()
                .insert(origin_field, json!(base_remote_id));
        }
    }

    if let Some(source_field) = ctx.schema.translation_source_field(operation.table()) {
        if operation.staged_data().contains_key(&source_field) {
            operation
                .staged_data_mut()
                .insert(source_field, json!(base_remote_id));
        }
    }

    Flow::Continue
}

/// Resolve where the record is stored.
///
/// The staged storage value may be a numeric page uid or the remote ID of a
/// page; remote IDs are resolved through the mapping store. A create
/// without a storage value falls back to the configured default page; an
/// update without one leaves the location untouched.
pub(crate) async fn resolve_storage_location(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
) -> Result<Flow, OperationError> {
    if !matches!(
        operation.kind(),
        OperationKind::Create | OperationKind::Update
    ) {
        return Ok(Flow::Continue);
    }

    let storage_field = ctx.config.storage_field.clone();
    let staged = operation.staged_data().get(&storage_field).cloned();

    let pid = match staged {
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(text)) => {
            if let Ok(uid) = text.parse::<i64>() {
                Some(uid)
            } else {
                // An unmapped remote ID would have deferred the operation
                // already; hitting 0 here means the mapping vanished since.
                let uid = ctx.mappings.get(&text).await?;
                if uid == 0 {
                    return Err(OperationError::not_found(text));
                }
                Some(uid)
            }
        }
        Some(other) => {
            return Err(OperationError::invalid_argument(format!(
                "storage field {} must be a page uid or remote ID, got: {}",
                storage_field, other
            )));
        }
        None => match operation.kind() {
            OperationKind::Create => Some(ctx.config.default_storage_page),
            _ => None,
        },
    };

    if let Some(pid) = pid {
        operation.set_storage_pid(pid);
        operation.staged_data_mut().insert(storage_field, json!(pid));
    }
    Ok(Flow::Continue)
}
