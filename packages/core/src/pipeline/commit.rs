//! Commit Steps: Persistence and Mapping Maintenance
//!
//! The first commit step pushes the staged batch through the persistence
//! gateway and records the outcome as a message; the steps after it capture
//! the assigned uid and keep the remote ID mapping store in sync with what
//! was just written.

use crate::db::StoreError;
use crate::operations::context::EngineContext;
use crate::operations::error::OperationError;
use crate::operations::message::{Consumption, Message, MessageKind};
use crate::operations::operation::{OperationKind, RecordHandle, RecordOperation};
use crate::pipeline::{value_to_string, RELATION_ORDER_NAMESPACE};
use crate::gateway::{Command, PersistenceGateway};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Stage decremented child counters on inline parents before a delete.
///
/// The backend's cascade does not re-derive an inline parent's counter
/// field when a child is removed via a command rather than through the
/// parent's own field, so the new count is written directly.
pub(crate) async fn stage_inline_count_maintenance(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
    gateway: &dyn PersistenceGateway,
) -> Result<(), OperationError> {
    if !matches!(operation.kind(), OperationKind::Delete) {
        return Ok(());
    }
    let Some(uid) = operation.uid() else {
        return Ok(());
    };
    let child_table = operation.table().to_string();
    let Some(child_row) = ctx.records.get_record(&child_table, uid).await? else {
        return Ok(());
    };

    for inline_ref in ctx.schema.inline_relations_to(&child_table) {
        let Some(parent_uid) = child_row
            .field(&inline_ref.child_foreign_field)
            .and_then(value_to_string)
            .and_then(|text| text.parse::<i64>().ok())
        else {
            continue;
        };
        let Some(parent) = ctx
            .records
            .get_record(&inline_ref.foreign_table, parent_uid)
            .await?
        else {
            continue;
        };

        if !inline_ref.record_types.is_empty() {
            let parent_type = ctx
                .schema
                .record_type_field(&inline_ref.foreign_table)
                .and_then(|field| parent.field(&field).and_then(value_to_string));
            match parent_type {
                Some(parent_type) if inline_ref.record_types.contains(&parent_type) => {}
                _ => continue,
            }
        }

        let count = ctx
            .records
            .count_children(&child_table, &inline_ref.child_foreign_field, parent_uid)
            .await?;
        let decremented = (count - 1).max(0);
        debug!(
            parent_table = %inline_ref.foreign_table,
            parent_uid,
            field = %inline_ref.field,
            decremented,
            "staging inline child count maintenance"
        );
        gateway
            .stage_field_write(
                &inline_ref.foreign_table,
                &parent_uid.to_string(),
                &inline_ref.field,
                json!(decremented),
            )
            .await?;
    }
    Ok(())
}

/// Stage the operation's writes and commands, commit both batches and
/// record the outcome.
pub(crate) async fn persist(
    operation: &mut RecordOperation,
    _ctx: &EngineContext,
    gateway: &dyn PersistenceGateway,
) -> Result<(), OperationError> {
    let table = operation.table().to_string();
    let gateway_id = operation.handle().as_gateway_id();

    match operation.kind() {
        OperationKind::Create | OperationKind::Update => {
            for (field, value) in operation.staged_data().clone() {
                gateway
                    .stage_field_write(&table, &gateway_id, &field, value)
                    .await?;
            }
        }
        OperationKind::Delete => {
            let uid = operation.uid().ok_or_else(|| {
                OperationError::invalid_argument("delete operation without resolved uid")
            })?;
            gateway.stage_command(&table, uid, Command::Delete).await?;
        }
        OperationKind::Copy { source_uid, target } => {
            gateway
                .stage_command(
                    &table,
                    *source_uid,
                    Command::Copy {
                        target: *target,
                        placeholder: gateway_id.clone(),
                    },
                )
                .await?;
        }
    }

    gateway.commit_field_writes().await?;
    gateway.commit_commands().await?;

    let errors = gateway.errors().await;
    let success = errors.is_empty();
    let payload = json!({
        "table": table,
        "id": gateway_id,
        "kind": operation.args().kind_name(),
        "data": Value::Object(operation.staged_data().clone()),
    });
    operation.set_commit_result(errors, payload);
    operation
        .outbox_mut()
        .push(Message::CommitOutcome { success }, Consumption::Required);
    Ok(())
}

/// Resolve the operation's placeholder to the uid the gateway assigned
pub(crate) async fn capture_new_uid(
    operation: &mut RecordOperation,
    gateway: &dyn PersistenceGateway,
) -> Result<(), OperationError> {
    if operation.is_successful() != Some(true) {
        return Ok(());
    }
    let RecordHandle::Placeholder(token) = operation.handle().clone() else {
        return Ok(());
    };
    match gateway.new_id_for(&token).await {
        Some(uid) => {
            operation.set_resolved_uid(uid);
            Ok(())
        }
        None => Err(OperationError::data_handler(
            vec![format!("no uid assigned for placeholder {}", token)],
            Value::Null,
        )),
    }
}

/// Keep the remote ID mapping in sync with the committed operation:
/// insert for create/copy, hash refresh for update. Deletes are handled by
/// the cleanup step.
pub(crate) async fn update_mapping(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
) -> Result<(), OperationError> {
    if operation.is_successful() != Some(true) {
        return Ok(());
    }
    match operation.kind() {
        OperationKind::Create | OperationKind::Copy { .. } => {
            let uid = operation.uid().ok_or_else(|| {
                OperationError::invalid_argument("committed operation without resolved uid")
            })?;
            ctx.mappings
                .add(
                    operation.composite_remote_id(),
                    operation.table(),
                    uid,
                    operation.hash(),
                )
                .await
                .map_err(|error| match error {
                    StoreError::DuplicateRemoteId { remote_id } => {
                        OperationError::identity_conflict(remote_id)
                    }
                    other => OperationError::from(other),
                })?;
        }
        OperationKind::Update => {
            ctx.mappings
                .update_hash(operation.composite_remote_id(), operation.hash())
                .await?;
        }
        OperationKind::Delete => {}
    }
    Ok(())
}

/// Stash the captured ordering intents as per-remote-ID mapping metadata
pub(crate) async fn stash_order_metadata(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
) -> Result<(), OperationError> {
    let messages = operation
        .outbox_mut()
        .take_all(MessageKind::RelationOrderIntent);
    if messages.is_empty() || operation.is_successful() != Some(true) {
        return Ok(());
    }

    let mut intents = match ctx
        .mappings
        .get_meta_value(operation.composite_remote_id(), RELATION_ORDER_NAMESPACE)
        .await?
    {
        Some(Value::Object(existing)) => existing,
        _ => Map::new(),
    };
    for message in messages {
        if let Message::RelationOrderIntent { field, remote_ids } = message {
            intents.insert(field, json!(remote_ids));
        }
    }
    ctx.mappings
        .set_meta_value(
            operation.composite_remote_id(),
            RELATION_ORDER_NAMESPACE,
            &Value::Object(intents),
        )
        .await?;
    Ok(())
}

/// Persist the unresolved relation values collected during setup as
/// pending-relation rows keyed by the record's now-known uid
pub(crate) async fn park_pending_relations(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
) -> Result<(), OperationError> {
    let messages = operation
        .outbox_mut()
        .take_all(MessageKind::PendingRelations);
    if operation.is_successful() != Some(true) {
        return Ok(());
    }
    let Some(uid) = operation.uid() else {
        return Ok(());
    };
    for message in messages {
        if let Message::PendingRelations(pending) = message {
            ctx.pending
                .set(operation.table(), &pending.field, uid, &pending.remote_ids)
                .await?;
        }
    }
    Ok(())
}
