//! Resolution Steps: Waiting Relations, Cleanup, Replay
//!
//! Once an operation has committed, its remote ID may be exactly what other
//! records and operations have been waiting for. These steps splice the new
//! uid into waiting relation fields (honoring declared ordering intent),
//! clean up after deletes, and replay deferred operations.

use crate::operations::context::EngineContext;
use crate::operations::error::OperationError;
use crate::operations::operation::{OperationKind, RecordOperation};
use crate::operations::replay::replay_deferred;
use crate::pipeline::{
    is_internal_id, parse_relation_list, value_to_string, RELATION_ORDER_NAMESPACE,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Splice this record's uid into every relation field waiting on its
/// remote ID, then drop the consumed pending rows.
pub(crate) async fn resolve_waiting_relations(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
) -> Result<(), OperationError> {
    if operation.is_successful() != Some(true) {
        return Ok(());
    }
    if matches!(operation.kind(), OperationKind::Delete) {
        return Ok(());
    }
    let my_remote_id = operation.composite_remote_id().to_string();
    let my_table = operation.table().to_string();
    let Some(my_uid) = operation.uid() else {
        return Ok(());
    };

    let waiters = ctx.pending.get(&my_remote_id).await?;
    if waiters.is_empty() {
        return Ok(());
    }
    info!(
        remote_id = %my_remote_id,
        count = waiters.len(),
        "resolving relations waiting on remote ID"
    );

    for waiter in &waiters {
        let Some(record) = ctx.records.get_record(&waiter.table, waiter.record_uid).await? else {
            // Owner vanished since parking; its row is dropped below.
            continue;
        };

        let multi_table = ctx
            .schema
            .field_config(&waiter.table, &waiter.field, None)
            .and_then(|config| config.relation)
            .map(|relation| relation.is_multi_table())
            .unwrap_or(false);
        let token = if multi_table {
            format!("{}_{}", my_table, my_uid)
        } else {
            my_uid.to_string()
        };

        let existing = parse_relation_list(record.field(&waiter.field));
        let mut values = existing.clone();
        if !values.contains(&token) {
            values.push(token.clone());
        }

        // Honor an ordering intent the owner declared for this field, if it
        // covers the record that just appeared.
        if let Some(owner_remote_id) = ctx
            .mappings
            .remote_id_for(&waiter.table, waiter.record_uid)
            .await?
        {
            if let Some(Value::Object(intents)) = ctx
                .mappings
                .get_meta_value(&owner_remote_id, RELATION_ORDER_NAMESPACE)
                .await?
            {
                if let Some(Value::Array(intent)) = intents.get(&waiter.field) {
                    let intent_ids: Vec<String> =
                        intent.iter().filter_map(value_to_string).collect();
                    if intent_ids.iter().any(|id| id == &my_remote_id) {
                        values = splice_order(ctx, values, &intent_ids, multi_table).await?;
                    }
                }
            }
        }

        if values == existing {
            // The stored order already matches; a rewrite would be redundant.
            debug!(
                table = %waiter.table,
                uid = waiter.record_uid,
                field = %waiter.field,
                "skipping redundant relation write"
            );
            continue;
        }

        let outgoing = if multi_table {
            Value::Array(values.into_iter().map(Value::String).collect())
        } else {
            json!(values.join(","))
        };

        let gateway = ctx.gateways.create_gateway();
        gateway
            .stage_field_write(
                &waiter.table,
                &waiter.record_uid.to_string(),
                &waiter.field,
                outgoing,
            )
            .await?;
        gateway.commit_field_writes().await?;
        let errors = gateway.errors().await;
        if !errors.is_empty() {
            warn!(
                table = %waiter.table,
                uid = waiter.record_uid,
                field = %waiter.field,
                ?errors,
                "pending relation splice rejected by gateway"
            );
        }
    }

    ctx.pending.remove_remote(&my_remote_id).await?;
    Ok(())
}

/// Recompute a relation list so the subset covered by the declared intent
/// appears in intent order, leaving uncovered entries where they are.
async fn splice_order(
    ctx: &EngineContext,
    values: Vec<String>,
    intent_ids: &[String],
    multi_table: bool,
) -> Result<Vec<String>, OperationError> {
    let mut intent_tokens: Vec<String> = Vec::with_capacity(intent_ids.len());
    for id in intent_ids {
        if is_internal_id(id) {
            intent_tokens.push(id.clone());
            continue;
        }
        let uid = ctx.mappings.get(id).await?;
        if uid == 0 {
            // Still unmapped; it will be spliced when it arrives.
            continue;
        }
        if multi_table {
            let table = ctx.mappings.table_for(id).await?.unwrap_or_default();
            intent_tokens.push(format!("{}_{}", table, uid));
        } else {
            intent_tokens.push(uid.to_string());
        }
    }

    let covered: HashSet<&String> = intent_tokens.iter().collect();
    let mut replacement = intent_tokens
        .iter()
        .filter(|token| values.contains(*token));
    Ok(values
        .iter()
        .map(|value| {
            if covered.contains(value) {
                replacement.next().cloned().unwrap_or_else(|| value.clone())
            } else {
                value.clone()
            }
        })
        .collect())
}

/// After a successful delete: drop the mapping and every pending relation
/// the deleted record owned, across all fields.
pub(crate) async fn clean_up_deleted_record(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
) -> Result<(), OperationError> {
    if operation.is_successful() != Some(true) {
        return Ok(());
    }
    if !matches!(operation.kind(), OperationKind::Delete) {
        return Ok(());
    }
    let Some(uid) = operation.uid() else {
        return Ok(());
    };
    ctx.mappings.remove(operation.composite_remote_id()).await?;
    ctx.pending
        .remove_local(operation.table(), None, uid)
        .await?;
    Ok(())
}

/// Replay operations deferred on this operation's remote ID
pub(crate) async fn replay_step(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
    depth: usize,
) -> Result<(), OperationError> {
    if operation.is_successful() != Some(true) {
        return Ok(());
    }
    if matches!(operation.kind(), OperationKind::Delete) {
        return Ok(());
    }
    replay_deferred(ctx, operation.composite_remote_id(), depth).await
}
