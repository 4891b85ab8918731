//! Relation Substitution and Ordering Intent
//!
//! Relation fields arrive as lists of remote IDs. Before the commit, every
//! entry is either substituted with the internal uid it is mapped to or
//! parked as a pending relation to be spliced in once the target exists.
//! For ordered MM relations, the caller's intended ordering is captured as
//! a message so the commit phase can stash it as mapping metadata.

use crate::operations::context::EngineContext;
use crate::operations::error::OperationError;
use crate::operations::message::{Consumption, Message, PendingRelationMessage};
use crate::operations::operation::{OperationKind, RecordOperation};
use crate::pipeline::{
    is_internal_id, record_type_of, relation_class, value_to_string, Flow, RelationClass,
};
use serde_json::Value;

/// Capture the caller-declared ordering of ordered MM relation fields.
///
/// Only lists with more than one entry that still reference at least one
/// remote ID carry information the resolution pass could need later.
pub(crate) fn stash_relation_order_intent(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
) -> Flow {
    if !matches!(
        operation.kind(),
        OperationKind::Create | OperationKind::Update
    ) {
        return Flow::Continue;
    }

    let record_type = record_type_of(operation, ctx);
    let fields: Vec<String> = operation.staged_data().keys().cloned().collect();

    for field in fields {
        let Some(RelationClass::Schema(relation)) =
            relation_class(ctx, operation, &field, record_type.as_deref())
        else {
            continue;
        };
        if !(relation.mm && relation.ordered) {
            continue;
        }
        let Some(Value::Array(entries)) = operation.staged_data().get(&field) else {
            continue;
        };
        let ordered: Vec<String> = entries.iter().filter_map(value_to_string).collect();
        if ordered.len() > 1 && ordered.iter().any(|entry| !is_internal_id(entry)) {
            operation.outbox_mut().push(
                Message::RelationOrderIntent {
                    field,
                    remote_ids: ordered,
                },
                Consumption::Required,
            );
        }
    }
    Flow::Continue
}

/// Substitute relation values with internal uids, parking what cannot be
/// resolved yet.
///
/// Each entry of a relational field is partitioned:
///
/// - already-numeric entries pass through (they are internal uids)
/// - mapped remote IDs become the internal uid, prefixed with the target
///   table when the field can point at more than one table
/// - unmapped remote IDs are dropped from the outgoing value and collected
///   into a pending-relation message per field
///
/// Single-table relation lists are flattened to a comma-joined string;
/// multi-table group relations stay as true lists of `table_uid` tokens.
pub(crate) async fn substitute_relations(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
) -> Result<Flow, OperationError> {
    if !matches!(
        operation.kind(),
        OperationKind::Create | OperationKind::Update
    ) {
        return Ok(Flow::Continue);
    }

    let record_type = record_type_of(operation, ctx);
    let fields: Vec<String> = operation.staged_data().keys().cloned().collect();

    for field in fields {
        let Some(class) = relation_class(ctx, operation, &field, record_type.as_deref()) else {
            continue;
        };
        let multi_table = match &class {
            RelationClass::Schema(relation) => relation.is_multi_table(),
            RelationClass::Override => false,
        };

        let Some(value) = operation.staged_data().get(&field).cloned() else {
            continue;
        };
        let entries = match value {
            Value::Array(items) => items,
            scalar => vec![scalar],
        };

        let mut resolved: Vec<String> = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();

        for entry in &entries {
            let Some(text) = value_to_string(entry) else {
                continue;
            };
            if is_internal_id(&text) {
                resolved.push(text);
                continue;
            }
            let uid = ctx.mappings.get(&text).await?;
            if uid == 0 {
                unresolved.push(text);
            } else if multi_table {
                let table = ctx.mappings.table_for(&text).await?.unwrap_or_default();
                resolved.push(format!("{}_{}", table, uid));
            } else {
                resolved.push(uid.to_string());
            }
        }

        if !unresolved.is_empty() {
            operation.outbox_mut().push(
                Message::PendingRelations(PendingRelationMessage {
                    field: field.clone(),
                    remote_ids: unresolved,
                }),
                Consumption::Required,
            );
        }

        let outgoing = if multi_table {
            Value::Array(resolved.into_iter().map(Value::String).collect())
        } else {
            Value::String(resolved.join(","))
        };
        operation.staged_data_mut().insert(field, outgoing);
    }
    Ok(Flow::Continue)
}
