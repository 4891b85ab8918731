//! Field Value Sanitization
//!
//! Every staged field value must end up as either a scalar (number or
//! string) or an array of scalars, a relation list. Which of the two a
//! field is allowed to carry follows its relational classification: an
//! explicit configuration override evaluated against the operation's data,
//! or the schema lookup's field type.

use crate::operations::context::EngineContext;
use crate::operations::error::OperationError;
use crate::operations::operation::RecordOperation;
use crate::pipeline::{record_type_of, relation_class, Flow};
use serde_json::Value;

/// Enforce the value typing rules on all staged fields
pub(crate) fn sanitize_field_values(
    operation: &mut RecordOperation,
    ctx: &EngineContext,
) -> Result<Flow, OperationError> {
    let record_type = record_type_of(operation, ctx);
    let fields: Vec<String> = operation.staged_data().keys().cloned().collect();

    for field in fields {
        if field == ctx.config.storage_field {
            // Storage values are validated by the resolution step.
            continue;
        }
        let relational =
            relation_class(ctx, operation, &field, record_type.as_deref()).is_some();
        let Some(value) = operation.staged_data().get(&field).cloned() else {
            continue;
        };
        let sanitized = sanitize_value(&field, value, relational)?;
        operation.staged_data_mut().insert(field, sanitized);
    }
    Ok(Flow::Continue)
}

/// Sanitize one value according to its field's classification.
///
/// Relational fields are normalized to arrays with empty-ish entries
/// (null, false, "", 0, "0") dropped. Scalar fields accept numbers and
/// strings; booleans are coerced to 0/1.
fn sanitize_value(field: &str, value: Value, relational: bool) -> Result<Value, OperationError> {
    if relational {
        let entries = match value {
            Value::Array(items) => items,
            scalar => vec![scalar],
        };
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Value::Null | Value::Bool(false) => {}
                Value::String(ref text) if text.is_empty() || text == "0" => {}
                Value::Number(ref number) if number.as_i64() == Some(0) => {}
                Value::String(_) | Value::Number(_) => kept.push(entry),
                other => {
                    return Err(OperationError::invalid_argument(format!(
                        "relation field {} carries a non-scalar entry: {}",
                        field, other
                    )));
                }
            }
        }
        Ok(Value::Array(kept))
    } else {
        match value {
            Value::String(_) | Value::Number(_) => Ok(value),
            Value::Bool(flag) => Ok(Value::Number(i64::from(flag).into())),
            other => Err(OperationError::invalid_argument(format!(
                "field {} must be a scalar or a relation list, got: {}",
                field, other
            ))),
        }
    }
}
