//! Deferred Operation Replay
//!
//! Whenever an operation completes, every operation deferred on that remote
//! ID is replayed in-line, in creation order. A replayed operation runs its
//! own full lifecycle, including its after-commit pipeline, so one inbound
//! request can drain an arbitrary chain of previously-deferred work.
//!
//! # Replay rules
//!
//! - Rows replay in submission order per dependency
//! - A row whose grouping hash was already attempted in this drain is a
//!   stale duplicate and is skipped
//! - A deferred create that hits an identity conflict on reconstruction
//!   (the target now exists) is retried as an update with identical
//!   arguments
//! - Stop signals raised during replay (re-deferral, duplicate
//!   short-circuit) are absorbed; they must not fail the triggering
//!   operation
//! - Every row is deleted after its attempt, whether it succeeded, was skipped or
//!   converted
//!
//! Chains are depth-capped: a cycle of deferred operations cannot wedge a
//! request, its rows simply stay queued for a later trigger.

use crate::db::StoreError;
use crate::operations::context::EngineContext;
use crate::operations::error::OperationError;
use crate::operations::operation::{OperationArgs, RecordOperation};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, warn};

/// Maximum depth of an in-line replay chain
pub const MAX_REPLAY_DEPTH: usize = 32;

/// Replay all operations deferred on `remote_id`.
///
/// Boxed because replayed operations recurse back into replay through their
/// own after-commit pipeline.
pub(crate) fn replay_deferred<'a>(
    ctx: &'a EngineContext,
    remote_id: &'a str,
    depth: usize,
) -> Pin<Box<dyn Future<Output = Result<(), OperationError>> + Send + 'a>> {
    Box::pin(async move {
        if depth >= MAX_REPLAY_DEPTH {
            warn!(
                remote_id,
                depth, "replay chain depth cap reached; leaving deferred operations queued"
            );
            return Ok(());
        }

        let rows = ctx.deferred.get(remote_id).await?;
        if rows.is_empty() {
            return Ok(());
        }
        info!(remote_id, count = rows.len(), "replaying deferred operations");

        let mut attempted_hashes: HashSet<String> = HashSet::new();
        for row in rows {
            let result = replay_row(ctx, &row.arguments, &row.record_hash, &mut attempted_hashes, depth).await;
            // The row is spent regardless of how the attempt went.
            ctx.deferred.delete(row.id).await?;
            result?;
        }
        Ok(())
    })
}

async fn replay_row(
    ctx: &EngineContext,
    arguments: &serde_json::Value,
    record_hash: &str,
    attempted_hashes: &mut HashSet<String>,
    depth: usize,
) -> Result<(), OperationError> {
    if attempted_hashes.contains(record_hash) {
        debug!(record_hash, "skipping stale duplicate deferred operation");
        return Ok(());
    }

    let args: OperationArgs = serde_json::from_value(arguments.clone())
        .map_err(|e| StoreError::decode(format!("deferred operation arguments: {}", e)))?;
    let is_create = matches!(args, OperationArgs::Create { .. });

    let mut operation = match RecordOperation::from_args(ctx, args.clone()).await {
        Ok(operation) => operation,
        Err(OperationError::IdentityConflict { remote_id }) if is_create => {
            // The dependency resolution created (or revealed) the target
            // out-of-band; the deferred create becomes an update with
            // identical arguments.
            info!(
                remote_id,
                "deferred create hit an existing mapping; retrying as update"
            );
            let update_args = args
                .into_update()
                .ok_or_else(|| OperationError::invalid_argument("create conversion failed"))?;
            RecordOperation::from_args(ctx, update_args).await?
        }
        Err(error) => return Err(error),
    };

    attempted_hashes.insert(record_hash.to_string());

    // Stop signals (re-deferral, duplicate) are terminal-but-ok states for
    // the replayed operation and must not abort the triggering chain.
    operation.prepare(ctx).await?;
    operation.invoke_at_depth(ctx, depth + 1).await?;
    Ok(())
}
