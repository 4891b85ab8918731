//! Operation Error Taxonomy
//!
//! Errors a record operation can surface to its caller, split into
//! caller-correctable data errors (identity conflicts, unknown remote IDs,
//! malformed arguments), execution errors (the gateway rejected the commit)
//! and internal defects (a misconfigured pipeline). Stop signals are *not*
//! errors; they live in [`StopReason`] and are absorbed at the operation
//! boundary.

use crate::db::StoreError;
use crate::models::ValidationError;
use crate::operations::message::MessageKind;
use thiserror::Error;

/// Control-flow signal a setup handler raises to end an operation early.
///
/// A stopped operation is a legitimate terminal state, never surfaced to
/// the caller as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The incoming call is byte-for-byte identical to the last recorded
    /// operation for this remote ID
    DuplicateOfPrevious,

    /// The operation was parked in the deferred store because this remote
    /// ID must be mapped first
    MissingDependency { remote_id: String },
}

/// Record operation errors
#[derive(Error, Debug)]
pub enum OperationError {
    /// Remote ID collision on create/copy/mapping add
    #[error("Remote ID is already mapped: {remote_id}")]
    IdentityConflict { remote_id: String },

    /// Referenced remote ID is not mapped
    #[error("Remote ID is not known: {remote_id}")]
    NotFound { remote_id: String },

    /// Malformed operation argument (copy target table, field value type)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Field name not present in the schema and not the storage field
    #[error("Unknown field {field} on table {table}")]
    UnknownField { table: String, field: String },

    /// The persistence gateway reported a non-empty error log after commit
    #[error("Persistence gateway rejected the commit: {}", errors.join("; "))]
    DataHandler {
        errors: Vec<String>,
        /// Staged writes and commands, kept for diagnostics
        payload: serde_json::Value,
    },

    /// A required message was never retrieved by any handler; a pipeline
    /// configuration defect, not a data error
    #[error("Pipeline left required messages unconsumed: {kinds:?}")]
    Incomplete { kinds: Vec<MessageKind> },

    /// Caller-supplied value failed validation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Engine store failure
    #[error("Engine store failure: {0}")]
    Store(#[from] StoreError),

    /// A collaborator (gateway, record lookup) failed infrastructurally
    #[error("Collaborator failure: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl OperationError {
    /// Create an identity conflict error
    pub fn identity_conflict(remote_id: impl Into<String>) -> Self {
        Self::IdentityConflict {
            remote_id: remote_id.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(remote_id: impl Into<String>) -> Self {
        Self::NotFound {
            remote_id: remote_id.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an unknown field error
    pub fn unknown_field(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            table: table.into(),
            field: field.into(),
        }
    }

    /// Create a gateway rejection error
    pub fn data_handler(errors: Vec<String>, payload: serde_json::Value) -> Self {
        Self::DataHandler { errors, payload }
    }

    /// Stable machine-readable code for transport layers
    pub fn code(&self) -> &'static str {
        match self {
            Self::IdentityConflict { .. } => "identity_conflict",
            Self::NotFound { .. } => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::UnknownField { .. } => "unknown_field",
            Self::DataHandler { .. } => "data_handler",
            Self::Incomplete { .. } => "incomplete_operation",
            Self::Validation(_) => "validation",
            Self::Store(StoreError::DuplicateRemoteId { .. }) => "identity_conflict",
            Self::Store(_) => "store",
            Self::Collaborator(_) => "collaborator",
        }
    }

    /// Whether the caller can correct this error by changing its request
    /// (4xx-style), as opposed to an execution failure or internal defect
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::IdentityConflict { .. }
                | Self::NotFound { .. }
                | Self::InvalidArgument(_)
                | Self::UnknownField { .. }
                | Self::Validation(_)
        )
    }
}
