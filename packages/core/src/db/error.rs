//! Engine Store Error Types
//!
//! This module defines error types for the persistent engine stores
//! (remote ID mappings, pending relations, deferred operations), covering
//! connection, initialization, and statement failures.

use std::path::PathBuf;
use thiserror::Error;

/// Engine store errors
///
/// Covers all error cases for the embedded database the engine keeps its
/// own state in. Operation-level errors (identity conflicts surfaced to
/// callers, gateway failures) live in the `operations` error taxonomy.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to establish database connection
    #[error("Failed to connect to engine store at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize store schema
    #[error("Failed to initialize engine store schema: {0}")]
    InitializationFailed(String),

    /// Failed to create parent directory
    #[error("Failed to create parent directory for engine store: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Store operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Unique constraint on the remote ID column rejected an insert
    ///
    /// This is the store-level face of an identity conflict: the single
    /// mechanism that keeps two racing operations from both mapping the
    /// same remote ID.
    #[error("Remote ID is already mapped: {remote_id}")]
    DuplicateRemoteId { remote_id: String },

    /// Stored JSON (metadata, deferred arguments) failed to decode
    #[error("Stored value could not be decoded: {0}")]
    Decode(String),

    /// A collaborator the store consults (record lookup) failed
    #[error("Collaborator lookup failed: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl StoreError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a duplicate remote ID error
    pub fn duplicate_remote_id(remote_id: impl Into<String>) -> Self {
        Self::DuplicateRemoteId {
            remote_id: remote_id.into(),
        }
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Whether a libsql error is a unique-constraint violation
    ///
    /// libsql does not expose the extended result code on this path, so the
    /// message text is the only discriminator available.
    pub fn is_unique_violation(error: &libsql::Error) -> bool {
        error.to_string().contains("UNIQUE constraint failed")
    }
}
