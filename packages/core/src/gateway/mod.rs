//! Persistence Gateway Abstraction
//!
//! The engine never talks to record storage directly. It stages field writes
//! and commands against a [`PersistenceGateway`] and asks the gateway to
//! commit each batch; the gateway reports failures through an error log
//! rather than by failing the commit call, mirroring the coarse batch
//! semantics of the CMS backend it fronts.
//!
//! - [`PersistenceGateway`] - per-operation staging and commit of field
//!   writes and commands
//! - [`GatewayFactory`] - produces a fresh gateway per record operation
//! - [`RecordLookup`] - read-only record row fetch used for mapping
//!   verification and relation splicing
//! - [`TursoGateway`] - bundled reference implementation over the embedded
//!   `records` table
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`; gateways are used across await
//! points in async pipelines.

pub mod turso;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub use turso::{TursoGateway, TursoGatewayFactory, TursoRecords};

/// Command staged against a record, applied on `commit_commands`
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Mark the record deleted
    Delete,

    /// Copy the record to a target position.
    ///
    /// The gateway reports the copied row's new uid under `placeholder`,
    /// retrievable through [`PersistenceGateway::new_id_for`] after
    /// `commit_commands`.
    Copy {
        target: CopyTarget,
        placeholder: String,
    },
}

/// Where a copied record lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyTarget {
    /// Place the copy on this page
    Page(i64),

    /// Place the copy directly after this same-table record
    AfterRecord(i64),
}

impl CopyTarget {
    /// Decode the signed target convention used by callers: a positive value
    /// names a page, a negative value names the same-table record the copy
    /// is placed after.
    pub fn from_signed(target: i64) -> Self {
        if target >= 0 {
            Self::Page(target)
        } else {
            Self::AfterRecord(-target)
        }
    }
}

/// Batch-write collaborator the engine commits record changes through.
///
/// One gateway instance carries the staged state of one record operation.
/// Field writes address records either by numeric uid (rendered as a decimal
/// string) or by a placeholder token for rows that do not exist yet; after
/// `commit_field_writes` the placeholder resolves to the assigned uid via
/// [`new_id_for`](Self::new_id_for).
///
/// Commit calls return `Err` only for infrastructural failures (lost
/// connection, poisoned state). Per-record rejections are accumulated in the
/// error log returned by [`errors`](Self::errors); an operation inspects
/// the log to decide whether its commit succeeded.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Stage a single field write for a record
    ///
    /// `id` is either a decimal uid or a placeholder token issued by the
    /// operation for a record that will be created by this batch.
    async fn stage_field_write(&self, table: &str, id: &str, field: &str, value: Value)
        -> Result<()>;

    /// Stage a command against an existing record
    async fn stage_command(&self, table: &str, uid: i64, command: Command) -> Result<()>;

    /// Apply all staged field writes
    async fn commit_field_writes(&self) -> Result<()>;

    /// Apply all staged commands
    async fn commit_commands(&self) -> Result<()>;

    /// Error log accumulated across both commit calls
    async fn errors(&self) -> Vec<String>;

    /// Resolve a placeholder token to the uid assigned during commit
    async fn new_id_for(&self, placeholder: &str) -> Option<i64>;
}

/// Produces a fresh, empty gateway for each record operation
pub trait GatewayFactory: Send + Sync {
    fn create_gateway(&self) -> Box<dyn PersistenceGateway>;
}

/// One record row as the persistence backend sees it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    /// Internal uid
    pub uid: i64,

    /// Table the row belongs to
    pub table: String,

    /// Storage page id
    pub pid: i64,

    /// Field name → value payload
    pub fields: Map<String, Value>,
}

impl RecordRow {
    /// Field value accessor
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Read-only record access the engine depends on.
///
/// Used to verify that mapped records still exist, to read current relation
/// values when splicing resolved remote IDs into waiting records, and to
/// count inline children for delete-time counter maintenance.
#[async_trait]
pub trait RecordLookup: Send + Sync {
    /// Fetch one record row; `None` if absent or deleted
    async fn get_record(&self, table: &str, uid: i64) -> Result<Option<RecordRow>>;

    /// Count live records in `table` whose `foreign_field` points at
    /// `parent_uid` (inline child counting)
    async fn count_children(&self, table: &str, foreign_field: &str, parent_uid: i64)
        -> Result<i64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_target_sign_convention() {
        assert_eq!(CopyTarget::from_signed(7), CopyTarget::Page(7));
        assert_eq!(CopyTarget::from_signed(0), CopyTarget::Page(0));
        assert_eq!(CopyTarget::from_signed(-4), CopyTarget::AfterRecord(4));
    }
}
