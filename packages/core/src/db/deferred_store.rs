//! Deferred Operation Store
//!
//! Persistent queue of whole operations that could not run because some
//! other remote ID must exist first. Rows carry the operation kind, its
//! canonical constructor arguments and a grouping hash; they are replayed in
//! creation order once the dependency appears, then deleted whether the
//! replay succeeded, was skipped or was converted.

use crate::db::error::StoreError;
use crate::db::DatabaseService;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::params;
use serde_json::Value;
use std::sync::Arc;

/// One persisted deferred operation
#[derive(Debug, Clone)]
pub struct DeferredRow {
    /// Row id, used for deletion after the replay attempt
    pub id: i64,

    /// Operation kind tag (matches the canonical argument serialization)
    pub kind: String,

    /// Canonical constructor arguments, replayable via deserialization
    pub arguments: Value,

    /// Grouping hash: the operation's idempotence hash, used to skip stale
    /// duplicates during replay
    pub record_hash: String,

    /// Submission time; replay follows this ordering per dependency
    pub created_at: DateTime<Utc>,
}

/// Store for operations waiting on an unmapped remote ID
pub struct DeferredOperationStore {
    db: Arc<DatabaseService>,
}

impl DeferredOperationStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Persist an operation waiting on `dependent_remote_id`
    pub async fn add(
        &self,
        dependent_remote_id: &str,
        kind: &str,
        arguments: &Value,
        record_hash: &str,
    ) -> Result<(), StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        let encoded = serde_json::to_string(arguments)
            .map_err(|e| StoreError::decode(format!("deferred arguments encode: {}", e)))?;
        conn.execute(
            "INSERT INTO deferred_operations
                 (dependent_remote_id, kind, arguments, record_hash)
             VALUES (?1, ?2, ?3, ?4)",
            params![dependent_remote_id, kind, encoded, record_hash],
        )
        .await?;
        Ok(())
    }

    /// All operations waiting on a remote ID, ordered by creation.
    ///
    /// The row id breaks ties between operations submitted within the same
    /// timestamp granule, preserving submission order.
    pub async fn get(&self, dependent_remote_id: &str) -> Result<Vec<DeferredRow>, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut rows = conn
            .query(
                "SELECT id, kind, arguments, record_hash, created_at
                 FROM deferred_operations
                 WHERE dependent_remote_id = ?1
                 ORDER BY created_at, id",
                params![dependent_remote_id],
            )
            .await?;

        let mut deferred = Vec::new();
        while let Some(row) = rows.next().await? {
            let raw_arguments: String = row.get(2)?;
            let arguments = serde_json::from_str(&raw_arguments)
                .map_err(|e| StoreError::decode(format!("deferred arguments decode: {}", e)))?;
            let raw_created_at: String = row.get(4)?;

            deferred.push(DeferredRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                arguments,
                record_hash: row.get(3)?,
                created_at: parse_timestamp(&raw_created_at)?,
            });
        }
        Ok(deferred)
    }

    /// Delete a row after its replay attempt
    pub async fn delete(&self, row_id: i64) -> Result<(), StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute(
            "DELETE FROM deferred_operations WHERE id = ?1",
            params![row_id],
        )
        .await?;
        Ok(())
    }

    /// Number of deferred operations currently queued (all dependencies)
    pub async fn count(&self) -> Result<i64, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM deferred_operations", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}

/// Parse a timestamp from the store - handles both SQLite and RFC3339 formats
///
/// SQLite CURRENT_TIMESTAMP returns: "YYYY-MM-DD HH:MM:SS"
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    Err(StoreError::decode(format!(
        "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
        raw
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sqlite_timestamp() {
        let parsed = parse_timestamp("2026-08-06 10:30:00").unwrap();
        assert_eq!(parsed.timezone(), Utc);
    }

    #[test]
    fn test_parse_rfc3339_timestamp() {
        assert!(parse_timestamp("2026-08-06T10:30:00Z").is_ok());
    }

    #[test]
    fn test_parse_invalid_timestamp() {
        assert!(parse_timestamp("not a time").is_err());
    }
}
