//! Pending Relations Store
//!
//! Persistent record of relation values that could not be resolved yet:
//! "this record's field should point at whatever record eventually carries
//! remote ID X". Rows are created when an operation references an unmapped
//! remote ID, consumed when that remote ID becomes mapped, and dropped
//! wholesale when the owning record is deleted.

use crate::db::error::StoreError;
use crate::db::DatabaseService;
use libsql::params;
use std::sync::Arc;

/// One relation waiting on a remote ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRelation {
    /// Table of the owning record
    pub table: String,

    /// Relation field on the owning record
    pub field: String,

    /// Internal uid of the owning record
    pub record_uid: i64,
}

/// Per-table pending relation counts for operational visibility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRelationStat {
    /// Owning table
    pub table: String,

    /// Rows still waiting on an unmapped remote ID
    pub waiting: i64,

    /// Rows whose remote ID has since been mapped and can be spliced in
    pub resolvable: i64,
}

/// Store for relations parked until their target remote ID exists
pub struct PendingRelationStore {
    db: Arc<DatabaseService>,
}

impl PendingRelationStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// All relations currently waiting on a remote ID
    pub async fn get(&self, remote_id: &str) -> Result<Vec<PendingRelation>, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut rows = conn
            .query(
                "SELECT table_name, field, record_uid FROM pending_relations
                 WHERE remote_id = ?1
                 ORDER BY id",
                params![remote_id],
            )
            .await?;

        let mut relations = Vec::new();
        while let Some(row) = rows.next().await? {
            relations.push(PendingRelation {
                table: row.get(0)?,
                field: row.get(1)?,
                record_uid: row.get(2)?,
            });
        }
        Ok(relations)
    }

    /// Replace all pending relations for one (table, field, record) triple
    /// with the given list of waited-on remote IDs (delete-then-insert).
    pub async fn set(
        &self,
        table: &str,
        field: &str,
        record_uid: i64,
        remote_ids: &[String],
    ) -> Result<(), StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute(
            "DELETE FROM pending_relations
             WHERE table_name = ?1 AND field = ?2 AND record_uid = ?3",
            params![table, field, record_uid],
        )
        .await?;

        for remote_id in remote_ids {
            conn.execute(
                "INSERT INTO pending_relations (table_name, field, record_uid, remote_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![table, field, record_uid, remote_id.as_str()],
            )
            .await?;
        }
        Ok(())
    }

    /// Delete all pending relations owned by a record.
    ///
    /// `field: None` wildcards the field and removes every row for the
    /// record; used when the owning record is deleted.
    pub async fn remove_local(
        &self,
        table: &str,
        field: Option<&str>,
        record_uid: i64,
    ) -> Result<(), StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        match field {
            Some(field) => {
                conn.execute(
                    "DELETE FROM pending_relations
                     WHERE table_name = ?1 AND field = ?2 AND record_uid = ?3",
                    params![table, field, record_uid],
                )
                .await?;
            }
            None => {
                conn.execute(
                    "DELETE FROM pending_relations
                     WHERE table_name = ?1 AND record_uid = ?2",
                    params![table, record_uid],
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Delete all rows waiting on a now-resolved remote ID
    pub async fn remove_remote(&self, remote_id: &str) -> Result<(), StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute(
            "DELETE FROM pending_relations WHERE remote_id = ?1",
            params![remote_id],
        )
        .await?;
        Ok(())
    }

    /// Per-table counts of waiting and already-resolvable relations
    pub async fn stats(&self) -> Result<Vec<PendingRelationStat>, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut rows = conn
            .query(
                "SELECT p.table_name,
                        COUNT(*),
                        SUM(EXISTS(
                            SELECT 1 FROM remote_id_mappings m
                            WHERE m.remote_id = p.remote_id
                        ))
                 FROM pending_relations p
                 GROUP BY p.table_name
                 ORDER BY p.table_name",
                (),
            )
            .await?;

        let mut stats = Vec::new();
        while let Some(row) = rows.next().await? {
            let resolvable: i64 = row.get(2)?;
            stats.push(PendingRelationStat {
                table: row.get(0)?,
                waiting: row.get(1)?,
                resolvable,
            });
        }
        Ok(stats)
    }
}
