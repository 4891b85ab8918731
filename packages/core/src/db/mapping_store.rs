//! Remote ID Mapping Store
//!
//! Persistent bidirectional map from caller-supplied remote IDs to internal
//! (table, uid) pairs, with a per-mapping change-hash used for idempotence
//! detection and a namespaced metadata blob for handler side-information.
//!
//! # Invariants
//!
//! - At most one internal uid per remote ID, enforced by the PRIMARY KEY on
//!   `remote_id`; a racing second `add` fails cleanly instead of corrupting
//!   the mapping
//! - A mapping whose backing record no longer exists is treated as absent
//!   and purged as a side effect of the lookup
//!
//! # Caching
//!
//! Resolutions are cached in the injected [`MappingCache`] for the lifetime
//! of the process; `add` and `remove` update the cache in the same call.

use crate::db::cache::MappingCache;
use crate::db::error::StoreError;
use crate::db::DatabaseService;
use crate::gateway::RecordLookup;
use libsql::params;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Store for remote ID → internal uid mappings
pub struct MappingStore {
    db: Arc<DatabaseService>,
    cache: Arc<MappingCache>,
    records: Arc<dyn RecordLookup>,
}

impl MappingStore {
    /// Create a mapping store
    ///
    /// # Arguments
    ///
    /// * `db` - shared engine database
    /// * `cache` - in-process resolution cache (explicitly injected so its
    ///   lifetime and invalidation are owned by the caller, not a global)
    /// * `records` - record lookup used to verify mapped records still exist
    pub fn new(
        db: Arc<DatabaseService>,
        cache: Arc<MappingCache>,
        records: Arc<dyn RecordLookup>,
    ) -> Self {
        Self { db, cache, records }
    }

    /// Resolve a remote ID to its internal uid; `0` when absent.
    ///
    /// Verifies the mapped record still exists in the backend. A stale
    /// mapping (record deleted out-of-band) is purged as a side effect and
    /// reported as absent.
    pub async fn get(&self, remote_id: &str) -> Result<i64, StoreError> {
        let resolved = match self.cache.get(remote_id).await {
            Some(entry) => Some((entry.uid, entry.table)),
            None => self.fetch_mapping(remote_id).await?,
        };

        let Some((uid, table)) = resolved else {
            return Ok(0);
        };

        if self.records.get_record(&table, uid).await?.is_none() {
            debug!(remote_id, table = %table, uid, "purging stale remote ID mapping");
            self.remove(remote_id).await?;
            return Ok(0);
        }

        self.cache.insert(remote_id, uid, &table).await;
        Ok(uid)
    }

    /// Whether a remote ID resolves to a live record
    pub async fn exists(&self, remote_id: &str) -> Result<bool, StoreError> {
        Ok(self.get(remote_id).await? != 0)
    }

    /// Table a remote ID is mapped into, if any
    pub async fn table_for(&self, remote_id: &str) -> Result<Option<String>, StoreError> {
        if let Some(entry) = self.cache.get(remote_id).await {
            return Ok(Some(entry.table));
        }
        Ok(self.fetch_mapping(remote_id).await?.map(|(_, table)| table))
    }

    /// Map a remote ID to an internal uid.
    ///
    /// Persists the operation's change-hash alongside the mapping. Fails
    /// with [`StoreError::DuplicateRemoteId`] if the remote ID is already
    /// mapped; the uniqueness constraint is the only arbiter, so two
    /// concurrent creates race to a single winner.
    pub async fn add(
        &self,
        remote_id: &str,
        table: &str,
        uid: i64,
        record_hash: &str,
    ) -> Result<(), StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute(
            "INSERT INTO remote_id_mappings (remote_id, table_name, uid, record_hash)
             VALUES (?1, ?2, ?3, ?4)",
            params![remote_id, table, uid, record_hash],
        )
        .await
        .map_err(|e| {
            if StoreError::is_unique_violation(&e) {
                StoreError::duplicate_remote_id(remote_id)
            } else {
                StoreError::from(e)
            }
        })?;

        self.cache.insert(remote_id, uid, table).await;
        Ok(())
    }

    /// Refresh the stored change-hash for a remote ID (no uniqueness check)
    pub async fn update_hash(&self, remote_id: &str, record_hash: &str) -> Result<(), StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute(
            "UPDATE remote_id_mappings SET record_hash = ?1 WHERE remote_id = ?2",
            params![record_hash, remote_id],
        )
        .await?;
        Ok(())
    }

    /// Remove a mapping
    pub async fn remove(&self, remote_id: &str) -> Result<(), StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute(
            "DELETE FROM remote_id_mappings WHERE remote_id = ?1",
            params![remote_id],
        )
        .await?;
        self.cache.remove(remote_id).await;
        Ok(())
    }

    /// Whether a mapping exists for the remote ID and its stored hash equals
    /// the candidate operation's hash, the exact-repeat short circuit.
    pub async fn is_same_as_previous(
        &self,
        remote_id: &str,
        record_hash: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut rows = conn
            .query(
                "SELECT record_hash FROM remote_id_mappings WHERE remote_id = ?1",
                params![remote_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let stored: String = row.get(0)?;
                Ok(stored == record_hash)
            }
            None => Ok(false),
        }
    }

    /// Reverse lookup: the remote ID mapped to (table, uid), if any
    pub async fn remote_id_for(
        &self,
        table: &str,
        uid: i64,
    ) -> Result<Option<String>, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut rows = conn
            .query(
                "SELECT remote_id FROM remote_id_mappings
                 WHERE table_name = ?1 AND uid = ?2",
                params![table, uid],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Stash handler-specific side information alongside a mapping.
    ///
    /// Values are namespaced by the writing handler's identity so different
    /// handlers cannot collide on a key.
    pub async fn set_meta_value(
        &self,
        remote_id: &str,
        namespace: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        let path = meta_path(namespace);
        let encoded = serde_json::to_string(value)
            .map_err(|e| StoreError::decode(format!("metadata encode: {}", e)))?;
        conn.execute(
            "UPDATE remote_id_mappings
             SET metadata = json_set(metadata, ?1, json(?2))
             WHERE remote_id = ?3",
            params![path, encoded, remote_id],
        )
        .await?;
        Ok(())
    }

    /// Read back a handler's side information for a mapping
    pub async fn get_meta_value(
        &self,
        remote_id: &str,
        namespace: &str,
    ) -> Result<Option<Value>, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut rows = conn
            .query(
                "SELECT metadata FROM remote_id_mappings WHERE remote_id = ?1",
                params![remote_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let raw: String = row.get(0)?;
                let metadata: Value = serde_json::from_str(&raw)
                    .map_err(|e| StoreError::decode(format!("metadata decode: {}", e)))?;
                Ok(metadata.get(namespace).cloned())
            }
            None => Ok(None),
        }
    }

    /// Raw mapping row fetch without existence verification
    async fn fetch_mapping(&self, remote_id: &str) -> Result<Option<(i64, String)>, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut rows = conn
            .query(
                "SELECT uid, table_name FROM remote_id_mappings WHERE remote_id = ?1",
                params![remote_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let uid: i64 = row.get(0)?;
                let table: String = row.get(1)?;
                Ok(Some((uid, table)))
            }
            None => Ok(None),
        }
    }
}

/// JSON path for a metadata namespace
fn meta_path(namespace: &str) -> String {
    format!("$.\"{}\"", namespace)
}
