//! In-Process Remote ID Cache
//!
//! Remote ID lookups happen for every relation value an operation carries,
//! so resolved mappings are cached in-process for the lifetime of a run.
//! The cache is an explicit object injected into the mapping store: every
//! store write goes through an invalidation hook here, keeping the cache
//! coherent with `add`/`remove` immediately rather than eventually.

use std::collections::HashMap;
use tokio::sync::RwLock;

/// One cached mapping entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMapping {
    /// Internal uid the remote ID resolves to
    pub uid: i64,

    /// Table the mapped record lives in
    pub table: String,
}

/// Cache of remote ID → (uid, table) resolutions
///
/// Keyed by the composite remote ID (aspects included). Entries are only
/// inserted for mappings that were verified against the backing record at
/// lookup time; a record deleted out-of-band is purged on the next `get`
/// through the mapping store.
#[derive(Debug, Default)]
pub struct MappingCache {
    entries: RwLock<HashMap<String, CachedMapping>>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached resolution for a remote ID, if any
    pub async fn get(&self, remote_id: &str) -> Option<CachedMapping> {
        self.entries.read().await.get(remote_id).cloned()
    }

    /// Record a resolution
    pub async fn insert(&self, remote_id: &str, uid: i64, table: &str) {
        self.entries.write().await.insert(
            remote_id.to_string(),
            CachedMapping {
                uid,
                table: table.to_string(),
            },
        );
    }

    /// Invalidate one entry (mapping removed or found stale)
    pub async fn remove(&self, remote_id: &str) {
        self.entries.write().await.remove(remote_id);
    }

    /// Drop all entries
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
