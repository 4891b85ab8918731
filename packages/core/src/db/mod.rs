//! Engine State Stores
//!
//! Persistent state the engine keeps between requests, backed by an
//! embedded libsql database:
//!
//! - [`MappingStore`] - remote ID → internal uid mappings with change-hashes
//! - [`PendingRelationStore`] - relations parked until their target exists
//! - [`DeferredOperationStore`] - whole operations queued on a dependency
//! - [`DatabaseService`] - connection management and schema bootstrap
//! - [`MappingCache`] - in-process resolution cache injected into the
//!   mapping store

pub mod cache;
pub mod database;
pub mod deferred_store;
pub mod error;
pub mod mapping_store;
pub mod pending_store;

pub use cache::{CachedMapping, MappingCache};
pub use database::DatabaseService;
pub use deferred_store::{DeferredOperationStore, DeferredRow};
pub use error::StoreError;
pub use mapping_store::MappingStore;
pub use pending_store::{PendingRelation, PendingRelationStat, PendingRelationStore};
