//! Contentbridge Core Engine
//!
//! This crate provides the record-operation orchestration and
//! deferred-relation resolution engine behind the Contentbridge REST/CLI
//! integration layer: external systems create, update, copy and delete CMS
//! records addressed by caller-supplied remote IDs, in any order, with any
//! amount of duplicate delivery, and the engine turns that into ordered,
//! idempotent writes against a persistence backend that only understands
//! internal numeric uids.
//!
//! # Architecture
//!
//! - **Remote ID mapping**: a persistent, uniqueness-constrained map from
//!   remote IDs to internal uids, with per-mapping change-hashes for
//!   exact-repeat detection
//! - **Pending relations**: relation values referencing not-yet-existing
//!   remote IDs are parked and spliced in once the target appears
//! - **Deferred operations**: operations whose hard dependency is missing
//!   are persisted whole and replayed in order when it resolves
//! - **Handler pipelines**: setup and commit phases are ordered tables of
//!   single-responsibility steps over a shared operation state
//!
//! # Modules
//!
//! - [`models`] - record identity and representation value types
//! - [`config`] - engine configuration (serde)
//! - [`schema`] - relation/schema lookup
//! - [`db`] - persistent engine stores over libsql
//! - [`gateway`] - persistence gateway abstraction and reference impl
//! - [`operations`] - the record operation state machine and replay
//! - [`pipeline`] - setup and commit step tables
//! - [`services`] - the `RecordService` facade

pub mod config;
pub mod db;
pub mod gateway;
pub mod models;
pub mod operations;
pub mod pipeline;
pub mod schema;
pub mod services;

// Re-export commonly used types
pub use config::BridgeConfig;
pub use models::{RecordIdentifier, RecordRepresentation};
pub use operations::{EngineContext, OperationArgs, OperationError, RecordOperation, StopReason};
pub use services::{BatchReport, ItemStatus, RecordService};

/// Install a tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops. Binaries and tests
/// call this before exercising the engine.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
