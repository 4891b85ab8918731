//! Engine Store Connection Management
//!
//! This module provides the database connection and schema bootstrap for the
//! engine's persistent state, using libsql/Turso as the embedded backend.
//!
//! # Architecture
//!
//! - **Three engine tables**: remote ID mappings, pending relations and
//!   deferred operations (the state that survives across requests)
//! - **One reference table**: `records`, used by the bundled reference
//!   persistence gateway (see `gateway::TursoGateway`)
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Idempotent schema**: `CREATE TABLE IF NOT EXISTS`, safe to re-run
//!
//! # Concurrency model
//!
//! Every mutation the stores issue is a single SQL statement. The UNIQUE
//! primary key on `remote_id_mappings.remote_id` is the sole
//! concurrency-correctness mechanism: two request handlers racing to map the
//! same remote ID produce one winner and one clean constraint violation,
//! never a corrupted mapping. No additional locking is layered on top.
//!
//! # Database Connection Patterns
//!
//! Always use `connect_with_timeout()` in async functions. The busy timeout
//! lets concurrent operations wait and retry instead of failing immediately
//! with `SQLITE_BUSY` when the Tokio runtime interleaves writers.

use crate::db::error::StoreError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service managing the libsql connection and engine schema
///
/// # Examples
///
/// ```no_run
/// use contentbridge_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = DatabaseService::new(PathBuf::from("./data/contentbridge.db")).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    /// 4. Enable SQLite features (WAL mode, foreign keys)
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| StoreError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema().await?;

        Ok(service)
    }

    /// Create an in-memory database (primarily for tests)
    pub async fn new_in_memory() -> Result<Self, StoreError> {
        let db_path = PathBuf::from(":memory:");
        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| StoreError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema().await?;

        Ok(service)
    }

    /// Open a plain connection
    ///
    /// Use only in single-threaded synchronous contexts; async code should
    /// call `connect_with_timeout()`.
    pub fn connect(&self) -> Result<libsql::Connection, StoreError> {
        Ok(self.db.connect()?)
    }

    /// Open a connection with a 5 second busy timeout applied
    ///
    /// This is the default connection entry point for all store code: the
    /// busy timeout makes SQLite wait for a competing writer instead of
    /// failing immediately with `SQLITE_BUSY`.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, StoreError> {
        let conn = self.db.connect()?;
        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        Ok(conn)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of
    /// execute(). This helper encapsulates that pattern.
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), StoreError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            StoreError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            StoreError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// # Schema
    ///
    /// - `remote_id_mappings`: remote ID → (table, uid) with change-hash and
    ///   per-handler metadata; `remote_id` is the PRIMARY KEY, which doubles
    ///   as the uniqueness constraint identity conflicts rest on
    /// - `pending_relations`: relation values waiting for a remote ID to be
    ///   mapped, keyed by the waited-on remote ID and by the owning
    ///   (table, field, record) triple
    /// - `deferred_operations`: whole operations waiting for a dependency,
    ///   replayed in creation order
    /// - `records`: generic record rows for the reference gateway
    async fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.connect_with_timeout().await?;

        // WAL mode for better concurrency between request handlers
        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS remote_id_mappings (
                remote_id TEXT PRIMARY KEY,
                table_name TEXT NOT NULL,
                uid INTEGER NOT NULL,
                record_hash TEXT NOT NULL,
                metadata JSON NOT NULL DEFAULT '{}'
            )",
            (),
        )
        .await
        .map_err(|e| {
            StoreError::sql_execution(format!("Failed to create remote_id_mappings table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS pending_relations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT NOT NULL,
                field TEXT NOT NULL,
                record_uid INTEGER NOT NULL,
                remote_id TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            StoreError::sql_execution(format!("Failed to create pending_relations table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS deferred_operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dependent_remote_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                arguments JSON NOT NULL,
                record_hash TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            (),
        )
        .await
        .map_err(|e| {
            StoreError::sql_execution(format!(
                "Failed to create deferred_operations table: {}",
                e
            ))
        })?;

        // Generic record storage for the reference persistence gateway.
        // Deletes are soft (the `deleted` flag) so the delete command's
        // observable effect matches the CMS backend it stands in for.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                uid INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT NOT NULL,
                pid INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                fields JSON NOT NULL DEFAULT '{}'
            )",
            (),
        )
        .await
        .map_err(|e| {
            StoreError::sql_execution(format!("Failed to create records table: {}", e))
        })?;

        self.create_core_indexes(&conn).await?;

        Ok(())
    }

    /// Create core indexes for the engine tables
    async fn create_core_indexes(&self, conn: &libsql::Connection) -> Result<(), StoreError> {
        let indexes = [
            // Reverse lookup: (table, uid) → remote ID
            "CREATE INDEX IF NOT EXISTS idx_mappings_table_uid
                ON remote_id_mappings(table_name, uid)",
            // Resolution pass: all relations waiting on a remote ID
            "CREATE INDEX IF NOT EXISTS idx_pending_remote_id
                ON pending_relations(remote_id)",
            // Replacement and cleanup by owning triple
            "CREATE INDEX IF NOT EXISTS idx_pending_owner
                ON pending_relations(table_name, field, record_uid)",
            // Replay: all operations waiting on a remote ID, in creation order
            "CREATE INDEX IF NOT EXISTS idx_deferred_dependent
                ON deferred_operations(dependent_remote_id, created_at)",
            // Reference gateway scans by table
            "CREATE INDEX IF NOT EXISTS idx_records_table
                ON records(table_name, deleted)",
        ];

        for sql in indexes {
            conn.execute(sql, ()).await.map_err(|e| {
                StoreError::sql_execution(format!("Failed to create index: {}", e))
            })?;
        }

        Ok(())
    }
}
