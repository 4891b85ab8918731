//! Integration tests for the remote ID mapping store
//!
//! Tests cover:
//! - Round trip (add → get → remove)
//! - Uniqueness invariant on the remote ID
//! - Stale-mapping purge when the backing record is gone
//! - Reverse lookup and table lookup
//! - Change-hash comparison
//! - Namespaced per-mapping metadata

use anyhow::Result;
use contentbridge_core::config::BridgeConfig;
use contentbridge_core::db::{DatabaseService, StoreError};
use contentbridge_core::schema::{SchemaConfig, SchemaRegistry};
use contentbridge_core::services::RecordService;
use libsql::params;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

/// Test helper: service over a fresh database with a minimal schema
async fn create_test_env() -> Result<(RecordService, Arc<DatabaseService>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let db = Arc::new(DatabaseService::new(db_path).await?);

    let schema: SchemaConfig = serde_json::from_value(json!({
        "tables": {
            "pages": { "fields": { "title": {} } },
            "tt_content": { "fields": { "header": {} } }
        }
    }))?;
    let service = RecordService::with_database(
        db.clone(),
        Arc::new(SchemaRegistry::new(schema)),
        BridgeConfig::default(),
    );
    Ok((service, db, temp_dir))
}

/// Test helper: insert a raw record row, returning its uid
async fn insert_record(db: &DatabaseService, table: &str) -> Result<i64> {
    let conn = db.connect_with_timeout().await?;
    conn.execute(
        "INSERT INTO records (table_name, pid, fields) VALUES (?1, 0, '{}')",
        params![table],
    )
    .await?;
    Ok(conn.last_insert_rowid())
}

// =========================================================================
// Round Trip
// =========================================================================

#[tokio::test]
async fn test_add_get_remove_round_trip() -> Result<()> {
    let (service, db, _temp_dir) = create_test_env().await?;
    let mappings = &service.context().mappings;

    let uid = insert_record(&db, "pages").await?;
    mappings.add("page-a", "pages", uid, "hash-1").await?;

    assert_eq!(mappings.get("page-a").await?, uid);
    assert!(mappings.exists("page-a").await?);
    assert_eq!(mappings.table_for("page-a").await?.as_deref(), Some("pages"));

    mappings.remove("page-a").await?;
    assert_eq!(mappings.get("page-a").await?, 0);
    assert!(!mappings.exists("page-a").await?);
    Ok(())
}

#[tokio::test]
async fn test_get_unknown_remote_id_is_zero() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;
    assert_eq!(service.context().mappings.get("nope").await?, 0);
    Ok(())
}

// =========================================================================
// Uniqueness Invariant
// =========================================================================

#[tokio::test]
async fn test_second_add_conflicts_regardless_of_table_and_uid() -> Result<()> {
    let (service, db, _temp_dir) = create_test_env().await?;
    let mappings = &service.context().mappings;

    let uid = insert_record(&db, "pages").await?;
    let other_uid = insert_record(&db, "tt_content").await?;

    mappings.add("shared", "pages", uid, "hash-1").await?;
    let conflict = mappings
        .add("shared", "tt_content", other_uid, "hash-2")
        .await;

    assert!(matches!(
        conflict,
        Err(StoreError::DuplicateRemoteId { remote_id }) if remote_id == "shared"
    ));

    // The original mapping is untouched.
    assert_eq!(mappings.get("shared").await?, uid);
    assert_eq!(mappings.table_for("shared").await?.as_deref(), Some("pages"));
    Ok(())
}

// =========================================================================
// Stale Mapping Purge
// =========================================================================

#[tokio::test]
async fn test_mapping_without_backing_record_is_purged() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;
    let mappings = &service.context().mappings;

    // Mapping to a uid that never existed.
    mappings.add("ghost", "pages", 9999, "hash-1").await?;
    assert_eq!(mappings.get("ghost").await?, 0);

    // The stale row was removed as a side effect.
    assert!(mappings.table_for("ghost").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_mapping_purged_after_out_of_band_delete() -> Result<()> {
    let (service, db, _temp_dir) = create_test_env().await?;
    let mappings = &service.context().mappings;

    let uid = insert_record(&db, "pages").await?;
    mappings.add("page-a", "pages", uid, "hash-1").await?;
    assert_eq!(mappings.get("page-a").await?, uid);

    // Delete the record behind the store's back.
    let conn = db.connect_with_timeout().await?;
    conn.execute("UPDATE records SET deleted = 1 WHERE uid = ?1", params![uid])
        .await?;

    assert_eq!(mappings.get("page-a").await?, 0);
    assert!(mappings.table_for("page-a").await?.is_none());
    Ok(())
}

// =========================================================================
// Lookups
// =========================================================================

#[tokio::test]
async fn test_reverse_lookup() -> Result<()> {
    let (service, db, _temp_dir) = create_test_env().await?;
    let mappings = &service.context().mappings;

    let uid = insert_record(&db, "pages").await?;
    mappings.add("page-a", "pages", uid, "hash-1").await?;

    assert_eq!(
        mappings.remote_id_for("pages", uid).await?.as_deref(),
        Some("page-a")
    );
    assert!(mappings.remote_id_for("pages", uid + 1).await?.is_none());
    assert!(mappings.remote_id_for("tt_content", uid).await?.is_none());
    Ok(())
}

// =========================================================================
// Change-Hash Comparison
// =========================================================================

#[tokio::test]
async fn test_is_same_as_previous() -> Result<()> {
    let (service, db, _temp_dir) = create_test_env().await?;
    let mappings = &service.context().mappings;

    assert!(!mappings.is_same_as_previous("page-a", "hash-1").await?);

    let uid = insert_record(&db, "pages").await?;
    mappings.add("page-a", "pages", uid, "hash-1").await?;
    assert!(mappings.is_same_as_previous("page-a", "hash-1").await?);
    assert!(!mappings.is_same_as_previous("page-a", "hash-2").await?);

    mappings.update_hash("page-a", "hash-2").await?;
    assert!(mappings.is_same_as_previous("page-a", "hash-2").await?);
    assert!(!mappings.is_same_as_previous("page-a", "hash-1").await?);
    Ok(())
}

// =========================================================================
// Metadata
// =========================================================================

#[tokio::test]
async fn test_metadata_is_namespaced_per_handler() -> Result<()> {
    let (service, db, _temp_dir) = create_test_env().await?;
    let mappings = &service.context().mappings;

    let uid = insert_record(&db, "pages").await?;
    mappings.add("page-a", "pages", uid, "hash-1").await?;

    mappings
        .set_meta_value("page-a", "relation_order", &json!({"media": ["f1", "f2"]}))
        .await?;
    mappings
        .set_meta_value("page-a", "other_handler", &json!(42))
        .await?;

    assert_eq!(
        mappings.get_meta_value("page-a", "relation_order").await?,
        Some(json!({"media": ["f1", "f2"]}))
    );
    assert_eq!(
        mappings.get_meta_value("page-a", "other_handler").await?,
        Some(json!(42))
    );
    assert!(mappings.get_meta_value("page-a", "unwritten").await?.is_none());
    assert!(mappings.get_meta_value("missing", "relation_order").await?.is_none());
    Ok(())
}
