//! Integration tests for the pending relations store
//!
//! Tests cover:
//! - Parking and fetching relations by waited-on remote ID
//! - Delete-then-insert replacement per owning triple
//! - Local removal (exact field and wildcard)
//! - Removal by resolved remote ID
//! - Per-table statistics

use anyhow::Result;
use contentbridge_core::config::BridgeConfig;
use contentbridge_core::db::{DatabaseService, PendingRelation};
use contentbridge_core::schema::{SchemaConfig, SchemaRegistry};
use contentbridge_core::services::RecordService;
use libsql::params;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

/// Test helper: service over a fresh database
async fn create_test_env() -> Result<(RecordService, Arc<DatabaseService>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let db = Arc::new(DatabaseService::new(db_path).await?);

    let schema: SchemaConfig = serde_json::from_value(json!({
        "tables": { "pages": { "fields": { "title": {} } } }
    }))?;
    let service = RecordService::with_database(
        db.clone(),
        Arc::new(SchemaRegistry::new(schema)),
        BridgeConfig::default(),
    );
    Ok((service, db, temp_dir))
}

fn relation(table: &str, field: &str, record_uid: i64) -> PendingRelation {
    PendingRelation {
        table: table.to_string(),
        field: field.to_string(),
        record_uid,
    }
}

// =========================================================================
// Parking & Fetching
// =========================================================================

#[tokio::test]
async fn test_set_and_get_by_remote_id() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;
    let pending = &service.context().pending;

    pending
        .set(
            "tt_content",
            "parent",
            5,
            &["p1".to_string(), "p2".to_string()],
        )
        .await?;

    assert_eq!(
        pending.get("p1").await?,
        vec![relation("tt_content", "parent", 5)]
    );
    assert_eq!(
        pending.get("p2").await?,
        vec![relation("tt_content", "parent", 5)]
    );
    assert!(pending.get("p3").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_set_replaces_previous_rows_for_the_triple() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;
    let pending = &service.context().pending;

    pending
        .set("tt_content", "parent", 5, &["p1".to_string()])
        .await?;
    pending
        .set("tt_content", "parent", 5, &["p2".to_string()])
        .await?;

    // p1 was replaced wholesale by the second set.
    assert!(pending.get("p1").await?.is_empty());
    assert_eq!(
        pending.get("p2").await?,
        vec![relation("tt_content", "parent", 5)]
    );

    // A different triple waiting on p2 is unaffected by replacement above.
    pending
        .set("tt_content", "related", 5, &["p2".to_string()])
        .await?;
    assert_eq!(pending.get("p2").await?.len(), 2);
    Ok(())
}

// =========================================================================
// Removal
// =========================================================================

#[tokio::test]
async fn test_remove_local_exact_field() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;
    let pending = &service.context().pending;

    pending
        .set("tt_content", "parent", 5, &["p1".to_string()])
        .await?;
    pending
        .set("tt_content", "related", 5, &["p1".to_string()])
        .await?;

    pending.remove_local("tt_content", Some("parent"), 5).await?;

    let remaining = pending.get("p1").await?;
    assert_eq!(remaining, vec![relation("tt_content", "related", 5)]);
    Ok(())
}

#[tokio::test]
async fn test_remove_local_wildcard_clears_all_fields() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;
    let pending = &service.context().pending;

    pending
        .set("tt_content", "parent", 5, &["p1".to_string()])
        .await?;
    pending
        .set("tt_content", "related", 5, &["p2".to_string()])
        .await?;
    pending
        .set("tt_content", "parent", 6, &["p1".to_string()])
        .await?;

    pending.remove_local("tt_content", None, 5).await?;

    assert_eq!(pending.get("p1").await?, vec![relation("tt_content", "parent", 6)]);
    assert!(pending.get("p2").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_remove_remote_clears_all_waiters() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;
    let pending = &service.context().pending;

    pending
        .set("tt_content", "parent", 5, &["p1".to_string()])
        .await?;
    pending
        .set("pages", "shortcut", 7, &["p1".to_string(), "p2".to_string()])
        .await?;

    pending.remove_remote("p1").await?;

    assert!(pending.get("p1").await?.is_empty());
    // Rows waiting on other remote IDs survive.
    assert_eq!(pending.get("p2").await?, vec![relation("pages", "shortcut", 7)]);
    Ok(())
}

// =========================================================================
// Statistics
// =========================================================================

#[tokio::test]
async fn test_stats_report_waiting_and_resolvable() -> Result<()> {
    let (service, db, _temp_dir) = create_test_env().await?;
    let pending = &service.context().pending;
    let mappings = &service.context().mappings;

    pending
        .set(
            "tt_content",
            "parent",
            5,
            &["p1".to_string(), "p2".to_string()],
        )
        .await?;
    pending
        .set("pages", "shortcut", 7, &["p3".to_string()])
        .await?;

    // Map p1 so one tt_content row becomes resolvable.
    let conn = db.connect_with_timeout().await?;
    conn.execute(
        "INSERT INTO records (table_name, pid, fields) VALUES ('pages', 0, '{}')",
        params![],
    )
    .await?;
    let uid = conn.last_insert_rowid();
    mappings.add("p1", "pages", uid, "hash").await?;

    let stats = service.pending_relation_stats().await?;
    assert_eq!(stats.len(), 2);

    let pages = stats.iter().find(|s| s.table == "pages").unwrap();
    assert_eq!(pages.waiting, 1);
    assert_eq!(pages.resolvable, 0);

    let content = stats.iter().find(|s| s.table == "tt_content").unwrap();
    assert_eq!(content.waiting, 2);
    assert_eq!(content.resolvable, 1);
    Ok(())
}
