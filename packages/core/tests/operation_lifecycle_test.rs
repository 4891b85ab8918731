//! Integration tests for the record operation lifecycle
//!
//! Tests cover:
//! - Create/update/delete/copy contracts and their error taxonomy
//! - Exact-repeat short-circuiting (idempotence)
//! - Pending relation parking and resolution
//! - Translation field insertion
//! - Ordered MM relation maintenance
//! - Inline child count maintenance on delete
//! - Batch execution reporting

use anyhow::Result;
use contentbridge_core::config::BridgeConfig;
use contentbridge_core::db::DatabaseService;
use contentbridge_core::gateway::RecordLookup;
use contentbridge_core::models::{RecordIdentifier, RecordRepresentation};
use contentbridge_core::operations::{OperationArgs, OperationError};
use contentbridge_core::schema::{SchemaConfig, SchemaRegistry};
use contentbridge_core::services::{ItemStatus, RecordService};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// Test helper: service over a fresh database with a representative schema
async fn create_test_env() -> Result<(RecordService, Arc<DatabaseService>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let db = Arc::new(DatabaseService::new(db_path).await?);

    let schema: SchemaConfig = serde_json::from_value(json!({
        "tables": {
            "pages": {
                "localizable": true,
                "languageField": "sys_language_uid",
                "translationOriginField": "l10n_parent",
                "translationSourceField": "l10n_source",
                "fields": {
                    "title": {},
                    "subtitle": {},
                    "sys_language_uid": {},
                    "l10n_parent": { "relation": { "foreignTables": ["pages"] } },
                    "l10n_source": { "relation": { "foreignTables": ["pages"] } },
                    "media": {
                        "relation": { "foreignTables": ["files"], "mm": true, "ordered": true }
                    }
                }
            },
            "tt_content": {
                "fields": {
                    "header": {},
                    "parent": { "relation": { "foreignTables": ["pages"] } },
                    "related": { "relation": { "foreignTables": ["pages", "tt_content"] } },
                    "children": {
                        "relation": {
                            "foreignTables": ["content_child"],
                            "inline": true,
                            "foreignField": "parent_uid"
                        }
                    }
                }
            },
            "content_child": {
                "fields": { "parent_uid": {}, "label": {} }
            },
            "files": {
                "fields": { "name": {} }
            }
        }
    }))?;
    let service = RecordService::with_database(
        db.clone(),
        Arc::new(SchemaRegistry::new(schema)),
        BridgeConfig::default(),
    );
    Ok((service, db, temp_dir))
}

fn representation(table: &str, remote_id: &str, data: Value) -> RecordRepresentation {
    RecordRepresentation::new(RecordIdentifier::new(table, remote_id), data).unwrap()
}

// =========================================================================
// Create / Update / Delete Contracts
// =========================================================================

#[tokio::test]
async fn test_create_commits_and_maps() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let uid = service
        .create(
            representation("pages", "a", json!({"title": "Home"})),
            Map::new(),
        )
        .await?
        .expect("create should commit");

    assert!(uid > 0);
    assert_eq!(service.context().mappings.get("a").await?, uid);

    let record = service
        .context()
        .records
        .get_record("pages", uid)
        .await?
        .unwrap();
    assert_eq!(record.field("title"), Some(&json!("Home")));
    Ok(())
}

#[tokio::test]
async fn test_second_create_raises_identity_conflict() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    service
        .create(
            representation("pages", "a", json!({"title": "Home"})),
            Map::new(),
        )
        .await?;

    let conflict = service
        .create(
            representation("pages", "a", json!({"title": "Other"})),
            Map::new(),
        )
        .await;
    assert!(matches!(
        conflict,
        Err(OperationError::IdentityConflict { remote_id }) if remote_id == "a"
    ));
    Ok(())
}

#[tokio::test]
async fn test_update_missing_raises_not_found() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let missing = service
        .update(
            representation("pages", "missing-id", json!({"title": "x"})),
            Map::new(),
        )
        .await;
    assert!(matches!(
        missing,
        Err(OperationError::NotFound { remote_id }) if remote_id == "missing-id"
    ));
    Ok(())
}

#[tokio::test]
async fn test_repeated_update_short_circuits() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let uid = service
        .create(
            representation("pages", "a", json!({"title": "Home"})),
            Map::new(),
        )
        .await?
        .expect("create should commit");

    let first = service
        .update(
            representation("pages", "a", json!({"title": "Updated"})),
            Map::new(),
        )
        .await?;
    assert_eq!(first, Some(uid));

    // Byte-identical repeat: stopped without a second write.
    let second = service
        .update(
            representation("pages", "a", json!({"title": "Updated"})),
            Map::new(),
        )
        .await?;
    assert_eq!(second, None);

    // Different arguments run again.
    let third = service
        .update(
            representation("pages", "a", json!({"title": "Updated again"})),
            Map::new(),
        )
        .await?;
    assert_eq!(third, Some(uid));
    Ok(())
}

#[tokio::test]
async fn test_metadata_is_part_of_the_repeat_detection() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    service
        .create(
            representation("pages", "a", json!({"title": "Home"})),
            Map::new(),
        )
        .await?;

    let mut metadata = Map::new();
    metadata.insert("source".to_string(), json!("feed-1"));
    let first = service
        .update(
            representation("pages", "a", json!({"title": "x"})),
            metadata.clone(),
        )
        .await?;
    assert!(first.is_some());

    // Same data, different metadata: not a repeat of the previous call.
    let mut other_metadata = Map::new();
    other_metadata.insert("source".to_string(), json!("feed-2"));
    let second = service
        .update(
            representation("pages", "a", json!({"title": "x"})),
            other_metadata.clone(),
        )
        .await?;
    assert!(second.is_some());

    // Exact repeat of the previous call, metadata included: stopped.
    let third = service
        .update(
            representation("pages", "a", json!({"title": "x"})),
            other_metadata,
        )
        .await?;
    assert!(third.is_none());
    Ok(())
}

#[tokio::test]
async fn test_delete_sets_flag_and_clears_owned_pending_relations() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    // The page waits on a file that does not exist yet.
    let uid = service
        .create(
            representation("pages", "a", json!({"title": "Home", "media": ["fx"]})),
            Map::new(),
        )
        .await?
        .expect("create should commit");
    assert_eq!(service.context().pending.get("fx").await?.len(), 1);

    let deleted = service
        .delete(RecordIdentifier::new("pages", "a"), Map::new())
        .await?;
    assert_eq!(deleted, Some(uid));

    // Row is soft-deleted, mapping gone, owned pending relations removed.
    assert!(service
        .context()
        .records
        .get_record("pages", uid)
        .await?
        .is_none());
    assert_eq!(service.context().mappings.get("a").await?, 0);
    assert!(service.context().pending.get("fx").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_delete_missing_raises_not_found() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let missing = service
        .delete(RecordIdentifier::new("pages", "missing-id"), Map::new())
        .await;
    assert!(matches!(missing, Err(OperationError::NotFound { .. })));
    Ok(())
}

// =========================================================================
// Field Validation
// =========================================================================

#[tokio::test]
async fn test_unknown_field_is_rejected() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let unknown = service
        .create(
            representation("pages", "a", json!({"title": "x", "bogus": 1})),
            Map::new(),
        )
        .await;
    assert!(matches!(
        unknown,
        Err(OperationError::UnknownField { table, field })
            if table == "pages" && field == "bogus"
    ));
    Ok(())
}

#[tokio::test]
async fn test_non_scalar_value_is_rejected() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let invalid = service
        .create(
            representation("pages", "a", json!({"title": {"nested": true}})),
            Map::new(),
        )
        .await;
    assert!(matches!(invalid, Err(OperationError::InvalidArgument(_))));
    Ok(())
}

// =========================================================================
// Pending Relations
// =========================================================================

#[tokio::test]
async fn test_relation_to_unmapped_remote_id_is_parked_then_resolved() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let content_uid = service
        .create(
            representation("tt_content", "c1", json!({"header": "x", "parent": ["p1"]})),
            Map::new(),
        )
        .await?
        .expect("create should commit");

    // The relation is parked, the outgoing value is empty.
    let record = service
        .context()
        .records
        .get_record("tt_content", content_uid)
        .await?
        .unwrap();
    assert_eq!(record.field("parent"), Some(&json!("")));
    assert_eq!(service.context().pending.get("p1").await?.len(), 1);

    // Creating the target splices its uid into the waiting field.
    let page_uid = service
        .create(
            representation("pages", "p1", json!({"title": "Home"})),
            Map::new(),
        )
        .await?
        .expect("page should commit");

    let record = service
        .context()
        .records
        .get_record("tt_content", content_uid)
        .await?
        .unwrap();
    assert_eq!(record.field("parent"), Some(&json!(page_uid.to_string())));
    assert!(service.context().pending.get("p1").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_multi_table_relation_values_carry_table_tokens() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let page_uid = service
        .create(
            representation("pages", "p1", json!({"title": "Home"})),
            Map::new(),
        )
        .await?
        .expect("page should commit");
    let first_content_uid = service
        .create(
            representation("tt_content", "c1", json!({"header": "first"})),
            Map::new(),
        )
        .await?
        .expect("content should commit");

    let second_content_uid = service
        .create(
            representation(
                "tt_content",
                "c2",
                json!({"header": "second", "related": ["p1", "c1"]}),
            ),
            Map::new(),
        )
        .await?
        .expect("content should commit");

    // Multi-target group relations stay lists of table_uid tokens.
    let record = service
        .context()
        .records
        .get_record("tt_content", second_content_uid)
        .await?
        .unwrap();
    assert_eq!(
        record.field("related"),
        Some(&json!([
            format!("pages_{}", page_uid),
            format!("tt_content_{}", first_content_uid)
        ]))
    );
    Ok(())
}

// =========================================================================
// Copy
// =========================================================================

#[tokio::test]
async fn test_copy_to_page_target() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let page_uid = service
        .create(
            representation("pages", "p1", json!({"title": "Home"})),
            Map::new(),
        )
        .await?
        .expect("page should commit");
    let source_uid = service
        .create(
            representation("tt_content", "c1", json!({"header": "x"})),
            Map::new(),
        )
        .await?
        .expect("content should commit");

    let copy_uid = service
        .copy(
            RecordIdentifier::new("tt_content", "c1"),
            "pages",
            page_uid,
            "c1-copy",
            Map::new(),
        )
        .await?
        .expect("copy should commit");

    assert!(copy_uid > source_uid);
    assert_eq!(service.context().mappings.get("c1-copy").await?, copy_uid);

    let copy = service
        .context()
        .records
        .get_record("tt_content", copy_uid)
        .await?
        .unwrap();
    assert_eq!(copy.pid, page_uid);
    assert_eq!(copy.field("header"), Some(&json!("x")));
    Ok(())
}

#[tokio::test]
async fn test_copy_after_sibling_target() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let page_uid = service
        .create(
            representation("pages", "p1", json!({"title": "Home"})),
            Map::new(),
        )
        .await?
        .expect("page should commit");
    let source_uid = service
        .create(
            representation("tt_content", "c1", json!({"header": "x", "pid": "p1"})),
            Map::new(),
        )
        .await?
        .expect("content should commit");

    // Negative target: place the copy after the same-table source record.
    let copy_uid = service
        .copy(
            RecordIdentifier::new("tt_content", "c1"),
            "tt_content",
            -source_uid,
            "c1-copy",
            Map::new(),
        )
        .await?
        .expect("copy should commit");

    let copy = service
        .context()
        .records
        .get_record("tt_content", copy_uid)
        .await?
        .unwrap();
    assert_eq!(copy.pid, page_uid);
    Ok(())
}

#[tokio::test]
async fn test_copy_error_taxonomy() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    service
        .create(
            representation("tt_content", "c1", json!({"header": "x"})),
            Map::new(),
        )
        .await?;

    // Unknown source.
    let missing = service
        .copy(
            RecordIdentifier::new("tt_content", "missing"),
            "tt_content",
            1,
            "copy-a",
            Map::new(),
        )
        .await;
    assert!(matches!(missing, Err(OperationError::NotFound { .. })));

    // Target table that is neither the page table nor the source's own.
    let invalid = service
        .copy(
            RecordIdentifier::new("tt_content", "c1"),
            "files",
            1,
            "copy-b",
            Map::new(),
        )
        .await;
    assert!(matches!(invalid, Err(OperationError::InvalidArgument(_))));

    // Resulting remote ID already mapped.
    let conflict = service
        .copy(
            RecordIdentifier::new("tt_content", "c1"),
            "tt_content",
            1,
            "c1",
            Map::new(),
        )
        .await;
    assert!(matches!(conflict, Err(OperationError::IdentityConflict { .. })));
    Ok(())
}

// =========================================================================
// Translations
// =========================================================================

#[tokio::test]
async fn test_translation_fields_are_inserted() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let original_uid = service
        .create(
            representation("pages", "home", json!({"title": "Home"})),
            Map::new(),
        )
        .await?
        .expect("original should commit");

    let translated = RecordRepresentation::new(
        RecordIdentifier::with_language("pages", "home", 2),
        json!({"title": "Startseite"}),
    )?;
    let translation_uid = service
        .create(translated, Map::new())
        .await?
        .expect("translation should commit");

    // The translation maps under its own language-aspected identity.
    assert_ne!(translation_uid, original_uid);
    assert_eq!(service.context().mappings.get("home|l2").await?, translation_uid);
    assert_eq!(service.context().mappings.get("home").await?, original_uid);

    let record = service
        .context()
        .records
        .get_record("pages", translation_uid)
        .await?
        .unwrap();
    assert_eq!(record.field("sys_language_uid"), Some(&json!(2)));
    // The original pointer resolved to the default-language record's uid.
    assert_eq!(
        record.field("l10n_parent"),
        Some(&json!(original_uid.to_string()))
    );
    // The translation source field was not set by the caller and stays out.
    assert!(record.field("l10n_source").is_none());
    Ok(())
}

// =========================================================================
// Ordered MM Relations
// =========================================================================

#[tokio::test]
async fn test_ordered_relation_resolves_in_declared_order() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    // The page declares its media in an order neither file exists for yet.
    let page_uid = service
        .create(
            representation("pages", "p1", json!({"title": "Home", "media": ["f2", "f1"]})),
            Map::new(),
        )
        .await?
        .expect("page should commit");

    let f1_uid = service
        .create(
            representation("files", "f1", json!({"name": "one.jpg"})),
            Map::new(),
        )
        .await?
        .expect("file should commit");
    let f2_uid = service
        .create(
            representation("files", "f2", json!({"name": "two.jpg"})),
            Map::new(),
        )
        .await?
        .expect("file should commit");

    // Resolution arrived out of declaration order; the stored list follows
    // the declared intent, not arrival order.
    let record = service
        .context()
        .records
        .get_record("pages", page_uid)
        .await?
        .unwrap();
    assert_eq!(
        record.field("media"),
        Some(&json!(format!("{},{}", f2_uid, f1_uid)))
    );
    assert!(service.context().pending.get("f1").await?.is_empty());
    assert!(service.context().pending.get("f2").await?.is_empty());
    Ok(())
}

// =========================================================================
// Inline Child Counts
// =========================================================================

#[tokio::test]
async fn test_inline_child_count_decremented_on_delete() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let parent_uid = service
        .create(
            representation("tt_content", "parent-1", json!({"header": "parent"})),
            Map::new(),
        )
        .await?
        .expect("parent should commit");

    for (remote_id, label) in [("cc1", "first"), ("cc2", "second")] {
        service
            .create(
                representation(
                    "content_child",
                    remote_id,
                    json!({"parent_uid": parent_uid, "label": label}),
                ),
                Map::new(),
            )
            .await?
            .expect("child should commit");
    }
    service
        .update(
            representation("tt_content", "parent-1", json!({"children": 2})),
            Map::new(),
        )
        .await?;

    let child_uid = service.context().mappings.get("cc1").await?;
    service
        .delete(RecordIdentifier::new("content_child", "cc1"), Map::new())
        .await?;

    // The parent's counter was written directly alongside the delete.
    let parent = service
        .context()
        .records
        .get_record("tt_content", parent_uid)
        .await?
        .unwrap();
    assert_eq!(parent.field("children"), Some(&json!(1)));
    assert!(service
        .context()
        .records
        .get_record("content_child", child_uid)
        .await?
        .is_none());
    Ok(())
}

// =========================================================================
// Batch Execution
// =========================================================================

#[tokio::test]
async fn test_batch_reports_per_item_outcomes() -> Result<()> {
    let (service, _db, _temp_dir) = create_test_env().await?;

    let report = service
        .execute_batch(vec![
            OperationArgs::Create {
                representation: representation("pages", "a", json!({"title": "Home"})),
                metadata: Map::new(),
            },
            OperationArgs::Update {
                representation: representation("pages", "missing-id", json!({"title": "x"})),
                metadata: Map::new(),
            },
        ])
        .await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert!(!report.all_failed());

    assert!(matches!(
        report.statuses.get("a"),
        Some(ItemStatus::Succeeded { uid: Some(uid) }) if *uid > 0
    ));
    assert!(matches!(
        report.statuses.get("missing-id"),
        Some(ItemStatus::Failed { code, .. }) if code == "not_found"
    ));
    Ok(())
}
