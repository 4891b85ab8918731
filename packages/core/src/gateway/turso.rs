//! TursoGateway - Reference Persistence Gateway over libsql
//!
//! The engine treats the persistence gateway as an opaque collaborator; this
//! module provides the bundled reference implementation backed by the
//! generic `records` table so the engine can run (and be integration-tested)
//! end to end without an external CMS.
//!
//! # Behavior
//!
//! - Field writes staged under a placeholder token become an INSERT; the
//!   assigned uid is reported back through `new_id_for`
//! - Field writes staged under a numeric uid merge into the existing row's
//!   JSON payload
//! - The delete command flips the soft-delete flag
//! - The copy command duplicates the source row, placing it either on a
//!   page (positive target) or after a same-table sibling (negative target)
//! - Rejections are pushed onto the error log; commit calls only return
//!   `Err` for infrastructural failures

use crate::db::DatabaseService;
use crate::gateway::{Command, CopyTarget, GatewayFactory, PersistenceGateway, RecordLookup, RecordRow};
use anyhow::{Context, Result};
use async_trait::async_trait;
use libsql::params;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Read-only record access over the `records` table
pub struct TursoRecords {
    db: Arc<DatabaseService>,
}

impl TursoRecords {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordLookup for TursoRecords {
    async fn get_record(&self, table: &str, uid: i64) -> Result<Option<RecordRow>> {
        let conn = self.db.connect_with_timeout().await?;
        let mut rows = conn
            .query(
                "SELECT uid, table_name, pid, fields FROM records
                 WHERE uid = ?1 AND table_name = ?2 AND deleted = 0",
                params![uid, table],
            )
            .await
            .context("Failed to query record")?;

        match rows.next().await.context("Failed to read record row")? {
            Some(row) => Ok(Some(row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn count_children(
        &self,
        table: &str,
        foreign_field: &str,
        parent_uid: i64,
    ) -> Result<i64> {
        let conn = self.db.connect_with_timeout().await?;
        let path = json_path(foreign_field);
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM records
                 WHERE table_name = ?1 AND deleted = 0
                   AND CAST(json_extract(fields, ?2) AS INTEGER) = ?3",
                params![table, path, parent_uid],
            )
            .await
            .context("Failed to count inline children")?;

        let row = rows
            .next()
            .await
            .context("Failed to read count row")?
            .context("COUNT query returned no row")?;
        let count: i64 = row.get(0).context("Failed to get count")?;
        Ok(count)
    }
}

/// One staged field write
#[derive(Debug, Clone)]
struct StagedFieldWrite {
    table: String,
    id: String,
    field: String,
    value: Value,
}

/// One staged command
#[derive(Debug, Clone)]
struct StagedCommand {
    table: String,
    uid: i64,
    command: Command,
}

#[derive(Default)]
struct GatewayState {
    field_writes: Vec<StagedFieldWrite>,
    commands: Vec<StagedCommand>,
    new_ids: HashMap<String, i64>,
    errors: Vec<String>,
}

/// Reference gateway instance carrying one operation's staged batch
pub struct TursoGateway {
    db: Arc<DatabaseService>,
    state: Mutex<GatewayState>,
}

impl TursoGateway {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self {
            db,
            state: Mutex::new(GatewayState::default()),
        }
    }

    /// Insert a new row from the writes staged under one placeholder
    async fn insert_record(
        &self,
        conn: &libsql::Connection,
        table: &str,
        writes: &[&StagedFieldWrite],
    ) -> Result<i64> {
        let mut fields = Map::new();
        let mut pid = 0i64;
        for write in writes {
            if write.field == "pid" {
                pid = write.value.as_i64().unwrap_or(0);
            } else {
                fields.insert(write.field.clone(), write.value.clone());
            }
        }
        let payload = serde_json::to_string(&Value::Object(fields))?;

        conn.execute(
            "INSERT INTO records (table_name, pid, fields) VALUES (?1, ?2, ?3)",
            params![table, pid, payload],
        )
        .await
        .context("Failed to insert record")?;

        Ok(conn.last_insert_rowid())
    }

    /// Merge staged writes into an existing row's payload
    async fn update_record(
        &self,
        conn: &libsql::Connection,
        table: &str,
        uid: i64,
        writes: &[&StagedFieldWrite],
    ) -> Result<Option<String>> {
        let mut rows = conn
            .query(
                "SELECT fields FROM records
                 WHERE uid = ?1 AND table_name = ?2 AND deleted = 0",
                params![uid, table],
            )
            .await
            .context("Failed to load record for update")?;

        let Some(row) = rows.next().await.context("Failed to read record row")? else {
            return Ok(Some(format!(
                "Cannot write fields: record {}/{} does not exist",
                table, uid
            )));
        };

        let payload: String = row.get(0).context("Failed to get fields")?;
        let mut fields: Map<String, Value> =
            serde_json::from_str(&payload).context("Failed to parse record fields")?;

        let mut pid_update: Option<i64> = None;
        for write in writes {
            if write.field == "pid" {
                pid_update = write.value.as_i64();
            } else {
                fields.insert(write.field.clone(), write.value.clone());
            }
        }
        let payload = serde_json::to_string(&Value::Object(fields))?;

        if let Some(pid) = pid_update {
            conn.execute(
                "UPDATE records SET fields = ?1, pid = ?2 WHERE uid = ?3 AND table_name = ?4",
                params![payload, pid, uid, table],
            )
            .await
            .context("Failed to update record")?;
        } else {
            conn.execute(
                "UPDATE records SET fields = ?1 WHERE uid = ?2 AND table_name = ?3",
                params![payload, uid, table],
            )
            .await
            .context("Failed to update record")?;
        }

        Ok(None)
    }

    /// Duplicate a row for the copy command, returning the new uid
    async fn copy_record(
        &self,
        conn: &libsql::Connection,
        table: &str,
        uid: i64,
        target: CopyTarget,
    ) -> Result<Result<i64, String>> {
        let mut rows = conn
            .query(
                "SELECT fields FROM records
                 WHERE uid = ?1 AND table_name = ?2 AND deleted = 0",
                params![uid, table],
            )
            .await
            .context("Failed to load copy source")?;

        let Some(row) = rows.next().await.context("Failed to read copy source")? else {
            return Ok(Err(format!(
                "Cannot copy: record {}/{} does not exist",
                table, uid
            )));
        };
        let payload: String = row.get(0).context("Failed to get fields")?;

        let pid = match target {
            CopyTarget::Page(pid) => pid,
            CopyTarget::AfterRecord(sibling_uid) => {
                let mut rows = conn
                    .query(
                        "SELECT pid FROM records
                         WHERE uid = ?1 AND table_name = ?2 AND deleted = 0",
                        params![sibling_uid, table],
                    )
                    .await
                    .context("Failed to load copy sibling")?;
                match rows.next().await.context("Failed to read sibling row")? {
                    Some(row) => row.get(0).context("Failed to get sibling pid")?,
                    None => {
                        return Ok(Err(format!(
                            "Cannot copy after {}/{}: sibling does not exist",
                            table, sibling_uid
                        )))
                    }
                }
            }
        };

        conn.execute(
            "INSERT INTO records (table_name, pid, fields) VALUES (?1, ?2, ?3)",
            params![table, pid, payload],
        )
        .await
        .context("Failed to insert copied record")?;

        Ok(Ok(conn.last_insert_rowid()))
    }
}

#[async_trait]
impl PersistenceGateway for TursoGateway {
    async fn stage_field_write(
        &self,
        table: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.field_writes.push(StagedFieldWrite {
            table: table.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            value,
        });
        Ok(())
    }

    async fn stage_command(&self, table: &str, uid: i64, command: Command) -> Result<()> {
        let mut state = self.state.lock().await;
        state.commands.push(StagedCommand {
            table: table.to_string(),
            uid,
            command,
        });
        Ok(())
    }

    async fn commit_field_writes(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.field_writes.is_empty() {
            return Ok(());
        }
        let conn = self.db.connect_with_timeout().await?;

        // Group staged writes per (table, id), preserving staging order.
        let mut order: Vec<(String, String)> = Vec::new();
        let mut groups: HashMap<(String, String), Vec<usize>> = HashMap::new();
        for (index, write) in state.field_writes.iter().enumerate() {
            let key = (write.table.clone(), write.id.clone());
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(index);
        }

        let mut new_ids: Vec<(String, i64)> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for key in &order {
            let writes: Vec<&StagedFieldWrite> = groups[key]
                .iter()
                .map(|&i| &state.field_writes[i])
                .collect();
            let (table, id) = key;

            match id.parse::<i64>() {
                Ok(uid) => {
                    if let Some(error) = self.update_record(&conn, table, uid, &writes).await? {
                        errors.push(error);
                    }
                }
                Err(_) => {
                    let uid = self.insert_record(&conn, table, &writes).await?;
                    new_ids.push((id.clone(), uid));
                }
            }
        }

        state.field_writes.clear();
        state.new_ids.extend(new_ids);
        state.errors.extend(errors);
        Ok(())
    }

    async fn commit_commands(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.commands.is_empty() {
            return Ok(());
        }
        let conn = self.db.connect_with_timeout().await?;

        let commands = std::mem::take(&mut state.commands);
        for staged in commands {
            match staged.command {
                Command::Delete => {
                    let affected = conn
                        .execute(
                            "UPDATE records SET deleted = 1
                             WHERE uid = ?1 AND table_name = ?2 AND deleted = 0",
                            params![staged.uid, staged.table.as_str()],
                        )
                        .await
                        .context("Failed to delete record")?;
                    if affected == 0 {
                        state.errors.push(format!(
                            "Cannot delete: record {}/{} does not exist",
                            staged.table, staged.uid
                        ));
                    }
                }
                Command::Copy {
                    target,
                    placeholder,
                } => match self
                    .copy_record(&conn, &staged.table, staged.uid, target)
                    .await?
                {
                    Ok(new_uid) => {
                        state.new_ids.insert(placeholder, new_uid);
                    }
                    Err(error) => state.errors.push(error),
                },
            }
        }
        Ok(())
    }

    async fn errors(&self) -> Vec<String> {
        self.state.lock().await.errors.clone()
    }

    async fn new_id_for(&self, placeholder: &str) -> Option<i64> {
        self.state.lock().await.new_ids.get(placeholder).copied()
    }
}

/// Factory wiring the reference gateway to a shared database service
pub struct TursoGatewayFactory {
    db: Arc<DatabaseService>,
}

impl TursoGatewayFactory {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }
}

impl GatewayFactory for TursoGatewayFactory {
    fn create_gateway(&self) -> Box<dyn PersistenceGateway> {
        Box::new(TursoGateway::new(self.db.clone()))
    }
}

/// JSON path addressing a top-level field inside the `fields` payload
fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field)
}

/// Convert a `records` row to a RecordRow model
fn row_to_record(row: &libsql::Row) -> Result<RecordRow> {
    let uid: i64 = row.get(0).context("Failed to get uid")?;
    let table: String = row.get(1).context("Failed to get table_name")?;
    let pid: i64 = row.get(2).context("Failed to get pid")?;
    let payload: String = row.get(3).context("Failed to get fields")?;

    let fields: Map<String, Value> =
        serde_json::from_str(&payload).context("Failed to parse record fields")?;

    Ok(RecordRow {
        uid,
        table,
        pid,
        fields,
    })
}
