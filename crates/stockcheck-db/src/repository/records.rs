//! # Record Repository
//!
//! Change-tracked storage for every synced table.
//!
//! ## Dirty Tracking
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Local write → push → synced                          │
//! │                                                                         │
//! │  create(table, payload)                                                │
//! │       │   sync_status = 'created', revision = 1                        │
//! │       ▼                                                                 │
//! │  update(table, id, patch)                                              │
//! │       │   merge payload, add patch keys to changed_columns             │
//! │       │   'created' stays 'created', 'synced' becomes 'updated'        │
//! │       ▼                                                                 │
//! │  collect_dirty()                                                       │
//! │       │   ChangeSet + revision of every dirty row                      │
//! │       ▼                                                                 │
//! │  ... push succeeds ...                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  mark_synced(&collected)                                               │
//! │       │   only rows whose revision did not move since collection       │
//! │       ▼                                                                 │
//! │  sync_status = 'synced' (tombstones are removed)                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Applying Pulled Changes
//! Last write wins on `updated_at`. A locally dirty row survives a pulled
//! version only when its own `updated_at` is strictly newer. A local
//! tombstone is never resurrected by a pulled create/update. A pulled delete
//! always removes the row.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::Utc;
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use stockcheck_core::{
    record_id, ChangeSet, LocalChanges, RawRecord, RecordRevision, CHANGED_COLUMN, STATUS_COLUMN,
};

use crate::error::{DbError, DbResult};

const UPDATED_AT: &str = "updated_at";
const CREATED_AT: &str = "created_at";

// =============================================================================
// Record Status
// =============================================================================

/// Sync status of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Synced,
    Created,
    Updated,
    Deleted,
}

impl RecordStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Synced => "synced",
            RecordStatus::Created => "created",
            RecordStatus::Updated => "updated",
            RecordStatus::Deleted => "deleted",
        }
    }

    /// Anything not yet acknowledged by the backend.
    pub const fn is_dirty(&self) -> bool {
        !matches!(self, RecordStatus::Synced)
    }
}

impl FromStr for RecordStatus {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(RecordStatus::Synced),
            "created" => Ok(RecordStatus::Created),
            "updated" => Ok(RecordStatus::Updated),
            "deleted" => Ok(RecordStatus::Deleted),
            other => Err(DbError::Internal(format!("unknown sync_status '{other}'"))),
        }
    }
}

// =============================================================================
// Stored Record
// =============================================================================

/// A record as held on the device.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub table: String,
    pub id: String,
    pub payload: RawRecord,
    pub status: RecordStatus,
    pub changed_columns: Vec<String>,
    pub revision: i64,
    /// Last write time, ms since epoch.
    pub updated_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    table_name: String,
    id: String,
    payload: String,
    sync_status: String,
    changed_columns: String,
    revision: i64,
    updated_at: i64,
}

impl TryFrom<RecordRow> for StoredRecord {
    type Error = DbError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let payload: RawRecord = serde_json::from_str(&row.payload)?;
        Ok(StoredRecord {
            status: row.sync_status.parse()?,
            changed_columns: split_columns(&row.changed_columns),
            table: row.table_name,
            id: row.id,
            payload,
            revision: row.revision,
            updated_at: row.updated_at,
        })
    }
}

/// Outcome of applying a pulled change set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Rows inserted or overwritten with the pulled version.
    pub applied: usize,
    /// Pulled rows ignored because the local version wins.
    pub skipped: usize,
    /// Rows removed by pulled deletions.
    pub deleted: usize,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for change-tracked records.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    /// Creates a new RecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RecordRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Local writes
    // -------------------------------------------------------------------------

    /// Inserts a new record and marks it `created`.
    ///
    /// Uses the payload's `id` when present, otherwise a fresh UUID v4.
    /// Stamps `created_at` (if missing) and `updated_at`.
    pub async fn create(&self, table: &str, payload: Value) -> DbResult<String> {
        let mut record = into_object(table, payload)?;
        let id = match record_id(&record) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let now = now_millis();

        record.insert("id".to_string(), Value::String(id.clone()));
        record.entry(CREATED_AT).or_insert_with(|| Value::from(now));
        record.insert(UPDATED_AT.to_string(), Value::from(now));

        sqlx::query(
            r#"
            INSERT INTO records (table_name, id, payload, sync_status, changed_columns, revision, updated_at)
            VALUES (?1, ?2, ?3, 'created', '', 1, ?4)
            "#,
        )
        .bind(table)
        .bind(&id)
        .bind(serde_json::to_string(&record)?)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(table = %table, id = %id, "Record created");
        Ok(id)
    }

    /// Merges `patch` into an existing record.
    ///
    /// The `id` key of the patch is ignored. Patched keys are added to the
    /// record's changed columns.
    pub async fn update(&self, table: &str, id: &str, patch: Value) -> DbResult<StoredRecord> {
        let patch = into_object(table, patch)?;
        let mut tx = self.pool.begin().await?;

        let mut record = match fetch_row(&mut tx, table, id).await? {
            Some(record) if record.status != RecordStatus::Deleted => record,
            _ => return Err(DbError::not_found(table, id)),
        };

        let now = now_millis();
        let mut changed: BTreeSet<String> = record.changed_columns.drain(..).collect();
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            changed.insert(key.clone());
            record.payload.insert(key, value);
        }
        record.payload.insert(UPDATED_AT.to_string(), Value::from(now));
        changed.insert(UPDATED_AT.to_string());

        record.status = match record.status {
            RecordStatus::Created => RecordStatus::Created,
            _ => RecordStatus::Updated,
        };
        record.changed_columns = if record.status == RecordStatus::Created {
            Vec::new()
        } else {
            changed.into_iter().collect()
        };
        record.revision += 1;
        record.updated_at = now;

        sqlx::query(
            r#"
            UPDATE records SET
                payload = ?3,
                sync_status = ?4,
                changed_columns = ?5,
                revision = ?6,
                updated_at = ?7
            WHERE table_name = ?1 AND id = ?2
            "#,
        )
        .bind(table)
        .bind(id)
        .bind(serde_json::to_string(&record.payload)?)
        .bind(record.status.as_str())
        .bind(record.changed_columns.join(","))
        .bind(record.revision)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(table = %table, id = %id, status = record.status.as_str(), "Record updated");
        Ok(record)
    }

    /// Soft-deletes a record.
    ///
    /// The row becomes a tombstone, even when the backend never saw it, and
    /// stays until a push carrying it succeeds. A cycle that collected the
    /// record before the delete leaves the tombstone in place.
    pub async fn mark_deleted(&self, table: &str, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        match fetch_row(&mut tx, table, id).await? {
            Some(record) if record.status != RecordStatus::Deleted => {}
            _ => return Err(DbError::not_found(table, id)),
        }

        sqlx::query(
            r#"
            UPDATE records SET
                sync_status = 'deleted',
                revision = revision + 1,
                updated_at = ?3
            WHERE table_name = ?1 AND id = ?2
            "#,
        )
        .bind(table)
        .bind(id)
        .bind(now_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(table = %table, id = %id, "Record marked deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Gets a live (not deleted) record.
    pub async fn get(&self, table: &str, id: &str) -> DbResult<Option<StoredRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT table_name, id, payload, sync_status, changed_columns, revision, updated_at
            FROM records
            WHERE table_name = ?1 AND id = ?2 AND sync_status != 'deleted'
            "#,
        )
        .bind(table)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredRecord::try_from).transpose()
    }

    /// Lists live records of a table, ordered by id.
    pub async fn list(&self, table: &str) -> DbResult<Vec<StoredRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT table_name, id, payload, sync_status, changed_columns, revision, updated_at
            FROM records
            WHERE table_name = ?1 AND sync_status != 'deleted'
            ORDER BY id ASC
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredRecord::try_from).collect()
    }

    /// Number of records waiting to be pushed, tombstones included.
    pub async fn count_dirty(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE sync_status != 'synced'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn has_dirty(&self) -> DbResult<bool> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM records WHERE sync_status != 'synced')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    // -------------------------------------------------------------------------
    // Sync
    // -------------------------------------------------------------------------

    /// Collects every dirty record into a change set.
    ///
    /// Created/updated records carry `_status` and `_changed`. Strip them
    /// with [`ChangeSet::snapshot`] before sending.
    pub async fn collect_dirty(&self) -> DbResult<LocalChanges> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT table_name, id, payload, sync_status, changed_columns, revision, updated_at
            FROM records
            WHERE sync_status != 'synced'
            ORDER BY table_name ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut local = LocalChanges::default();
        for row in rows {
            let record = StoredRecord::try_from(row)?;
            local.revisions.push(RecordRevision {
                table: record.table.clone(),
                id: record.id.clone(),
                revision: record.revision,
            });

            let table = local.changes.table_mut(&record.table);
            let mut payload = record.payload;
            payload.insert(
                STATUS_COLUMN.to_string(),
                Value::String(record.status.as_str().to_string()),
            );
            payload.insert(
                CHANGED_COLUMN.to_string(),
                Value::String(record.changed_columns.join(",")),
            );

            match record.status {
                RecordStatus::Created => table.created.push(payload),
                RecordStatus::Updated => table.updated.push(payload),
                RecordStatus::Deleted => table.deleted.push(record.id),
                RecordStatus::Synced => {}
            }
        }

        debug!(records = local.revisions.len(), "Collected dirty records");
        Ok(local)
    }

    /// Applies a pulled change set in one transaction.
    pub async fn apply_remote(&self, changes: &ChangeSet) -> DbResult<ApplyReport> {
        let mut report = ApplyReport::default();
        let mut tx = self.pool.begin().await?;

        for (table, table_changes) in changes.tables() {
            for record in table_changes
                .created
                .iter()
                .chain(table_changes.updated.iter())
            {
                if upsert_remote(&mut tx, table, record).await? {
                    report.applied += 1;
                } else {
                    report.skipped += 1;
                }
            }

            for id in &table_changes.deleted {
                let result = sqlx::query("DELETE FROM records WHERE table_name = ?1 AND id = ?2")
                    .bind(table)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                report.deleted += result.rows_affected() as usize;
            }
        }

        tx.commit().await?;

        if report != ApplyReport::default() {
            info!(
                applied = report.applied,
                skipped = report.skipped,
                deleted = report.deleted,
                "Applied pulled changes"
            );
        }
        Ok(report)
    }

    /// Clears dirty markers for records pushed at their collected revision.
    ///
    /// Rows edited after collection keep their markers for the next push.
    /// Returns how many rows were cleared.
    pub async fn mark_synced(&self, pushed: &LocalChanges) -> DbResult<u64> {
        let mut cleared = 0;
        let mut tx = self.pool.begin().await?;

        for entry in &pushed.revisions {
            let removed = sqlx::query(
                r#"
                DELETE FROM records
                WHERE table_name = ?1 AND id = ?2 AND revision = ?3 AND sync_status = 'deleted'
                "#,
            )
            .bind(&entry.table)
            .bind(&entry.id)
            .bind(entry.revision)
            .execute(&mut *tx)
            .await?;

            let updated = sqlx::query(
                r#"
                UPDATE records SET
                    sync_status = 'synced',
                    changed_columns = ''
                WHERE table_name = ?1 AND id = ?2 AND revision = ?3
                  AND sync_status IN ('created', 'updated')
                "#,
            )
            .bind(&entry.table)
            .bind(&entry.id)
            .bind(entry.revision)
            .execute(&mut *tx)
            .await?;

            cleared += removed.rows_affected() + updated.rows_affected();
        }

        tx.commit().await?;

        debug!(cleared, "Marked records synced");
        Ok(cleared)
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn fetch_row(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    id: &str,
) -> DbResult<Option<StoredRecord>> {
    let row: Option<RecordRow> = sqlx::query_as(
        r#"
        SELECT table_name, id, payload, sync_status, changed_columns, revision, updated_at
        FROM records
        WHERE table_name = ?1 AND id = ?2
        "#,
    )
    .bind(table)
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(StoredRecord::try_from).transpose()
}

/// Returns false when the local version wins.
async fn upsert_remote(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    record: &RawRecord,
) -> DbResult<bool> {
    let id = record_id(record)
        .ok_or_else(|| DbError::invalid_record(table, "pulled record has no string id"))?;
    let remote_updated_at = record
        .get(UPDATED_AT)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or_else(now_millis);

    if let Some(local) = fetch_row(tx, table, id).await? {
        match local.status {
            RecordStatus::Deleted => {
                debug!(table = %table, id = %id, "Keeping local deletion");
                return Ok(false);
            }
            RecordStatus::Created | RecordStatus::Updated
                if local.updated_at > remote_updated_at =>
            {
                debug!(table = %table, id = %id, "Local edit is newer, keeping it");
                return Ok(false);
            }
            _ => {}
        }
    }

    sqlx::query(
        r#"
        INSERT INTO records (table_name, id, payload, sync_status, changed_columns, revision, updated_at)
        VALUES (?1, ?2, ?3, 'synced', '', 1, ?4)
        ON CONFLICT (table_name, id) DO UPDATE SET
            payload = excluded.payload,
            sync_status = 'synced',
            changed_columns = '',
            revision = records.revision + 1,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(table)
    .bind(id)
    .bind(serde_json::to_string(record)?)
    .bind(remote_updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(true)
}

fn into_object(table: &str, value: Value) -> DbResult<RawRecord> {
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(DbError::invalid_record(table, "payload must be a JSON object")),
    }
}

fn split_columns(columns: &str) -> Vec<String> {
    columns
        .split(',')
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// =============================================================================
// Unit Tests
// =============================================================================
