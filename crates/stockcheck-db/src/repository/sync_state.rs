//! # Sync State Repository
//!
//! Key/value bookkeeping for the sync protocol. The only key that matters to
//! correctness is the pull watermark.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use stockcheck_core::Watermark;

use crate::error::DbResult;

const LAST_PULLED_AT: &str = "last_pulled_at";

/// Repository for the `sync_state` table.
#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    pool: SqlitePool,
}

impl SyncStateRepository {
    /// Creates a new SyncStateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncStateRepository { pool }
    }

    /// Last committed watermark, [`Watermark::EPOCH`] if never synced.
    pub async fn watermark(&self) -> DbResult<Watermark> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?1")
                .bind(LAST_PULLED_AT)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.map(Watermark::from_millis).unwrap_or(Watermark::EPOCH))
    }

    /// Stores `watermark` unless the stored value is already later.
    ///
    /// Returns the value in effect afterwards.
    pub async fn commit_watermark(&self, watermark: Watermark) -> DbResult<Watermark> {
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO sync_state (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET
                value = MAX(sync_state.value, excluded.value),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(LAST_PULLED_AT)
        .bind(watermark.as_millis())
        .bind(now)
        .execute(&self.pool)
        .await?;

        let stored = self.watermark().await?;
        debug!(watermark = %stored, "Watermark committed");
        Ok(stored)
    }
}
