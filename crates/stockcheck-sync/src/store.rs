//! # Local Change Store
//!
//! The on-device side of the protocol, as the orchestrator sees it.
//! [`Database`] implements it on top of the SQLite record store.

use async_trait::async_trait;

use stockcheck_core::{ChangeSet, LocalChanges, Watermark};
use stockcheck_db::Database;

use crate::error::SyncResult;

/// Local persistence consumed by a sync cycle.
#[async_trait]
pub trait LocalChangeStore: Send + Sync {
    /// Whether any record is waiting to be pushed.
    async fn has_dirty_changes(&self) -> SyncResult<bool>;

    /// Applies pulled changes atomically.
    async fn apply_remote_changes(&self, changes: &ChangeSet) -> SyncResult<()>;

    /// Snapshot of every dirty record.
    async fn collect_dirty_changes(&self) -> SyncResult<LocalChanges>;

    /// Clears dirty markers of pushed records not modified since collection.
    async fn mark_synced(&self, pushed: &LocalChanges) -> SyncResult<()>;

    async fn current_watermark(&self) -> SyncResult<Watermark>;

    /// Persists a watermark; never lowers the stored value.
    async fn commit_watermark(&self, watermark: Watermark) -> SyncResult<Watermark>;

    /// Local schema version, sent with pulls when enabled.
    async fn schema_version(&self) -> SyncResult<Option<u32>> {
        Ok(None)
    }
}

#[async_trait]
impl LocalChangeStore for Database {
    async fn has_dirty_changes(&self) -> SyncResult<bool> {
        Ok(self.records().has_dirty().await?)
    }

    async fn apply_remote_changes(&self, changes: &ChangeSet) -> SyncResult<()> {
        self.records().apply_remote(changes).await?;
        Ok(())
    }

    async fn collect_dirty_changes(&self) -> SyncResult<LocalChanges> {
        Ok(self.records().collect_dirty().await?)
    }

    async fn mark_synced(&self, pushed: &LocalChanges) -> SyncResult<()> {
        self.records().mark_synced(pushed).await?;
        Ok(())
    }

    async fn current_watermark(&self) -> SyncResult<Watermark> {
        Ok(self.sync_state().watermark().await?)
    }

    async fn commit_watermark(&self, watermark: Watermark) -> SyncResult<Watermark> {
        Ok(self.sync_state().commit_watermark(watermark).await?)
    }

    async fn schema_version(&self) -> SyncResult<Option<u32>> {
        Ok(Database::schema_version(self).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stockcheck_db::DbConfig;

    #[tokio::test]
    async fn test_database_as_change_store() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store: &dyn LocalChangeStore = &db;

        assert!(!store.has_dirty_changes().await.unwrap());
        assert_eq!(store.current_watermark().await.unwrap(), Watermark::EPOCH);
        assert_eq!(store.schema_version().await.unwrap(), Some(1));

        db.records()
            .create("scorte", json!({"quantita_in_linea": 2}))
            .await
            .unwrap();
        assert!(store.has_dirty_changes().await.unwrap());

        let local = store.collect_dirty_changes().await.unwrap();
        assert_eq!(local.record_count(), 1);

        store.mark_synced(&local).await.unwrap();
        assert!(!store.has_dirty_changes().await.unwrap());

        store
            .commit_watermark(Watermark::from_millis(1_000))
            .await
            .unwrap();
        assert_eq!(
            store.current_watermark().await.unwrap(),
            Watermark::from_millis(1_000)
        );
    }
}
