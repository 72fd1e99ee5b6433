use crate::application::ports::ChangeLogStore;
use crate::domain::entities::ChangeLogEntry;
use crate::domain::value_objects::ChangeOperation;
use crate::infrastructure::database::rows::BackupChangeRow;
use crate::infrastructure::database::DbPool;
use crate::shared::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// SQLite-backed change ledger. The entry timestamp doubles as its primary
/// key, so registration bumps past the previous entry when two mutations
/// land within the same millisecond.
pub struct SqliteChangeLog {
    pool: DbPool,
    recording: AtomicBool,
    last_timestamp: Mutex<i64>,
}

impl SqliteChangeLog {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            recording: AtomicBool::new(true),
            last_timestamp: Mutex::new(0),
        }
    }

    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self
            .last_timestamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let timestamp = now.max(*last + 1);
        *last = timestamp;
        timestamp
    }
}

#[async_trait]
impl ChangeLogStore for SqliteChangeLog {
    async fn register_change(
        &self,
        collection: &str,
        pk: &Value,
        operation: ChangeOperation,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO backup_changes (timestamp, collection, object_pk, operation) VALUES (?, ?, ?, ?)",
        )
        .bind(self.next_timestamp())
        .bind(collection)
        .bind(serde_json::to_string(pk)?)
        .bind(operation.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_changes(&self, limit: u32) -> Result<Vec<ChangeLogEntry>> {
        let rows = sqlx::query_as::<_, BackupChangeRow>(
            "SELECT timestamp, collection, object_pk, operation FROM backup_changes ORDER BY timestamp ASC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BackupChangeRow::into_entry).collect()
    }

    async fn forget_changes(&self, entry_pks: &[i64]) -> Result<()> {
        if entry_pks.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; entry_pks.len()].join(", ");
        let sql = format!("DELETE FROM backup_changes WHERE timestamp IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for pk in entry_pks {
            query = query.bind(pk);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn forget_all_changes(&self) -> Result<()> {
        sqlx::query("DELETE FROM backup_changes")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_queued_changes_by_collection(
        &self,
        collection: &str,
        until: i64,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM backup_changes WHERE collection = ? AND timestamp <= ?",
        )
        .bind(collection)
        .bind(until)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::SeqCst);
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}
