use crate::application::ports::LastBackupStore;
use crate::infrastructure::database::DbPool;
use crate::shared::error::Result;
use async_trait::async_trait;

const LAST_BACKUP_KEY: &str = "last_backup";
const LAST_BACKUP_FINISH_KEY: &str = "last_backup_finish";

/// Key-value persistence for backup timestamps in the `backup_info` table.
pub struct SqliteBackupInfo {
    pool: DbPool,
}

impl SqliteBackupInfo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM backup_info WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO backup_info (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LastBackupStore for SqliteBackupInfo {
    async fn last_backup_time(&self) -> Result<Option<i64>> {
        self.get(LAST_BACKUP_KEY).await
    }

    async fn store_last_backup_time(&self, time: i64) -> Result<()> {
        self.set(LAST_BACKUP_KEY, time).await
    }

    async fn last_backup_finish_time(&self) -> Result<Option<i64>> {
        self.get(LAST_BACKUP_FINISH_KEY).await
    }

    async fn store_last_backup_finish_time(&self, time: i64) -> Result<()> {
        self.set(LAST_BACKUP_FINISH_KEY, time).await
    }

    async fn remove_backup_times(&self) -> Result<()> {
        sqlx::query("DELETE FROM backup_info WHERE key IN (?, ?)")
            .bind(LAST_BACKUP_KEY)
            .bind(LAST_BACKUP_FINISH_KEY)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
