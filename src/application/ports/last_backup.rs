use crate::shared::error::Result;
use async_trait::async_trait;

/// Persisted timestamps of the last successful backup run.
///
/// `last_backup_time` is the run's logical cut-off (changes registered after
/// it belong to the next run); `last_backup_finish_time` is wall-clock
/// completion, kept for display.
#[async_trait]
pub trait LastBackupStore: Send + Sync {
    async fn last_backup_time(&self) -> Result<Option<i64>>;

    async fn store_last_backup_time(&self, time: i64) -> Result<()>;

    async fn last_backup_finish_time(&self) -> Result<Option<i64>>;

    async fn store_last_backup_finish_time(&self, time: i64) -> Result<()>;

    async fn remove_backup_times(&self) -> Result<()>;
}
