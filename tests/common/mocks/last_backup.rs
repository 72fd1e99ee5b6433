use async_trait::async_trait;
use pagevault::application::ports::LastBackupStore;
use pagevault::Result;
use std::sync::Mutex;

/// In-memory stand-in for the SQLite backup-time store.
#[derive(Default)]
pub struct MockLastBackup {
    times: Mutex<(Option<i64>, Option<i64>)>,
}

impl MockLastBackup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_backup(time: i64) -> Self {
        let store = Self::default();
        store.times.lock().unwrap().0 = Some(time);
        store
    }
}

#[async_trait]
impl LastBackupStore for MockLastBackup {
    async fn last_backup_time(&self) -> Result<Option<i64>> {
        Ok(self.times.lock().unwrap().0)
    }

    async fn store_last_backup_time(&self, time: i64) -> Result<()> {
        self.times.lock().unwrap().0 = Some(time);
        Ok(())
    }

    async fn last_backup_finish_time(&self) -> Result<Option<i64>> {
        Ok(self.times.lock().unwrap().1)
    }

    async fn store_last_backup_finish_time(&self, time: i64) -> Result<()> {
        self.times.lock().unwrap().1 = Some(time);
        Ok(())
    }

    async fn remove_backup_times(&self) -> Result<()> {
        *self.times.lock().unwrap() = (None, None);
        Ok(())
    }
}
