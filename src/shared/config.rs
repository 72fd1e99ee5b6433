use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for the backup/restore engine.
///
/// Retry and scheduling policy deliberately live with the caller; nothing in
/// here re-runs a failed upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Number of change log entries uploaded per batch.
    pub batch_size: u32,
    /// Write screenshot/favicon blobs to a sibling `images/` object.
    pub store_blobs: bool,
    /// Persist the last backup time after a successful run.
    pub store_backup_time: bool,
    /// Delay between `run()` returning and the first progress event, so
    /// callers can subscribe before anything fires.
    pub start_delay_ms: u64,
    /// Settle delay awaited by `cancel()` after the run winds down.
    pub cancel_settle_delay_ms: u64,
    /// Flat safety boost applied to size estimates, in percent.
    pub size_boost_percent: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            store_blobs: true,
            store_backup_time: true,
            start_delay_ms: 200,
            cancel_settle_delay_ms: 1000,
            size_boost_percent: 10,
        }
    }
}

impl BackupConfig {
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn cancel_settle_delay(&self) -> Duration {
        Duration::from_millis(self.cancel_settle_delay_ms)
    }
}
