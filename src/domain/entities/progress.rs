use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupState {
    Preparing,
    Synching,
    Paused,
    Cancelled,
}

/// Live progress of one backup run. Subscribers always receive an owned
/// snapshot, never a handle into the running procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupProgressInfo {
    pub state: BackupState,
    pub total_changes: u64,
    pub processed_changes: u64,
}

impl Default for BackupProgressInfo {
    fn default() -> Self {
        Self {
            state: BackupState::Preparing,
            total_changes: 0,
            processed_changes: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreStatus {
    Preparing,
    Synching,
}

/// Progress of one restore run; mirrors [`BackupProgressInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreInfo {
    pub status: RestoreStatus,
    pub total_changes: u64,
    pub processed_changes: u64,
}

impl Default for RestoreInfo {
    fn default() -> Self {
        Self {
            status: RestoreStatus::Preparing,
            total_changes: 0,
            processed_changes: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum BackupEvent {
    Info(BackupProgressInfo),
    Success,
    Fail(String),
}

#[derive(Debug, Clone)]
pub enum RestoreEvent {
    Info(RestoreInfo),
    Success,
    Cancelled,
    Fail(String),
}
