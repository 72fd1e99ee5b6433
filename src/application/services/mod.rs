pub mod backup_procedure;
pub mod download_queue;
pub mod restore_procedure;
pub mod size_estimator;

pub use backup_procedure::BackupProcedure;
pub use download_queue::DownloadQueue;
pub use restore_procedure::{RestoreOutcome, RestoreProcedure};
pub use size_estimator::{estimate_backup_size, BackupSizeEstimate};
