pub mod last_backup;
pub mod local_store;

pub use last_backup::MockLastBackup;
pub use local_store::MockLocalStore;
