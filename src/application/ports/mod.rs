pub mod backup_backend;
pub mod change_log;
pub mod error_reporter;
pub mod last_backup;
pub mod local_store;

pub use backup_backend::{pk_to_string, BackupBackend, BackupOptions};
pub use change_log::{ChangeLogStore, ChangeStream};
pub use error_reporter::{ErrorReporter, TracingErrorReporter};
pub use last_backup::LastBackupStore;
pub use local_store::LocalStore;
