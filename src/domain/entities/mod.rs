pub mod change;
pub mod progress;
pub mod schema;
pub mod wire;

pub use change::{ChangeLogEntry, ObjectChange, ObjectChangeBatch};
pub use progress::{
    BackupEvent, BackupProgressInfo, BackupState, RestoreEvent, RestoreInfo, RestoreStatus,
};
pub use schema::{CollectionDefinition, PkIndex, SchemaRegistry};
pub use wire::{build_backup_payloads, ChangeSetPayload, ImageEntry, ImagePayload};
