use crate::domain::entities::ChangeLogEntry;
use crate::domain::value_objects::ChangeOperation;
use crate::shared::error::{AppError, Result};
use sqlx::FromRow;

/// Row shape of the `backup_changes` table.
#[derive(Debug, Clone, FromRow)]
pub struct BackupChangeRow {
    pub timestamp: i64,
    pub collection: String,
    pub object_pk: String,
    pub operation: String,
}

impl BackupChangeRow {
    pub fn into_entry(self) -> Result<ChangeLogEntry> {
        let operation: ChangeOperation = self
            .operation
            .parse()
            .map_err(AppError::Database)?;
        Ok(ChangeLogEntry {
            timestamp: self.timestamp,
            collection: self.collection,
            object_pk: serde_json::from_str(&self.object_pk)?,
            operation,
        })
    }
}
