use crate::domain::value_objects::ChangeOperation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One pending local mutation in the append-only change log.
///
/// The entry is a dirty marker, not a diff: the object's current state is
/// fetched fresh at upload time, so duplicate entries for the same primary
/// key are harmless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Registration time in epoch milliseconds; primary key of the log.
    pub timestamp: i64,
    pub collection: String,
    #[serde(rename = "objectPk")]
    pub object_pk: Value,
    pub operation: ChangeOperation,
}

/// A change hydrated for upload. `object` holds the live snapshot for
/// creates and updates; deletes are structural and carry no payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectChange {
    pub collection: String,
    #[serde(rename = "objectPk")]
    pub object_pk: Value,
    pub operation: ChangeOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    pub timestamp: i64,
}

impl From<ChangeLogEntry> for ObjectChange {
    fn from(entry: ChangeLogEntry) -> Self {
        Self {
            collection: entry.collection,
            object_pk: entry.object_pk,
            operation: entry.operation,
            object: None,
            timestamp: entry.timestamp,
        }
    }
}

/// Unit of upload: the changes of one log page plus the log primary keys
/// to forget once the batch is durably stored remotely.
#[derive(Debug, Clone)]
pub struct ObjectChangeBatch {
    pub changes: Vec<ObjectChange>,
    pub entry_pks: Vec<i64>,
}
