use crate::domain::entities::change::ObjectChange;
use crate::domain::value_objects::{blob_field_for, is_empty_blob_value};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire payload stored as `change-sets/{timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSetPayload {
    pub version: u32,
    pub changes: Vec<ObjectChange>,
}

/// Wire payload stored as `images/{timestamp}`, holding only the
/// blob-bearing fields of the sibling change-set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePayload {
    pub version: u32,
    pub images: Vec<ImageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEntry {
    pub collection: String,
    #[serde(rename = "objectPk")]
    pub object_pk: Value,
    #[serde(rename = "type")]
    pub field: String,
    pub data: Value,
}

/// Split a hydrated batch into the change-set payload and, when blob storage
/// is enabled and at least one non-empty blob exists, the image payload.
///
/// Blob fields are always stripped from the change-set copy; images restore
/// through their own collection after the structural replay.
pub fn build_backup_payloads(
    changes: &[ObjectChange],
    version: u32,
    store_blobs: bool,
) -> (ChangeSetPayload, Option<ImagePayload>) {
    let mut stripped = Vec::with_capacity(changes.len());
    let mut images = Vec::new();

    for change in changes {
        let mut change = change.clone();
        if let Some(field) = blob_field_for(&change.collection) {
            if let Some(map) = change.object.as_mut().and_then(Value::as_object_mut) {
                if let Some(data) = map.remove(field) {
                    if store_blobs && !data.is_null() && !is_empty_blob_value(&data) {
                        images.push(ImageEntry {
                            collection: change.collection.clone(),
                            object_pk: change.object_pk.clone(),
                            field: field.to_string(),
                            data,
                        });
                    }
                }
            }
        }
        stripped.push(change);
    }

    let change_set = ChangeSetPayload {
        version,
        changes: stripped,
    };
    let images = if store_blobs && !images.is_empty() {
        Some(ImagePayload { version, images })
    } else {
        None
    };
    (change_set, images)
}
