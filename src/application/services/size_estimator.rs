use crate::application::ports::LocalStore;
use crate::domain::value_objects::{blob_field_for, decode_blob_value};
use crate::shared::error::Result;
use serde_json::Value;

/// Estimated upload size of a full backup, split into structured data and
/// blob bytes. Both figures are boosted by a fixed percentage to absorb
/// wire framing overhead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupSizeEstimate {
    pub bytes: u64,
    pub blob_bytes: u64,
}

/// Walk every backed-up collection and sum serialized object sizes. Blob
/// fields are measured at their base64-encoded length, since that is how
/// they travel, and excluded from the structured total.
pub async fn estimate_backup_size(
    local: &dyn LocalStore,
    boost_percent: u32,
) -> Result<BackupSizeEstimate> {
    let mut estimate = BackupSizeEstimate::default();
    let collections: Vec<String> = local
        .registry()
        .backed_up()
        .map(|def| def.name.clone())
        .collect();

    for collection in collections {
        let blob_field = blob_field_for(&collection);
        for object in local.stream_objects(&collection).await? {
            let Value::Object(mut map) = object else {
                estimate.bytes += serde_json::to_vec(&object)?.len() as u64;
                continue;
            };
            if let Some(field) = blob_field {
                if let Some(value) = map.remove(field) {
                    if let Some(blob) = decode_blob_value(&value) {
                        estimate.blob_bytes += blob.base64_len();
                    }
                }
            }
            estimate.bytes += serde_json::to_vec(&Value::Object(map))?.len() as u64;
        }
    }

    estimate.bytes = boost(estimate.bytes, boost_percent);
    estimate.blob_bytes = boost(estimate.blob_bytes, boost_percent);
    Ok(estimate)
}

fn boost(bytes: u64, percent: u32) -> u64 {
    bytes + bytes * u64::from(percent) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_adds_percentage() {
        assert_eq!(boost(100, 10), 110);
        assert_eq!(boost(0, 10), 0);
        assert_eq!(boost(1000, 0), 1000);
    }
}
