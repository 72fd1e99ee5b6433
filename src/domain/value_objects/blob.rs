use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

/// Collections carrying a binary field, and the name of that field.
pub const BLOB_FIELDS: &[(&str, &str)] = &[("pages", "screenshot"), ("favIcons", "favIcon")];

pub fn blob_field_for(collection: &str) -> Option<&'static str> {
    BLOB_FIELDS
        .iter()
        .find(|(name, _)| *name == collection)
        .map(|(_, field)| *field)
}

/// Decoded binary field value. The canonical stored representation is a
/// data URL; bare base64 payloads from older backups are accepted on parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobData {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl BlobData {
    pub fn parse(raw: &str) -> Result<Self, String> {
        if let Some(rest) = raw.strip_prefix("data:") {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| "malformed data URL".to_string())?;
            let mime_type = header.strip_suffix(";base64").unwrap_or(header);
            let bytes = STANDARD
                .decode(payload)
                .map_err(|err| format!("invalid base64 payload: {err}"))?;
            return Ok(Self {
                mime_type: mime_type.to_string(),
                bytes,
            });
        }

        let bytes = STANDARD
            .decode(raw)
            .map_err(|err| format!("invalid base64 payload: {err}"))?;
        Ok(Self {
            // Bare payloads predate the data URL format and were always PNG.
            mime_type: "image/png".to_string(),
            bytes,
        })
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            STANDARD.encode(&self.bytes)
        )
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Size of the payload once base64-encoded for upload.
    pub fn base64_len(&self) -> u64 {
        (self.bytes.len() as u64).div_ceil(3) * 4
    }
}

/// Try to interpret a stored field value as a blob.
pub fn decode_blob_value(value: &Value) -> Option<BlobData> {
    value.as_str().and_then(|raw| BlobData::parse(raw).ok())
}

/// An "empty" blob value is present but carries no payload: an object with
/// no keys or an empty string. Null counts as absent, not empty.
pub fn is_empty_blob_value(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::String(raw) => raw.is_empty(),
        Value::Null => false,
        _ => true,
    }
}
