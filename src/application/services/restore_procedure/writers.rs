use crate::domain::entities::{ObjectChange, PkIndex, SchemaRegistry};
use crate::domain::value_objects::{blob_field_for, is_empty_blob_value, BlobData, ChangeOperation};
use crate::shared::error::{AppError, Result};
use serde_json::{Map, Value};

/// Collection/field pairs whose values were serialized as timestamps and
/// come back from old backups as strings or floats.
const TIMESTAMP_FIELDS: &[(&str, &str)] = &[
    ("annotations", "createdWhen"),
    ("annotations", "lastEdited"),
    ("customLists", "createdAt"),
];

/// Drop or neutralize changes that cannot be written as-is.
///
/// Pages can exist without a screenshot, so an empty screenshot value is
/// stripped and the rest of the object kept. A favicon row is nothing but
/// its icon, so an empty icon turns the whole change into a no-op.
pub fn filter_bad_change(mut change: ObjectChange) -> ObjectChange {
    let Some(field) = blob_field_for(&change.collection) else {
        return change;
    };
    let Some(map) = change.object.as_mut().and_then(Value::as_object_mut) else {
        return change;
    };
    let Some(value) = map.get(field) else {
        return change;
    };
    if !is_empty_blob_value(value) {
        return change;
    }

    match change.collection.as_str() {
        "pages" => {
            map.remove(field);
        }
        _ => {
            change.operation = ChangeOperation::Skip;
        }
    }
    change
}

/// Re-inflate fields that lost their type on the wire: blob strings back to
/// canonical data URLs, timestamp strings/floats back to epoch milliseconds.
pub fn deserialize_change_fields(change: &mut ObjectChange) {
    let collection = change.collection.clone();
    let Some(map) = change.object.as_mut().and_then(Value::as_object_mut) else {
        return;
    };

    if collection == "favIcons" {
        if let Some(blob) = map.get("favIcon").and_then(Value::as_str).and_then(|raw| {
            BlobData::parse(raw).ok()
        }) {
            map.insert("favIcon".to_string(), Value::String(blob.to_data_url()));
        }
    }

    for (target, field) in TIMESTAMP_FIELDS {
        if *target != collection {
            continue;
        }
        if let Some(value) = map.get(*field) {
            if let Some(millis) = to_epoch_millis(value) {
                map.insert((*field).to_string(), Value::from(millis));
            }
        }
    }
}

/// Forward-compat shim for objects written by older schema versions.
/// Idempotent: applying it to an already-migrated object changes nothing.
pub fn migrate_object(change: &mut ObjectChange) {
    if change.collection != "annotations" {
        return;
    }
    let Some(map) = change.object.as_mut().and_then(Value::as_object_mut) else {
        return;
    };
    let needs_backfill = map
        .get("lastEdited")
        .map(Value::is_null)
        .unwrap_or(true);
    if needs_backfill {
        if let Some(created) = map.get("createdWhen").cloned() {
            map.insert("lastEdited".to_string(), created);
        }
    }
}

/// Build the where-clause for a change's primary key: composite indexes zip
/// field names against the identifier's elements, single indexes map the
/// field straight to the identifier.
pub fn change_where(
    registry: &SchemaRegistry,
    collection: &str,
    object_pk: &Value,
) -> Result<Map<String, Value>> {
    let def = registry
        .get(collection)
        .ok_or_else(|| AppError::InvalidInput(format!("unknown collection: {collection}")))?;

    let mut filter = Map::new();
    match &def.pk {
        PkIndex::Single(field) => {
            filter.insert(field.clone(), object_pk.clone());
        }
        PkIndex::Composite(fields) => {
            let parts = object_pk.as_array().ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "composite key for {collection} requires an array identifier"
                ))
            })?;
            for (field, part) in fields.iter().zip(parts) {
                filter.insert(field.clone(), part.clone());
            }
        }
    }
    Ok(filter)
}

fn to_epoch_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as i64),
        Value::String(raw) => {
            if let Ok(parsed) = raw.parse::<i64>() {
                return Some(parsed);
            }
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.timestamp_millis())
        }
        _ => None,
    }
}
