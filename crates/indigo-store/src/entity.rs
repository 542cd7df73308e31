//! Schemaless documents.
//!
//! An [`Entity`] is a JSON object. The store owns one field, [`ID_FIELD`]:
//! it is assigned on create, present on every entity a read returns, and
//! never changes afterwards.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// A schemaless document: field name to JSON value.
pub type Entity = Map<String, Value>;

/// The reserved identifier field.
pub const ID_FIELD: &str = "_id";

/// The entity's `_id` when it is a string.
pub fn entity_id(entity: &Entity) -> Option<&str> {
    entity.get(ID_FIELD).and_then(Value::as_str)
}

/// Generate a fresh, time-ordered document id.
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

/// Take the caller-supplied `_id` out of a new entity, if there is one.
///
/// Returns `Ok(None)` when the entity has no `_id`; a non-string or empty
/// `_id` is rejected.
pub fn take_requested_id(entity: &mut Entity) -> StoreResult<Option<String>> {
    match entity.remove(ID_FIELD) {
        None => Ok(None),
        Some(Value::String(id)) if !id.is_empty() => Ok(Some(id)),
        Some(other) => Err(StoreError::InvalidArgument(format!(
            "`{ID_FIELD}` must be a non-empty string, got {other}"
        ))),
    }
}

/// Validate an update payload against the id it targets.
///
/// An `_id` equal to `id` is dropped; any other `_id` is an error because ids
/// are immutable. An empty patch is rejected as well.
pub fn prepare_patch(id: Option<&str>, mut patch: Entity) -> StoreResult<Entity> {
    if let Some(requested) = patch.remove(ID_FIELD) {
        let same = match (id, &requested) {
            (Some(id), Value::String(requested)) => requested == id,
            _ => false,
        };
        if !same {
            return Err(StoreError::InvalidArgument(format!(
                "`{ID_FIELD}` is immutable and cannot be patched to {requested}"
            )));
        }
    }
    if patch.is_empty() {
        return Err(StoreError::InvalidArgument("update patch is empty".into()));
    }
    Ok(patch)
}

/// Overwrite `target` field by field with `patch`. Fields not named in the
/// patch are kept; nested objects are replaced whole.
pub fn merge_patch(target: &mut Entity, patch: Entity) {
    for (key, value) in patch {
        if key == ID_FIELD {
            continue;
        }
        target.insert(key, value);
    }
}
