//! Translation between the engine's JSON model and MongoDB's BSON model.
//!
//! [`QueryNode::compile_filter`] renders a query as a native filter document
//! whose server-side evaluation agrees with [`QueryNode::evaluate`] for
//! scalar and array fields, including dotted paths that cross arrays of
//! embedded documents. Known differences on the server side:
//!
//! - a missing field is a non-match for `$eq` and a match for `$ne`, where
//!   `evaluate` reports an error;
//! - `$eq: null` on a dotted path through an array also matches when some
//!   element lacks the field;
//! - an ObjectId `_id` never orders against a string operand that is not
//!   lowercase ObjectId hex;
//! - embedded documents compare field-order sensitively.

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document, doc};
use serde_json::Value;

use crate::entity::{Entity, ID_FIELD};
use crate::error::{StoreError, StoreResult};
use crate::query::{BinaryOp, CompareOp, Condition, QueryError, QueryNode};

impl QueryNode {
    /// The equivalent MongoDB filter document.
    pub fn compile_filter(&self) -> StoreResult<Document> {
        match self {
            Self::Condition(c) => c.compile_filter(),
            Self::BinaryOp(b) => b.compile_filter(),
        }
    }
}

impl Condition {
    /// `{ field: { $op: value } }`
    pub fn compile_filter(&self) -> StoreResult<Document> {
        if self.field.is_empty() {
            return Err(QueryError::EmptyField.into());
        }
        if self.field == ID_FIELD {
            if let Some(filter) = id_condition(self.op, &self.value) {
                return Ok(filter);
            }
        }
        let clause = doc! { self.op.mongo_operator(): json_to_bson(&self.value)? };
        Ok(doc! { self.field.as_str(): clause })
    }
}

impl BinaryOp {
    /// `{ $and|$or: [left, right] }`
    pub fn compile_filter(&self) -> StoreResult<Document> {
        let left = self.left.compile_filter()?;
        let right = self.right.compile_filter()?;
        Ok(doc! { self.op.mongo_operator(): [left, right] })
    }
}

/// Compile an optional query; `None` is the match-all filter.
pub fn compile_optional(query: Option<&QueryNode>) -> StoreResult<Document> {
    match query {
        Some(q) => q.compile_filter(),
        None => Ok(Document::new()),
    }
}

/// Filter addressing one document by id.
pub fn id_filter(id: &str) -> Document {
    match ObjectId::parse_str(id) {
        Ok(oid) => doc! { ID_FIELD: { "$in": [oid, id] } },
        Err(_) => doc! { ID_FIELD: id },
    }
}

/// An `_id` operand in canonical ObjectId hex may address either an
/// ObjectId assigned by the server or a caller-chosen string id, so both
/// forms are tested. Hex compares in the same order as the ObjectId bytes.
fn id_condition(op: CompareOp, value: &Value) -> Option<Document> {
    let text = value.as_str()?;
    let oid = ObjectId::parse_str(text).ok()?;
    // Stored ObjectIds read back as lowercase hex; other spellings are
    // plain strings.
    if oid.to_hex() != text {
        return None;
    }
    Some(match op {
        CompareOp::Eq => doc! { ID_FIELD: { "$in": [oid, text] } },
        CompareOp::Ne => doc! { ID_FIELD: { "$nin": [oid, text] } },
        _ => {
            let operator = op.mongo_operator();
            doc! {
                "$or": [
                    { ID_FIELD: { operator: oid } },
                    { ID_FIELD: { operator: text } },
                ]
            }
        }
    })
}

fn json_to_bson(value: &Value) -> StoreResult<Bson> {
    mongodb::bson::to_bson(value).map_err(|e| StoreError::Bson(e.to_string()))
}

/// Encode an entity for insertion or `$set`.
pub fn entity_to_document(entity: &Entity) -> StoreResult<Document> {
    mongodb::bson::to_document(entity).map_err(|e| StoreError::Bson(e.to_string()))
}

/// Decode a stored document. An ObjectId `_id` becomes its hex string; other
/// values use relaxed extended JSON.
pub fn document_to_entity(doc: Document) -> Entity {
    doc.into_iter()
        .map(|(key, value)| {
            let value = if key == ID_FIELD {
                id_to_json(value)
            } else {
                value.into_relaxed_extjson()
            };
            (key, value)
        })
        .collect()
}

/// The string form of a stored `_id`.
pub fn id_to_string(id: Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s,
        other => other.into_relaxed_extjson().to_string(),
    }
}

fn id_to_json(id: Bson) -> Value {
    match id {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        other => other.into_relaxed_extjson(),
    }
}
