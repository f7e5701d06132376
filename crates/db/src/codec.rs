//! Conversion between request/response JSON and stored BSON.
//!
//! Incoming numbers are stored the way the Node.js driver writes them:
//! integral values within the 32-bit range become `int32`, everything else
//! becomes `double`. Outgoing ObjectIds are rendered as plain hex strings.

use mongodb::bson::{oid::ObjectId, Bson, Document};
use serde_json::{Map, Number, Value};

use crate::error::{StoreError, StoreResult};

/// Convert a JSON object into a BSON document.
pub fn json_to_document(value: Value) -> StoreResult<Document> {
    match json_to_bson(value)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(StoreError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            type_label(&other)
        ))),
    }
}

/// Convert a JSON array of objects into BSON documents.
pub fn json_to_documents(value: Value) -> StoreResult<Vec<Document>> {
    let Value::Array(items) = value else {
        return Err(StoreError::InvalidDocument(
            "expected a JSON array of objects".to_string(),
        ));
    };

    items.into_iter().map(json_to_document).collect()
}

/// Convert an arbitrary JSON value into BSON.
pub fn json_to_bson(value: Value) -> StoreResult<Bson> {
    Ok(match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => number_to_bson(&n)?,
        Value::String(s) => Bson::String(s),
        Value::Array(items) => Bson::Array(
            items
                .into_iter()
                .map(json_to_bson)
                .collect::<StoreResult<Vec<_>>>()?,
        ),
        Value::Object(map) => object_to_bson(map)?,
    })
}

fn number_to_bson(n: &Number) -> StoreResult<Bson> {
    let value = match n.as_i64() {
        Some(i) => return Ok(i32::try_from(i).map_or(Bson::Double(i as f64), Bson::Int32)),
        None => n
            .as_f64()
            .ok_or_else(|| StoreError::InvalidDocument(format!("number {n} is out of range")))?,
    };

    let integral = value.fract() == 0.0
        && value >= f64::from(i32::MIN)
        && value <= f64::from(i32::MAX);
    Ok(if integral {
        Bson::Int32(value as i32)
    } else {
        Bson::Double(value)
    })
}

fn object_to_bson(map: Map<String, Value>) -> StoreResult<Bson> {
    if map.len() == 1 {
        if let Some(Value::String(hex)) = map.get("$oid") {
            let oid = ObjectId::parse_str(hex)
                .map_err(|e| StoreError::InvalidDocument(format!("invalid $oid `{hex}`: {e}")))?;
            return Ok(Bson::ObjectId(oid));
        }
    }

    let mut doc = Document::new();
    for (key, value) in map {
        doc.insert(key, json_to_bson(value)?);
    }
    Ok(Bson::Document(doc))
}

/// Render a stored document as response JSON.
pub fn document_to_json(doc: Document) -> Value {
    let map = doc
        .into_iter()
        .map(|(key, value)| (key, bson_to_json(value)))
        .collect();
    Value::Object(map)
}

/// Render a BSON value as response JSON.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        Bson::String(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Document(doc) => document_to_json(doc),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Bson::DateTime(dt).into_relaxed_extjson(),
        },
        other => other.into_relaxed_extjson(),
    }
}

pub(crate) fn type_label(value: &Bson) -> &'static str {
    match value {
        Bson::Null | Bson::Undefined => "null",
        Bson::Boolean(_) => "bool",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Double(_) => "double",
        Bson::Decimal128(_) => "decimal",
        Bson::String(_) => "string",
        Bson::ObjectId(_) => "objectId",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::DateTime(_) => "date",
        Bson::Timestamp(_) => "timestamp",
        Bson::RegularExpression(_) => "regex",
        Bson::Binary(_) => "binData",
        _ => "unknown",
    }
}
