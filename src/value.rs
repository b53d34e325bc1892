//! Document values
//!
//! Callers hand documents in either as a keyed structure or as its JSON
//! encoding. Both are normalized to `Fields` before any store operation.

use crate::error::ApiError;
use crate::types::{DocId, ID_FIELD};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Field name to value mapping of a document
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A document value as supplied by a caller
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Structured(Fields),
    Encoded(String),
}

impl Value {
    /// Normalize to a keyed structure. Encoded values must hold a JSON object.
    pub fn into_fields(self) -> Result<Fields, ApiError> {
        match self {
            Value::Structured(fields) => Ok(fields),
            Value::Encoded(text) => match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(serde_json::Value::Object(fields)) => Ok(fields),
                Ok(other) => Err(ApiError::InvalidValue(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                ))),
                Err(e) => Err(ApiError::InvalidValue(format!(
                    "failed to parse document: {}",
                    e
                ))),
            },
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Value::Structured(fields)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(fields) => Value::Structured(fields),
            other => Value::Encoded(other.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Encoded(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Encoded(text)
    }
}

/// A stored document: its id plus its fields
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocId,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: DocId, fields: Fields) -> Self {
        Self { id, fields }
    }

    /// JSON form with the id under `_id`
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = Fields::new();
        map.insert(ID_FIELD.to_string(), serde_json::Value::String(self.id.clone()));
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.clone());
        }
        serde_json::Value::Object(map)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry(ID_FIELD, &self.id)?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
