//! Documents and identifiers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the field holding a document's identifier.
pub const ID_FIELD: &str = "_id";

/// A JSON object persisted as one file.
///
/// The identifier lives in the `_id` field. On read the store always
/// overwrites it with the identifier derived from the file name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from a JSON value.
    ///
    /// Only objects are accepted.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::invalid_document(format!(
                "expected a JSON object, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// The document identifier, if it carries a usable one.
    ///
    /// A missing, null, non-string or empty `_id` counts as no identifier.
    pub fn id(&self) -> Option<&str> {
        match self.fields.get(ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => Some(id),
            _ => None,
        }
    }

    /// Set the identifier, replacing any existing one.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.fields
            .insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    /// Return the document with its identifier set.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.set_id(id);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl TryFrom<Value> for Document {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Validate that an identifier can be used as a file base name.
///
/// Rejects empty identifiers, path separators, `..` and a leading dot.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::invalid_id(id, "must not be empty"));
    }

    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(Error::invalid_id(
            id,
            "must not contain .. or path separators",
        ));
    }

    if id.starts_with('.') {
        return Err(Error::invalid_id(id, "must not start with a dot"));
    }

    if id.contains('\0') {
        return Err(Error::invalid_id(id, "must not contain NUL"));
    }

    Ok(())
}
