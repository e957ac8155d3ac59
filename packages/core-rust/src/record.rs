//! Typed documents stored under a key.
//!
//! A [`Record`] serializes to a flat JSON object whose first member is the
//! reserved `_type` discriminator, followed by `_id` and the named fields:
//!
//! ```json
//! {"_type":"note","_id":"r1","title":"a"}
//! ```
//!
//! Keeping the discriminator first lets storage backends pre-select records
//! of one type with a prefix match on the raw document (see
//! [`Record::type_prefix`]) before paying for a full decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Reserved document member holding the record type.
pub const TYPE_FIELD: &str = "_type";

/// Reserved document member holding the record key.
pub const KEY_FIELD: &str = "_id";

static NULL: Value = Value::Null;

/// Validation failures for records about to be written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record key must not be empty")]
    EmptyKey,
    #[error("record type must not be empty")]
    EmptyType,
    #[error("field name {0:?} is reserved")]
    ReservedField(String),
    #[error("field {0:?} holds a non-finite float")]
    NonFiniteFloat(String),
}

/// A typed document identified by `key` within one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Type discriminator. Serialized first.
    #[serde(rename = "_type")]
    pub record_type: String,
    /// Unique key within the owning database.
    #[serde(rename = "_id")]
    pub key: String,
    /// Named field values.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates a record with no fields.
    #[must_use]
    pub fn new(key: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Looks up a field by path.
    ///
    /// Unknown paths resolve to [`Value::Null`]. The reserved paths `_id` and
    /// `_type` are not stored as fields, so they are answered through
    /// [`Record::get_owned`] instead.
    #[must_use]
    pub fn get(&self, path: &str) -> &Value {
        self.fields.get(path).unwrap_or(&NULL)
    }

    /// Looks up a field by path, resolving the reserved `_id` and `_type`.
    #[must_use]
    pub fn get_owned(&self, path: &str) -> Value {
        match path {
            KEY_FIELD => Value::String(self.key.clone()),
            TYPE_FIELD => Value::String(self.record_type.clone()),
            _ => self.get(path).clone(),
        }
    }

    /// Checks the record can be written and read back unchanged.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] for an empty key or type, a field named
    /// like a reserved member, or a non-finite float (JSON cannot hold it).
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.key.is_empty() {
            return Err(RecordError::EmptyKey);
        }
        if self.record_type.is_empty() {
            return Err(RecordError::EmptyType);
        }
        for (name, value) in &self.fields {
            if name == KEY_FIELD || name == TYPE_FIELD {
                return Err(RecordError::ReservedField(name.clone()));
            }
            if let Value::Float(f) = value {
                if !f.is_finite() {
                    return Err(RecordError::NonFiniteFloat(name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Raw-document prefix shared by every serialized record of `record_type`.
    ///
    /// The type is JSON-escaped exactly as the serializer would write it.
    #[must_use]
    pub fn type_prefix(record_type: &str) -> String {
        let escaped = serde_json::Value::String(record_type.to_string()).to_string();
        format!("{{\"{TYPE_FIELD}\":{escaped}")
    }
}
