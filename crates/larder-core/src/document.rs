//! Documents and their identity envelope.
//!
//! Every stored record carries an `id` (unique within its collection) and a
//! `lastUpdated` stamp written by the store. Everything else is the caller's
//! payload and is opaque to the engine.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Untyped document payload: a JSON object.
pub type Fields = Map<String, Value>;

/// Field name of the document id on the wire and in storage.
pub const ID_FIELD: &str = "id";

/// Field name of the last-write stamp on the wire and in storage.
pub const LAST_UPDATED_FIELD: &str = "lastUpdated";

/// Identifier of a document within a collection.
///
/// Ids are compared as strings. Numeric ids found in stored or remote data
/// are accepted and converted to their decimal text.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// View the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the id and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&DocumentId> for DocumentId {
    fn from(id: &DocumentId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(id) => Ok(Self(id)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(D::Error::custom(format!(
                "document id must be a string or number, got {other}"
            ))),
        }
    }
}

/// A stored record: the identity envelope plus a payload of type `T`.
///
/// The payload is flattened next to `id` and `lastUpdated` when serialized,
/// so a `Document<Fields>` round-trips as the plain JSON object callers wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<T = Fields> {
    /// Unique id within the collection.
    pub id: DocumentId,
    /// Stamp of the most recent successful write.
    #[serde(rename = "lastUpdated", default)]
    pub last_updated: DateTime<Utc>,
    /// Caller-defined payload.
    #[serde(flatten)]
    pub data: T,
}

impl<T> Document<T> {
    /// Assemble a document from its parts.
    pub fn new(id: impl Into<DocumentId>, last_updated: DateTime<Utc>, data: T) -> Self {
        Self {
            id: id.into(),
            last_updated,
            data,
        }
    }
}

impl Document<Fields> {
    /// Build a document from raw fields, dropping any envelope keys the
    /// caller left in the payload so they cannot shadow the real envelope.
    pub fn from_fields(id: impl Into<DocumentId>, last_updated: DateTime<Utc>, fields: Fields) -> Self {
        Self::new(id, last_updated, strip_envelope(fields))
    }

    /// Shallow merge: fields in `patch` overwrite, absent fields are kept.
    pub fn merge(&mut self, patch: Fields, stamp: DateTime<Utc>) {
        for (key, value) in strip_envelope(patch) {
            self.data.insert(key, value);
        }
        self.last_updated = stamp;
    }

    /// Value of a field for ordering purposes.
    ///
    /// `id` and `lastUpdated` resolve to the envelope; a missing field
    /// resolves to `null`. The stamp is rendered with a fixed nanosecond
    /// width so that string order is time order.
    pub fn field(&self, name: &str) -> Value {
        match name {
            ID_FIELD => Value::String(self.id.as_str().to_string()),
            LAST_UPDATED_FIELD => Value::String(stamp_text(&self.last_updated)),
            _ => self.data.get(name).cloned().unwrap_or(Value::Null),
        }
    }

    /// Convert the payload into a typed value.
    ///
    /// `T` is decoded from the payload with the envelope keys put back, so
    /// structs that declare their own `id` or `lastUpdated` read them from
    /// the envelope.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<Document<T>, serde_json::Error> {
        let mut object = self.data;
        object.insert(ID_FIELD.to_string(), Value::String(self.id.as_str().to_string()));
        object.insert(
            LAST_UPDATED_FIELD.to_string(),
            Value::String(stamp_text(&self.last_updated)),
        );
        let data = serde_json::from_value(Value::Object(object))?;
        Ok(Document {
            id: self.id,
            last_updated: self.last_updated,
            data,
        })
    }

    /// Serialize the whole document, envelope included, as one JSON object.
    pub fn to_value(&self) -> Value {
        let mut object = self.data.clone();
        object.insert(ID_FIELD.to_string(), Value::String(self.id.as_str().to_string()));
        object.insert(
            LAST_UPDATED_FIELD.to_string(),
            serde_json::to_value(self.last_updated).unwrap_or(Value::Null),
        );
        Value::Object(object)
    }
}

/// Serialize a typed payload into raw fields.
///
/// Fails if `value` does not serialize to a JSON object.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(strip_envelope(fields)),
        other => Err(serde_json::Error::custom(format!(
            "document payload must serialize to an object, got {other}"
        ))),
    }
}

fn stamp_text(stamp: &DateTime<Utc>) -> String {
    stamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn strip_envelope(mut fields: Fields) -> Fields {
    fields.remove(ID_FIELD);
    fields.remove(LAST_UPDATED_FIELD);
    fields
}
