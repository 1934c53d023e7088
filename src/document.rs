//! Documents as they travel between the store and handlers.
//!
//! The store hands out untyped [`Document`]s. Handlers see [`Doc<T>`], which pairs the
//! system fields with a deserialized table struct, and address them through typed
//! [`DocId<T>`] values that cannot be mixed up across tables.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::schema::Table;

pub const ID_FIELD: &str = "_id";
pub const CREATION_TIME_FIELD: &str = "_creationTime";

/// Id of a document in the table described by `T`.
pub struct DocId<T> {
    raw: String,
    table: PhantomData<fn() -> T>,
}

impl<T> DocId<T> {
    /// Wraps a raw id without checking it. Use `normalize_id` for untrusted input.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self { raw: raw.into(), table: PhantomData }
    }
    pub fn as_str(&self) -> &str {
        &self.raw
    }
    pub fn into_string(self) -> String {
        self.raw
    }
}

impl<T> Clone for DocId<T> {
    fn clone(&self) -> Self {
        Self::from_raw(self.raw.clone())
    }
}

impl<T> PartialEq for DocId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl<T> Eq for DocId<T> {}

impl<T> Hash for DocId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for DocId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocId({})", self.raw)
    }
}

impl<T> fmt::Display for DocId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl<T> Serialize for DocId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de, T> Deserialize<'de> for DocId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from_raw)
    }
}

impl<T> From<DocId<T>> for Value {
    fn from(id: DocId<T>) -> Self {
        Value::String(id.raw)
    }
}

/// A document as the store returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_creationTime", with = "chrono::serde::ts_milliseconds")]
    pub creation_time: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Value of a field by name, including the `_id` and `_creationTime` system fields.
    /// Missing fields read as null.
    pub fn field(&self, name: &str) -> Value {
        match name {
            ID_FIELD => Value::String(self.id.clone()),
            CREATION_TIME_FIELD => Value::from(self.creation_time.timestamp_millis()),
            other => self.fields.get(other).cloned().unwrap_or(Value::Null),
        }
    }
}

/// A typed document: system fields plus the table struct.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Doc<T> {
    #[serde(rename = "_id")]
    pub id: DocId<T>,
    #[serde(rename = "_creationTime", with = "chrono::serde::ts_milliseconds")]
    pub creation_time: DateTime<Utc>,
    #[serde(flatten)]
    pub value: T,
}

impl<T: Table> Doc<T> {
    pub fn decode(document: Document) -> Result<Self, StoreError> {
        let Document { id, creation_time, fields } = document;
        let value = serde_json::from_value(Value::Object(fields))
            .map_err(|e| StoreError::Malformed { id: id.clone(), message: e.to_string() })?;
        Ok(Self { id: DocId::from_raw(id), creation_time, value })
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T> Deref for Doc<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

/// Serializes a value into the field map of a document. System fields are stripped.
pub fn encode_fields<V: Serialize + ?Sized>(value: &V, table: &str) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(mut fields)) => {
            fields.remove(ID_FIELD);
            fields.remove(CREATION_TIME_FIELD);
            Ok(fields)
        }
        Ok(other) => Err(StoreError::Schema {
            table: table.to_owned(),
            message: format!("documents must serialize to objects, got {other}"),
        }),
        Err(e) => Err(StoreError::Schema { table: table.to_owned(), message: e.to_string() }),
    }
}
