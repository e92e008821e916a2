//! # Unstructured Typed Objects
//!
//! Envelope for specifications whose type was not resolved when they were
//! decoded. The raw bytes are kept verbatim so the object can be
//! re-evaluated once the registry knows its type.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::encoding::Encoding;
use super::object::VersionedTypedObject;
use crate::errors::{ContextError, ContextResult};

/// Name of the type attribute in every serialized specification
pub const TYPE_FIELD: &str = "type";

/// A decoded specification held as raw fields.
pub struct UnstructuredTypedObject {
    object_type: String,
    fields: Map<String, Value>,
    raw: Vec<u8>,
    unknown: AtomicBool,
}

impl UnstructuredTypedObject {
    /// Parse an object from its serialized form
    pub fn from_bytes(data: &[u8], encoding: Encoding) -> ContextResult<Self> {
        let value: Value = encoding.unmarshal(data)?;
        let fields = match value {
            Value::Object(m) => m,
            _ => return Err(ContextError::invalid("typed object: expected a JSON object")),
        };
        Ok(Self::with_raw(fields, data.to_vec()))
    }

    /// Build an object from its field map
    pub fn from_fields(fields: Map<String, Value>) -> ContextResult<Self> {
        let raw = serde_json::to_vec(&fields)?;
        Ok(Self::with_raw(fields, raw))
    }

    /// Capture the serialized form of a typed object
    pub fn from_object<O: VersionedTypedObject + ?Sized>(obj: &O) -> ContextResult<Self> {
        match obj.to_json_value()? {
            Value::Object(m) => Self::from_fields(m),
            _ => Err(ContextError::invalid(format!(
                "typed object {}: not serialized as an object",
                obj.get_type()
            ))),
        }
    }

    fn with_raw(fields: Map<String, Value>, raw: Vec<u8>) -> Self {
        let object_type = fields
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            object_type,
            fields,
            raw,
            unknown: AtomicBool::new(false),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The bytes this object was created from
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Annotate the result of the last evaluation
    pub fn set_unknown(&self, unknown: bool) {
        self.unknown.store(unknown, Ordering::SeqCst);
    }
}

impl VersionedTypedObject for UnstructuredTypedObject {
    fn get_type(&self) -> &str {
        &self.object_type
    }

    fn is_unknown(&self) -> bool {
        self.unknown.load(Ordering::SeqCst)
    }
}

impl Clone for UnstructuredTypedObject {
    fn clone(&self) -> Self {
        Self {
            object_type: self.object_type.clone(),
            fields: self.fields.clone(),
            raw: self.raw.clone(),
            unknown: AtomicBool::new(self.is_unknown()),
        }
    }
}

impl PartialEq for UnstructuredTypedObject {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Debug for UnstructuredTypedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnstructuredTypedObject")
            .field("type", &self.object_type)
            .field("fields", &self.fields)
            .field("unknown", &self.is_unknown())
            .finish()
    }
}

impl Serialize for UnstructuredTypedObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UnstructuredTypedObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Map::deserialize(deserializer)?;
        Self::from_fields(fields).map_err(serde::de::Error::custom)
    }
}
