//! # Typed Objects
//!
//! Every specification object carries a `type` tag naming its kind and version.

use std::any::Any;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::errors::ContextResult;

/// Object-safe access to the serde representation of an object
pub trait SerializeObject {
    fn to_json_value(&self) -> ContextResult<Value>;
}

impl<S: Serialize> SerializeObject for S {
    fn to_json_value(&self) -> ContextResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Downcasting support for trait objects
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An object tagged with a versioned type name.
///
/// Implementations serialize the tag as the `type` field.
pub trait VersionedTypedObject: SerializeObject + AsAny + fmt::Debug + Send + Sync {
    /// The (possibly versioned) type name
    fn get_type(&self) -> &str;

    /// Whether this is an envelope for a type the registry did not resolve
    fn is_unknown(&self) -> bool {
        false
    }
}

/// Downcast a typed object to its concrete type
pub fn downcast<T: Any, O: VersionedTypedObject + ?Sized>(obj: &O) -> Option<&T> {
    obj.as_any().downcast_ref::<T>()
}
