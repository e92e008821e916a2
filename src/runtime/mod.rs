//! # Runtime
//!
//! Versioned typed objects and the schemes decoding them.

pub mod encoding;
pub mod object;
pub mod scheme;
pub mod typename;
pub mod unstructured;

pub use encoding::Encoding;
pub use object::{downcast, AsAny, SerializeObject, VersionedTypedObject};
pub use scheme::{
    Decoded, ObjectType, Scheme, TypedObjectDecoder, TypedObjectEncoder, UnstructuredFactory,
};
pub use typename::{versioned, TypeName};
pub use unstructured::{UnstructuredTypedObject, TYPE_FIELD};
