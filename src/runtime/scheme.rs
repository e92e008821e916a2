//! # Type Schemes
//!
//! A scheme maps versioned type names to decoders for one family of
//! specification objects (config types, repository types, ...).
//!
//! Lookup order for a type name:
//! 1. exact (versioned) name, then the name with its version stripped
//! 2. local registrations, then the base scheme
//! 3. the default decoder, continuing only on an unknown-type failure
//! 4. an unstructured envelope tagged unknown, if the scheme accepts unknown types
//!
//! Registration may happen at any time. Later registrations of the same
//! name replace earlier ones.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::encoding::Encoding;
use super::object::VersionedTypedObject;
use super::typename::TypeName;
use super::unstructured::UnstructuredTypedObject;
use crate::errors::{ContextError, ContextResult};

/// Decodes serialized data into a typed object
pub trait TypedObjectDecoder<T: ?Sized>: Send + Sync {
    fn decode(&self, data: &[u8], encoding: Encoding) -> ContextResult<Arc<T>>;

    /// Custom wire shaping for objects of this type
    fn encoder(&self) -> Option<&dyn TypedObjectEncoder<T>> {
        None
    }

    /// Human readable description of the type
    fn description(&self) -> &str {
        ""
    }
}

/// Encodes typed objects with a custom wire shape
pub trait TypedObjectEncoder<T: ?Sized>: Send + Sync {
    fn encode(&self, obj: &T, encoding: Encoding) -> ContextResult<Vec<u8>>;
}

type DecodeFn<T> = Box<dyn Fn(&[u8], Encoding) -> ContextResult<Arc<T>> + Send + Sync>;
type EncodeFn<T> = Box<dyn Fn(&T, Encoding) -> ContextResult<Vec<u8>> + Send + Sync>;

/// Factory wrapping an unresolved object into the scheme's object family
pub type UnstructuredFactory<T> = Arc<dyn Fn(UnstructuredTypedObject) -> Arc<T> + Send + Sync>;

/// Registration entry for one concrete specification type
pub struct ObjectType<T: ?Sized> {
    name: String,
    description: String,
    decode: DecodeFn<T>,
    encode: Option<EncodeFn<T>>,
}

impl<T: ?Sized + 'static> ObjectType<T> {
    /// Type decoding into `S` and converting into the family type
    pub fn new<S, F>(name: impl Into<String>, convert: F) -> Self
    where
        S: DeserializeOwned + 'static,
        F: Fn(S) -> Arc<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            decode: Box::new(move |data: &[u8], encoding: Encoding| {
                let spec: S = encoding.unmarshal(data)?;
                Ok(convert(spec))
            }),
            encode: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_encoder<F>(mut self, encode: F) -> Self
    where
        F: Fn(&T, Encoding) -> ContextResult<Vec<u8>> + Send + Sync + 'static,
    {
        self.encode = Some(Box::new(encode));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: ?Sized + 'static> TypedObjectDecoder<T> for ObjectType<T> {
    fn decode(&self, data: &[u8], encoding: Encoding) -> ContextResult<Arc<T>> {
        (self.decode)(data, encoding)
    }

    fn encoder(&self) -> Option<&dyn TypedObjectEncoder<T>> {
        match self.encode {
            Some(_) => Some(self),
            None => None,
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl<T: ?Sized + 'static> TypedObjectEncoder<T> for ObjectType<T> {
    fn encode(&self, obj: &T, encoding: Encoding) -> ContextResult<Vec<u8>> {
        match &self.encode {
            Some(f) => f(obj, encoding),
            None => Err(ContextError::invalid(format!("{}: no encoder", self.name))),
        }
    }
}

/// Result of [`Scheme::enforce_decode`]
pub enum Decoded<T: ?Sized> {
    Known(Arc<T>),
    Unknown(UnstructuredTypedObject),
}

#[derive(Deserialize)]
struct TypeHeader {
    #[serde(rename = "type", default)]
    object_type: String,
}

/// Registry of decoders for one object family
pub struct Scheme<T: ?Sized> {
    kind: String,
    base: Option<Arc<Scheme<T>>>,
    types: RwLock<BTreeMap<String, Arc<dyn TypedObjectDecoder<T>>>>,
    default_decoder: Option<Arc<dyn TypedObjectDecoder<T>>>,
    unstructured: Option<UnstructuredFactory<T>>,
}

impl<T: ?Sized + VersionedTypedObject + 'static> Scheme<T> {
    /// Create an empty scheme; `kind` names its types in errors
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            base: None,
            types: RwLock::new(BTreeMap::new()),
            default_decoder: None,
            unstructured: None,
        }
    }

    /// Delegate lookups not resolved locally to `base`
    pub fn with_base(mut self, base: Arc<Scheme<T>>) -> Self {
        self.base = Some(base);
        self
    }

    /// Accept unknown types, wrapping them with `factory`
    pub fn accept_unknown(mut self, factory: UnstructuredFactory<T>) -> Self {
        self.unstructured = Some(factory);
        self
    }

    pub fn with_default_decoder(mut self, decoder: Arc<dyn TypedObjectDecoder<T>>) -> Self {
        self.default_decoder = Some(decoder);
        self
    }

    /// A new empty scheme delegating to this one
    pub fn derive(self: &Arc<Self>) -> Self {
        Self {
            kind: self.kind.clone(),
            base: Some(Arc::clone(self)),
            types: RwLock::new(BTreeMap::new()),
            default_decoder: self.default_decoder.clone(),
            unstructured: self.unstructured.clone(),
        }
    }

    /// A point-in-time copy of all types currently known, without a base
    pub fn snapshot(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            base: None,
            types: RwLock::new(self.known_types()),
            default_decoder: self.default_decoder.clone(),
            unstructured: self.unstructured.clone(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn base(&self) -> Option<&Arc<Scheme<T>>> {
        self.base.as_ref()
    }

    pub fn is_accepting_unknown(&self) -> bool {
        self.unstructured.is_some()
    }

    /// Register a decoder under a type name
    pub fn register(
        &self,
        name: impl Into<String>,
        decoder: Arc<dyn TypedObjectDecoder<T>>,
    ) -> ContextResult<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(ContextError::invalid("type name: must not be empty"));
        }
        let mut types = self
            .types
            .write()
            .map_err(|_| ContextError::lock_poisoned())?;
        types.insert(name, decoder);
        Ok(())
    }

    /// Register an object type under its own name and additional aliases
    pub fn register_type(&self, object_type: ObjectType<T>, aliases: &[&str]) -> ContextResult<()> {
        let name = object_type.name().to_string();
        let decoder: Arc<dyn TypedObjectDecoder<T>> = Arc::new(object_type);
        for alias in aliases {
            self.register(*alias, Arc::clone(&decoder))?;
        }
        self.register(name, decoder)
    }

    /// Find the decoder for an exact name, locally first, then in the base
    pub fn get_decoder(&self, name: &str) -> ContextResult<Option<Arc<dyn TypedObjectDecoder<T>>>> {
        let local = self
            .types
            .read()
            .map_err(|_| ContextError::lock_poisoned())?
            .get(name)
            .cloned();
        match (local, &self.base) {
            (Some(d), _) => Ok(Some(d)),
            (None, Some(base)) => base.get_decoder(name),
            (None, None) => Ok(None),
        }
    }

    fn lookup(&self, name: &str) -> ContextResult<Option<Arc<dyn TypedObjectDecoder<T>>>> {
        if let Some(d) = self.get_decoder(name)? {
            return Ok(Some(d));
        }
        let parsed = TypeName::parse(name);
        if parsed.is_versioned() {
            return self.get_decoder(&parsed.unversioned());
        }
        Ok(None)
    }

    /// Whether a decoder is registered for the given (possibly versioned) name
    pub fn is_known(&self, name: &str) -> bool {
        matches!(self.lookup(name), Ok(Some(_)))
    }

    /// All registrations visible through this scheme; local ones shadow the base
    pub fn known_types(&self) -> BTreeMap<String, Arc<dyn TypedObjectDecoder<T>>> {
        let mut all = match &self.base {
            Some(b) => b.known_types(),
            None => BTreeMap::new(),
        };
        if let Ok(types) = self.types.read() {
            for (name, d) in types.iter() {
                all.insert(name.clone(), Arc::clone(d));
            }
        }
        all
    }

    pub fn known_type_names(&self) -> Vec<String> {
        self.known_types().into_keys().collect()
    }

    /// Copy all types known by `other` into this scheme
    pub fn add_known_types(&self, other: &Scheme<T>) -> ContextResult<()> {
        for (name, d) in other.known_types() {
            self.register(name, d)?;
        }
        Ok(())
    }

    /// Type names with their descriptions
    pub fn usage(&self) -> String {
        let mut out = String::new();
        for (name, d) in self.known_types() {
            out.push_str("- ");
            out.push_str(&name);
            out.push('\n');
            for line in d.description().lines() {
                out.push_str("    ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Decode serialized data into an object of this family
    pub fn decode(&self, data: &[u8], encoding: Encoding) -> ContextResult<Arc<T>> {
        let header: TypeHeader = encoding.unmarshal(data)?;
        if header.object_type.is_empty() {
            return Err(ContextError::invalid(format!("{}: no type found", self.kind)));
        }
        if let Some(d) = self.lookup(&header.object_type)? {
            return d.decode(data, encoding);
        }
        if let Some(d) = &self.default_decoder {
            match d.decode(data, encoding) {
                Ok(obj) => return Ok(obj),
                Err(e) if !e.is_unknown_type() => return Err(e),
                Err(_) => {}
            }
        }
        match &self.unstructured {
            Some(factory) => {
                let u = UnstructuredTypedObject::from_bytes(data, encoding)?;
                u.set_unknown(true);
                Ok(factory(u))
            }
            None => Err(ContextError::unknown_type(&self.kind, header.object_type)),
        }
    }

    /// Decode like [`Scheme::decode`], but keep unresolved data even if
    /// the scheme does not accept unknown types
    pub fn enforce_decode(&self, data: &[u8], encoding: Encoding) -> ContextResult<Decoded<T>> {
        match self.decode(data, encoding) {
            Ok(obj) if !obj.is_unknown() => Ok(Decoded::Known(obj)),
            Ok(_) => {
                let u = UnstructuredTypedObject::from_bytes(data, encoding)?;
                u.set_unknown(true);
                Ok(Decoded::Unknown(u))
            }
            Err(e) if e.is_unknown_kind(&self.kind) => {
                let u = UnstructuredTypedObject::from_bytes(data, encoding)?;
                u.set_unknown(true);
                Ok(Decoded::Unknown(u))
            }
            Err(e) => Err(e),
        }
    }

    /// Decode an unstructured object through this scheme
    pub fn convert(&self, u: &UnstructuredTypedObject) -> ContextResult<Arc<T>> {
        self.decode(u.raw(), Encoding::Json)
    }

    /// Re-evaluate an unstructured object against the current registrations.
    ///
    /// Fails with an unknown-type error while the type is still unresolved.
    /// Only the unknown flag of `u` is updated.
    pub fn evaluate(&self, u: &UnstructuredTypedObject) -> ContextResult<Arc<T>> {
        match self.convert(u) {
            Ok(obj) if !obj.is_unknown() => {
                u.set_unknown(false);
                Ok(obj)
            }
            Ok(_) => {
                u.set_unknown(true);
                Err(ContextError::unknown_type(&self.kind, u.get_type()))
            }
            Err(e) => {
                if e.is_unknown_type() {
                    u.set_unknown(true);
                }
                Err(e)
            }
        }
    }

    /// Encode an object, using the custom encoder of its type if registered
    pub fn encode(&self, obj: &T, encoding: Encoding) -> ContextResult<Vec<u8>> {
        if let Some(d) = self.lookup(obj.get_type())? {
            if let Some(e) = d.encoder() {
                return e.encode(obj, encoding);
            }
        }
        encoding.marshal(&obj.to_json_value()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::object::downcast;
    use serde::Serialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct ValueSpec {
        #[serde(rename = "type")]
        object_type: String,
        value: String,
    }

    impl VersionedTypedObject for ValueSpec {
        fn get_type(&self) -> &str {
            &self.object_type
        }
    }

    type Obj = dyn VersionedTypedObject;

    fn value_type(name: &str) -> ObjectType<Obj> {
        ObjectType::new(name, |s: ValueSpec| Arc::new(s) as Arc<Obj>)
            .with_description("a single value")
    }

    fn accepting() -> Scheme<Obj> {
        Scheme::new("test type")
            .accept_unknown(Arc::new(|u: UnstructuredTypedObject| Arc::new(u) as Arc<Obj>))
    }

    #[test]
    fn test_decode_registered_type() {
        let scheme: Scheme<Obj> = Scheme::new("test type");
        scheme.register_type(value_type("value"), &[]).unwrap();

        let obj = scheme
            .decode(br#"{"type":"value","value":"v"}"#, Encoding::Json)
            .unwrap();
        let spec = downcast::<ValueSpec, _>(&*obj).unwrap();
        assert_eq!(spec.value, "v");
    }

    #[test]
    fn test_versioned_name_falls_back_to_unversioned() {
        let scheme: Scheme<Obj> = Scheme::new("test type");
        scheme.register_type(value_type("value"), &[]).unwrap();

        let obj = scheme
            .decode(br#"{"type":"value/v7","value":"x"}"#, Encoding::Json)
            .unwrap();
        assert_eq!(obj.get_type(), "value/v7");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let scheme: Scheme<Obj> = Scheme::new("test type");
        let err = scheme
            .decode(br#"{"type":"other"}"#, Encoding::Json)
            .unwrap_err();
        assert!(err.is_unknown_kind("test type"));
    }

    #[test]
    fn test_missing_type_is_invalid() {
        let scheme: Scheme<Obj> = Scheme::new("test type");
        let err = scheme.decode(br#"{"value":"x"}"#, Encoding::Json).unwrap_err();
        assert!(err.is_invalid());
    }

    #[test]
    fn test_unknown_then_registered() {
        let scheme = accepting();
        let data = br#"{"type":"late/v1","value":"later"}"#;

        let obj = scheme.decode(data, Encoding::Json).unwrap();
        assert!(obj.is_unknown());
        let u = downcast::<UnstructuredTypedObject, _>(&*obj).unwrap();
        assert!(scheme.evaluate(u).is_err());
        assert!(u.is_unknown());

        scheme.register_type(value_type("late"), &[]).unwrap();
        let resolved = scheme.evaluate(u).unwrap();
        assert!(!u.is_unknown());
        assert_eq!(u.raw(), &data[..]);
        assert_eq!(downcast::<ValueSpec, _>(&*resolved).unwrap().value, "later");
    }

    #[test]
    fn test_base_delegation_and_local_override() {
        let base: Arc<Scheme<Obj>> = Arc::new(Scheme::new("test type"));
        base.register_type(value_type("a"), &[]).unwrap();
        let local = base.derive();
        local.register_type(value_type("b"), &[]).unwrap();

        assert!(local.is_known("a"));
        assert!(local.is_known("b"));
        assert!(!base.is_known("b"));
        assert_eq!(local.known_type_names(), vec!["a", "b"]);

        // registrations on the base stay visible
        base.register_type(value_type("c"), &[]).unwrap();
        assert!(local.is_known("c"));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let base: Arc<Scheme<Obj>> = Arc::new(Scheme::new("test type"));
        base.register_type(value_type("a"), &[]).unwrap();
        let snap = base.snapshot();
        base.register_type(value_type("b"), &[]).unwrap();

        assert!(snap.is_known("a"));
        assert!(!snap.is_known("b"));
        assert!(snap.base().is_none());
    }

    #[test]
    fn test_add_known_types_last_write_wins() {
        let target: Scheme<Obj> = Scheme::new("test type");
        target
            .register_type(value_type("a").with_description("old"), &[])
            .unwrap();
        let other: Scheme<Obj> = Scheme::new("test type");
        other
            .register_type(value_type("a").with_description("new"), &["a/v1"])
            .unwrap();

        target.add_known_types(&other).unwrap();
        assert_eq!(target.get_decoder("a").unwrap().unwrap().description(), "new");
        assert!(target.is_known("a/v1"));
    }

    #[test]
    fn test_default_decoder_continues_on_unknown_only() {
        struct Failing(bool);
        impl TypedObjectDecoder<Obj> for Failing {
            fn decode(&self, _data: &[u8], _e: Encoding) -> ContextResult<Arc<Obj>> {
                if self.0 {
                    Err(ContextError::unknown_type("test type", "x"))
                } else {
                    Err(ContextError::invalid("broken"))
                }
            }
        }

        let scheme = accepting().with_default_decoder(Arc::new(Failing(true)));
        let obj = scheme.decode(br#"{"type":"x"}"#, Encoding::Json).unwrap();
        assert!(obj.is_unknown());

        let scheme = accepting().with_default_decoder(Arc::new(Failing(false)));
        let err = scheme.decode(br#"{"type":"x"}"#, Encoding::Json).unwrap_err();
        assert!(err.is_invalid());
    }

    #[test]
    fn test_encode_round_trip() {
        let scheme: Scheme<Obj> = Scheme::new("test type");
        scheme.register_type(value_type("value/v1"), &[]).unwrap();
        let spec = ValueSpec {
            object_type: "value/v1".to_string(),
            value: "x".to_string(),
        };

        let data = scheme.encode(&spec, Encoding::Json).unwrap();
        let back = scheme.decode(&data, Encoding::Json).unwrap();
        assert_eq!(downcast::<ValueSpec, _>(&*back), Some(&spec));
    }

    #[test]
    fn test_custom_encoder_used() {
        let scheme: Scheme<Obj> = Scheme::new("test type");
        scheme
            .register_type(
                value_type("value").with_encoder(|_obj, _e| Ok(b"custom".to_vec())),
                &[],
            )
            .unwrap();
        let spec = ValueSpec {
            object_type: "value".to_string(),
            value: "x".to_string(),
        };
        assert_eq!(scheme.encode(&spec, Encoding::Json).unwrap(), b"custom");
    }

    #[test]
    fn test_enforce_decode_keeps_unknown() {
        let scheme: Scheme<Obj> = Scheme::new("test type");
        match scheme
            .enforce_decode(br#"{"type":"nope","a":1}"#, Encoding::Json)
            .unwrap()
        {
            Decoded::Unknown(u) => {
                assert!(u.is_unknown());
                assert_eq!(u.get_type(), "nope");
            }
            Decoded::Known(_) => panic!("expected unknown object"),
        }
    }

    #[test]
    fn test_poisoned_base_is_an_error() {
        let base: Arc<Scheme<Obj>> = Arc::new(Scheme::new("test type"));
        base.register_type(value_type("value"), &[]).unwrap();
        let local = base.derive();
        let joined = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = base.types.write().unwrap();
                panic!("poisoning the base registry");
            })
            .join()
        });
        assert!(joined.is_err());

        let err = local
            .decode(br#"{"type":"value","value":"x"}"#, Encoding::Json)
            .unwrap_err();
        assert!(matches!(err, ContextError::Internal(_)));
        assert!(local.get_decoder("value").is_err());
        assert!(!local.is_known("value"));
    }
}
