//! # Repositories and Repository Specifications
//!
//! A repository is a named collection of credential sets. Repositories are
//! described by typed specifications decoded through the repository type
//! scheme of a credentials context.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::context::CredentialsContext;
use super::source::{Credentials, CredentialsSource};
use crate::errors::{ContextError, ContextResult, ResultExt};
use crate::runtime::{AsAny, Scheme, UnstructuredTypedObject, VersionedTypedObject};

/// Named collection of credentials
pub trait Repository: AsAny + fmt::Debug + Send + Sync {
    fn exists_credentials(&self, name: &str) -> ContextResult<bool>;

    fn lookup_credentials(&self, name: &str) -> ContextResult<Arc<dyn Credentials>>;

    /// Store credentials; read-only backends fail with `NotSupported`
    fn write_credentials(
        &self,
        name: &str,
        creds: &dyn Credentials,
    ) -> ContextResult<Arc<dyn Credentials>>;
}

/// Concrete type of a repository, if it is a `T`
pub fn downcast_repository<T: std::any::Any>(repo: &dyn Repository) -> Option<&T> {
    repo.as_any().downcast_ref()
}

/// Typed specification of a repository
pub trait RepositorySpec: VersionedTypedObject {
    /// Get (or create) the described repository.
    ///
    /// `creds` are the credentials needed to access the backend, if any.
    fn repository(
        &self,
        ctx: &CredentialsContext,
        creds: Option<&dyn Credentials>,
    ) -> ContextResult<Arc<dyn Repository>>;
}

/// Scheme of all repository specification types
pub type RepositoryTypeScheme = Scheme<dyn RepositorySpec>;

/// New repository type scheme accepting unknown types
pub fn new_repository_type_scheme() -> RepositoryTypeScheme {
    Scheme::new(crate::errors::KIND_REPOSITORY_TYPE).accept_unknown(Arc::new(
        |u: UnstructuredTypedObject| Arc::new(GenericRepositorySpec::new(u)) as Arc<dyn RepositorySpec>,
    ))
}

/// Repository specification of a possibly not yet known type
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenericRepositorySpec(UnstructuredTypedObject);

impl GenericRepositorySpec {
    pub fn new(u: UnstructuredTypedObject) -> Self {
        Self(u)
    }

    /// Capture any repository specification
    pub fn from_spec(spec: &dyn RepositorySpec) -> ContextResult<Self> {
        Ok(Self(UnstructuredTypedObject::from_object(spec)?))
    }

    pub fn unstructured(&self) -> &UnstructuredTypedObject {
        &self.0
    }

    /// Resolve the concrete specification against the context's types
    pub fn evaluate(&self, ctx: &CredentialsContext) -> ContextResult<Arc<dyn RepositorySpec>> {
        ctx.repository_types().evaluate(&self.0)
    }
}

impl fmt::Debug for GenericRepositorySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericRepositorySpec({:?})", self.0.fields())
    }
}

impl VersionedTypedObject for GenericRepositorySpec {
    fn get_type(&self) -> &str {
        self.0.get_type()
    }

    fn is_unknown(&self) -> bool {
        self.0.is_unknown()
    }
}

impl RepositorySpec for GenericRepositorySpec {
    fn repository(
        &self,
        ctx: &CredentialsContext,
        creds: Option<&dyn Credentials>,
    ) -> ContextResult<Arc<dyn Repository>> {
        let spec = self.evaluate(ctx)?;
        spec.repository(ctx, creds)
    }
}

/// Field of a credentials specification naming the credential set
pub const CREDENTIALS_NAME_FIELD: &str = "credentialsName";

/// Credential set in a repository: the repository specification fields
/// plus `credentialsName`
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialsSpec {
    pub credentials_name: String,
    pub repository: GenericRepositorySpec,
}

impl CredentialsSpec {
    pub fn new(credentials_name: impl Into<String>, repository: &dyn RepositorySpec) -> ContextResult<Self> {
        Ok(Self {
            credentials_name: credentials_name.into(),
            repository: GenericRepositorySpec::from_spec(repository)?,
        })
    }

    /// Resolve the credentials through the described repository
    pub fn resolve(&self, ctx: &CredentialsContext) -> ContextResult<Arc<dyn Credentials>> {
        let repo = ctx.repository_for_spec(&self.repository, None)?;
        repo.lookup_credentials(&self.credentials_name)
            .context(|| format!("credentials {:?}", self.credentials_name))
    }
}

impl CredentialsSource for CredentialsSpec {
    fn credentials(&self, ctx: &CredentialsContext) -> ContextResult<Arc<dyn Credentials>> {
        self.resolve(ctx)
    }
}

impl Serialize for CredentialsSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut fields = self.repository.unstructured().fields().clone();
        if !self.credentials_name.is_empty() {
            fields.insert(
                CREDENTIALS_NAME_FIELD.to_string(),
                Value::String(self.credentials_name.clone()),
            );
        }
        fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CredentialsSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields: Map<String, Value> = Map::deserialize(deserializer)?;
        let credentials_name = match fields.remove(CREDENTIALS_NAME_FIELD) {
            Some(Value::String(s)) => s,
            Some(_) => {
                return Err(serde::de::Error::custom(
                    "credentialsName: expected a string",
                ))
            }
            None => String::new(),
        };
        let u = UnstructuredTypedObject::from_fields(fields).map_err(serde::de::Error::custom)?;
        Ok(Self {
            credentials_name,
            repository: GenericRepositorySpec::new(u),
        })
    }
}

/// Construct-once cache of repository instances.
///
/// The lock is held while a repository is created, so concurrent requests
/// for the same key never create two instances.
pub struct RepositoryCache<R: ?Sized> {
    repositories: Mutex<BTreeMap<String, Arc<R>>>,
}

impl<R: ?Sized> Default for RepositoryCache<R> {
    fn default() -> Self {
        Self {
            repositories: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<R: ?Sized> RepositoryCache<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create<F>(&self, key: &str, create: F) -> ContextResult<Arc<R>>
    where
        F: FnOnce() -> ContextResult<Arc<R>>,
    {
        let mut repos = self
            .repositories
            .lock()
            .map_err(|_| ContextError::lock_poisoned())?;
        if let Some(r) = repos.get(key) {
            return Ok(Arc::clone(r));
        }
        let r = create()?;
        repos.insert(key.to_string(), Arc::clone(&r));
        Ok(r)
    }

    pub fn get(&self, key: &str) -> Option<Arc<R>> {
        self.repositories.lock().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.repositories.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_credentials_spec_wire_format() {
        let data = r#"{"credentialsName":"cred","repoName":"test","type":"Memory"}"#;
        let spec: CredentialsSpec = serde_json::from_str(data).unwrap();
        assert_eq!(spec.credentials_name, "cred");
        assert_eq!(spec.repository.get_type(), "Memory");
        assert!(!spec.repository.unstructured().fields().contains_key("credentialsName"));

        let back: Value = serde_json::to_value(&spec).unwrap();
        assert_eq!(back, serde_json::from_str::<Value>(data).unwrap());
    }

    #[test]
    fn test_credentials_spec_without_name() {
        let spec: CredentialsSpec =
            serde_json::from_str(r#"{"type":"Credentials","properties":{"a":"b"}}"#).unwrap();
        assert!(spec.credentials_name.is_empty());
        let back = serde_json::to_value(&spec).unwrap();
        assert!(back.get(CREDENTIALS_NAME_FIELD).is_none());
    }

    #[test]
    fn test_cache_constructs_once() {
        let cache: Arc<RepositoryCache<String>> = Arc::new(RepositoryCache::new());
        let created = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let created = Arc::clone(&created);
                thread::spawn(move || {
                    cache
                        .get_or_create("key", || {
                            created.fetch_add(1, Ordering::SeqCst);
                            Ok(Arc::new("repo".to_string()))
                        })
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(*h.join().unwrap(), "repo");
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_does_not_store_failures() {
        let cache: RepositoryCache<String> = RepositoryCache::new();
        assert!(cache
            .get_or_create("key", || Err(ContextError::invalid("spec")))
            .is_err());
        assert!(cache.get("key").is_none());
    }

    #[test]
    fn test_repository_results_are_debuggable() {
        use crate::credentials::repositories::memory::MemoryRepository;

        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new("debug"));
        assert_eq!(format!("{:?}", repo), "MemoryRepository(debug)");

        let failed: ContextResult<Arc<dyn Repository>> =
            Err(ContextError::not_found(crate::errors::KIND_REPOSITORY, "none"));
        assert!(failed.unwrap_err().is_not_found());
        let found: ContextResult<Arc<dyn Repository>> = Ok(repo);
        assert!(found.unwrap().exists_credentials("x").is_ok());
    }
}
