//! # Credentials and Credential Sources
//!
//! [`Credentials`] are read-only property sets. A [`CredentialsSource`]
//! yields credentials on demand and may be backed by a live store, so the
//! returned set can reflect changes of the backend.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::context::CredentialsContext;
use super::properties::Properties;
use crate::errors::ContextResult;

/// Read access to a credential property set
pub trait Credentials: fmt::Debug + Send + Sync {
    fn exists_property(&self, name: &str) -> bool;

    fn get_property(&self, name: &str) -> Option<String>;

    fn property_names(&self) -> Vec<String>;

    /// Snapshot copy of all properties
    fn properties(&self) -> Properties;
}

/// Provider of credentials evaluated against a credentials context
pub trait CredentialsSource: Send + Sync {
    fn credentials(&self, ctx: &CredentialsContext) -> ContextResult<Arc<dyn Credentials>>;
}

/// Plain in-memory credentials
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DirectCredentials(Properties);

impl DirectCredentials {
    pub fn new(props: Properties) -> Self {
        Self(props)
    }

    /// Basic auth credentials
    pub fn simple(user: &str, password: &str) -> Self {
        let mut props = Properties::new();
        props.set_non_empty(super::properties::ATTR_USERNAME, user);
        props.set_non_empty(super::properties::ATTR_PASSWORD, password);
        Self(props)
    }

    pub fn copy_of(creds: &dyn Credentials) -> Self {
        Self(creds.properties())
    }
}

impl fmt::Debug for DirectCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirectCredentials{}", self.0)
    }
}

impl Credentials for DirectCredentials {
    fn exists_property(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    fn get_property(&self, name: &str) -> Option<String> {
        self.0.get(name).map(str::to_string)
    }

    fn property_names(&self) -> Vec<String> {
        self.0.names()
    }

    fn properties(&self) -> Properties {
        self.0.clone()
    }
}

impl CredentialsSource for DirectCredentials {
    fn credentials(&self, _ctx: &CredentialsContext) -> ContextResult<Arc<dyn Credentials>> {
        Ok(Arc::new(self.clone()))
    }
}

/// Shared, mutable store of named property sets
pub type CredentialStore = Arc<RwLock<BTreeMap<String, Properties>>>;

/// Credentials reading the current state of a [`CredentialStore`] entry
pub struct LiveCredentials {
    store: CredentialStore,
    name: String,
}

impl LiveCredentials {
    pub fn new(store: CredentialStore, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&Properties) -> R) -> Option<R> {
        let store = self.store.read().ok()?;
        store.get(&self.name).map(f)
    }
}

impl fmt::Debug for LiveCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LiveCredentials({})", self.name)
    }
}

impl Credentials for LiveCredentials {
    fn exists_property(&self, name: &str) -> bool {
        self.with(|p| p.contains(name)).unwrap_or(false)
    }

    fn get_property(&self, name: &str) -> Option<String> {
        self.with(|p| p.get(name).map(str::to_string)).flatten()
    }

    fn property_names(&self) -> Vec<String> {
        self.with(Properties::names).unwrap_or_default()
    }

    fn properties(&self) -> Properties {
        self.with(Properties::clone).unwrap_or_default()
    }
}

impl CredentialsSource for LiveCredentials {
    fn credentials(&self, _ctx: &CredentialsContext) -> ContextResult<Arc<dyn Credentials>> {
        Ok(Arc::new(LiveCredentials::new(
            Arc::clone(&self.store),
            self.name.clone(),
        )))
    }
}

/// Ordered list of credential sources.
///
/// Evaluation merges the properties of all sources in order; later
/// sources override earlier ones. The first failing source aborts.
#[derive(Clone, Default)]
pub struct CredentialsChain(Vec<Arc<dyn CredentialsSource>>);

impl CredentialsChain {
    pub fn new(sources: Vec<Arc<dyn CredentialsSource>>) -> Self {
        Self(sources)
    }

    pub fn push(&mut self, source: Arc<dyn CredentialsSource>) {
        self.0.push(source);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl CredentialsSource for CredentialsChain {
    fn credentials(&self, ctx: &CredentialsContext) -> ContextResult<Arc<dyn Credentials>> {
        let mut props = Properties::new();
        for source in &self.0 {
            let creds = source.credentials(ctx)?;
            props.merge(&creds.properties());
        }
        Ok(Arc::new(DirectCredentials::new(props)))
    }
}
