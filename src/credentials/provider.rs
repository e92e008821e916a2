//! # Consumer Providers
//!
//! Providers bind consumer identities of a backend to credential sources.
//! The registry keeps providers in registration order; replacing a provider
//! under an existing key keeps its position.

use std::sync::{Arc, RwLock};

use super::identity::ConsumerIdentity;
use super::matcher::{complete_match, IdentityMatcher};
use super::source::CredentialsSource;
use crate::errors::{ContextError, ContextResult};

/// A matched binding: the credential source and the identity it was registered for
pub type ConsumerMatch = (Arc<dyn CredentialsSource>, ConsumerIdentity);

/// Bridges backend metadata to identity matching
pub trait ConsumerProvider: Send + Sync {
    /// Best binding for `requested` that improves on `current`.
    ///
    /// Returns `None` if no candidate beats the current best.
    fn best_match(
        &self,
        requested: &ConsumerIdentity,
        current: Option<&ConsumerIdentity>,
        matcher: &dyn IdentityMatcher,
    ) -> Option<ConsumerMatch>;

    /// Binding registered for exactly this identity
    fn get(&self, requested: &ConsumerIdentity) -> Option<Arc<dyn CredentialsSource>> {
        self.best_match(requested, None, &complete_match)
            .map(|(source, _)| source)
    }

    /// Called when the provider is removed from a registry
    fn unregister(&self) {}
}

/// Ordered identity bindings shared by the provider implementations
#[derive(Clone, Default)]
pub struct ConsumerList {
    entries: Vec<ConsumerMatch>,
}

impl ConsumerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the binding for an identity, keeping the position of an existing one
    pub fn set(&mut self, id: ConsumerIdentity, source: Arc<dyn CredentialsSource>) {
        match self.entries.iter_mut().find(|(_, existing)| *existing == id) {
            Some(entry) => entry.0 = source,
            None => self.entries.push((source, id)),
        }
    }

    pub fn remove(&mut self, id: &ConsumerIdentity) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(_, existing)| existing != id);
        before != self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn identities(&self) -> Vec<ConsumerIdentity> {
        self.entries.iter().map(|(_, id)| id.clone()).collect()
    }

    /// Scan all bindings in order, carrying the running best
    pub fn best_match(
        &self,
        requested: &ConsumerIdentity,
        current: Option<&ConsumerIdentity>,
        matcher: &dyn IdentityMatcher,
    ) -> Option<ConsumerMatch> {
        let mut found: Option<&ConsumerMatch> = None;
        for entry in &self.entries {
            let cur = found.map(|(_, id)| id).or(current);
            if matcher.matches(requested, cur, &entry.1) {
                found = Some(entry);
            }
        }
        found.map(|(source, id)| (Arc::clone(source), id.clone()))
    }
}

/// Provider for bindings set directly on a credentials context
#[derive(Default)]
pub struct ExplicitConsumers {
    list: RwLock<ConsumerList>,
}

impl ExplicitConsumers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: ConsumerIdentity, source: Arc<dyn CredentialsSource>) -> ContextResult<()> {
        id.validate()?;
        let mut list = self.list.write().map_err(|_| ContextError::lock_poisoned())?;
        list.set(id, source);
        Ok(())
    }

    pub fn remove(&self, id: &ConsumerIdentity) -> ContextResult<bool> {
        let mut list = self.list.write().map_err(|_| ContextError::lock_poisoned())?;
        Ok(list.remove(id))
    }

    pub fn identities(&self) -> Vec<ConsumerIdentity> {
        self.list
            .read()
            .map(|l| l.identities())
            .unwrap_or_default()
    }
}

impl ConsumerProvider for ExplicitConsumers {
    fn best_match(
        &self,
        requested: &ConsumerIdentity,
        current: Option<&ConsumerIdentity>,
        matcher: &dyn IdentityMatcher,
    ) -> Option<ConsumerMatch> {
        self.list
            .read()
            .ok()?
            .best_match(requested, current, matcher)
    }
}

/// Providers keyed by provider identity, in registration order
#[derive(Default)]
pub struct ConsumerProviderRegistry {
    providers: RwLock<Vec<(String, Arc<dyn ConsumerProvider>)>>,
}

impl ConsumerProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a provider
    pub fn register(&self, key: impl Into<String>, provider: Arc<dyn ConsumerProvider>) -> ContextResult<()> {
        let key = key.into();
        let mut providers = self
            .providers
            .write()
            .map_err(|_| ContextError::lock_poisoned())?;
        match providers.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => {
                let old = std::mem::replace(&mut entry.1, provider);
                old.unregister();
            }
            None => providers.push((key, provider)),
        }
        Ok(())
    }

    pub fn unregister(&self, key: &str) -> ContextResult<bool> {
        let mut providers = self
            .providers
            .write()
            .map_err(|_| ContextError::lock_poisoned())?;
        match providers.iter().position(|(k, _)| k == key) {
            Some(i) => {
                let (_, old) = providers.remove(i);
                old.unregister();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.providers
            .read()
            .map(|p| p.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    /// Scan every provider in registration order, carrying the running best.
    ///
    /// A later provider only replaces the best binding found so far if the
    /// matcher accepts its candidate against it.
    pub fn best_match(
        &self,
        requested: &ConsumerIdentity,
        matcher: &dyn IdentityMatcher,
    ) -> ContextResult<Option<ConsumerMatch>> {
        // providers may register further providers while matching
        let providers: Vec<Arc<dyn ConsumerProvider>> = self
            .providers
            .read()
            .map_err(|_| ContextError::lock_poisoned())?
            .iter()
            .map(|(_, p)| Arc::clone(p))
            .collect();

        let mut found: Option<ConsumerMatch> = None;
        for provider in providers {
            let current = found.as_ref().map(|(_, id)| id);
            if let Some(m) = provider.best_match(requested, current, matcher) {
                found = Some(m);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::context::CredentialsContext;
    use crate::credentials::matcher::partial_match;
    use crate::credentials::properties::Properties;
    use crate::credentials::source::DirectCredentials;

    fn source(user: &str) -> Arc<dyn CredentialsSource> {
        Arc::new(DirectCredentials::new(Properties::from([("user", user)])))
    }

    fn user_of(m: &ConsumerMatch) -> String {
        let ctx = CredentialsContext::builder().build().unwrap();
        m.0.credentials(&ctx)
            .unwrap()
            .get_property("user")
            .unwrap_or_default()
    }

    #[test]
    fn test_list_replaces_in_place() {
        let mut list = ConsumerList::new();
        let a = ConsumerIdentity::new("t").with("a", "1");
        let b = ConsumerIdentity::new("t").with("b", "1");
        list.set(a.clone(), source("1"));
        list.set(b.clone(), source("2"));
        list.set(a.clone(), source("3"));
        assert_eq!(list.identities(), vec![a, b]);
    }

    #[test]
    fn test_registry_carries_best_across_providers() {
        let req = ConsumerIdentity::new("t").with("host", "h").with("path", "p");

        let first = Arc::new(ExplicitConsumers::new());
        first
            .set(ConsumerIdentity::new("t").with("host", "h"), source("specific"))
            .unwrap();
        let second = Arc::new(ExplicitConsumers::new());
        second.set(ConsumerIdentity::new("t"), source("generic")).unwrap();

        let registry = ConsumerProviderRegistry::new();
        registry.register("first", first).unwrap();
        registry.register("second", second).unwrap();

        let m = registry.best_match(&req, &partial_match).unwrap().unwrap();
        assert_eq!(user_of(&m), "specific");
    }

    #[test]
    fn test_registry_later_provider_wins_tie() {
        let id = ConsumerIdentity::new("t").with("host", "h");
        let first = Arc::new(ExplicitConsumers::new());
        first.set(id.clone(), source("first")).unwrap();
        let second = Arc::new(ExplicitConsumers::new());
        second.set(id.clone(), source("second")).unwrap();

        let registry = ConsumerProviderRegistry::new();
        registry.register("a", first).unwrap();
        registry.register("b", second).unwrap();

        let m = registry.best_match(&id, &complete_match).unwrap().unwrap();
        assert_eq!(user_of(&m), "second");
    }

    #[test]
    fn test_replace_keeps_position() {
        let registry = ConsumerProviderRegistry::new();
        registry.register("a", Arc::new(ExplicitConsumers::new())).unwrap();
        registry.register("b", Arc::new(ExplicitConsumers::new())).unwrap();
        registry.register("a", Arc::new(ExplicitConsumers::new())).unwrap();
        assert_eq!(registry.keys(), vec!["a", "b"]);

        assert!(registry.unregister("a").unwrap());
        assert!(!registry.unregister("a").unwrap());
        assert_eq!(registry.keys(), vec!["b"]);
    }

    #[test]
    fn test_explicit_requires_type() {
        let p = ExplicitConsumers::new();
        let mut id = ConsumerIdentity::default();
        id.set("host", "h");
        assert!(p.set(id, source("x")).unwrap_err().is_invalid());
    }

    #[test]
    fn test_get_is_complete_match() {
        let p = ExplicitConsumers::new();
        p.set(ConsumerIdentity::new("t"), source("x")).unwrap();
        assert!(p.get(&ConsumerIdentity::new("t")).is_some());
        assert!(p.get(&ConsumerIdentity::new("t").with("a", "b")).is_none());
    }
}
