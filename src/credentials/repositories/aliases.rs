//! Named aliases for repository specifications.
//!
//! An alias binds a name to a repository specification and optional access
//! credentials. The aliased repository is created on first use and kept.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::credentials::context::CredentialsContext;
use crate::credentials::repository::{
    GenericRepositorySpec, Repository, RepositorySpec, RepositoryTypeScheme,
};
use crate::credentials::source::{Credentials, CredentialsSource, DirectCredentials};
use crate::errors::{ContextError, ContextResult, KIND_REPOSITORY};
use crate::runtime::{ObjectType, VersionedTypedObject};

pub const REPOSITORY_TYPE: &str = "Alias";
pub const REPOSITORY_TYPE_V1: &str = "Alias/v1";

const ATTR_ALIASES: &str = "ctxmgmt/credentials/repositories/aliases";

/// A declared alias
pub struct AliasEntry {
    name: String,
    spec: GenericRepositorySpec,
    creds: Option<Arc<dyn CredentialsSource>>,
    repository: Mutex<Option<Arc<dyn Repository>>>,
}

impl AliasEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &GenericRepositorySpec {
        &self.spec
    }

    /// The aliased repository, created on first use.
    ///
    /// `creds` are merged over the credentials declared with the alias.
    pub fn repository(
        &self,
        ctx: &CredentialsContext,
        creds: Option<&dyn Credentials>,
    ) -> ContextResult<Arc<dyn Repository>> {
        if let Some(repo) = self.cached()? {
            return Ok(repo);
        }

        let mut sources: Vec<Arc<dyn CredentialsSource>> = Vec::new();
        if let Some(c) = &self.creds {
            sources.push(Arc::clone(c));
        }
        if let Some(c) = creds {
            sources.push(Arc::new(DirectCredentials::copy_of(c)));
        }
        let repo = ctx.repository_for_spec_with(&self.spec, sources)?;

        let mut cached = self
            .repository
            .lock()
            .map_err(|_| ContextError::lock_poisoned())?;
        Ok(Arc::clone(cached.get_or_insert(repo)))
    }

    fn cached(&self) -> ContextResult<Option<Arc<dyn Repository>>> {
        let cached = self
            .repository
            .lock()
            .map_err(|_| ContextError::lock_poisoned())?;
        Ok(cached.clone())
    }
}

impl fmt::Debug for AliasEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliasEntry")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .finish()
    }
}

/// Aliases of an attribute store
#[derive(Default)]
struct AliasRegistry {
    aliases: RwLock<BTreeMap<String, Arc<AliasEntry>>>,
}

fn registry(ctx: &CredentialsContext) -> ContextResult<Arc<AliasRegistry>> {
    ctx.attributes()
        .get_or_create(ATTR_ALIASES, || Ok(AliasRegistry::default()))
}

/// Declare or replace an alias
pub fn set_alias(
    ctx: &CredentialsContext,
    name: &str,
    spec: &dyn RepositorySpec,
    creds: Option<Arc<dyn CredentialsSource>>,
) -> ContextResult<()> {
    let entry = AliasEntry {
        name: name.to_string(),
        spec: GenericRepositorySpec::from_spec(spec)?,
        creds,
        repository: Mutex::new(None),
    };
    let registry = registry(ctx)?;
    let mut aliases = registry
        .aliases
        .write()
        .map_err(|_| ContextError::lock_poisoned())?;
    aliases.insert(name.to_string(), Arc::new(entry));
    Ok(())
}

pub fn get_alias(ctx: &CredentialsContext, name: &str) -> ContextResult<Option<Arc<AliasEntry>>> {
    let registry = registry(ctx)?;
    let aliases = registry
        .aliases
        .read()
        .map_err(|_| ContextError::lock_poisoned())?;
    Ok(aliases.get(name).cloned())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasRepositorySpec {
    #[serde(rename = "type")]
    pub repository_type: String,
    #[serde(rename = "aliasName")]
    pub alias_name: String,
}

impl AliasRepositorySpec {
    pub fn new(alias_name: impl Into<String>) -> Self {
        Self {
            repository_type: REPOSITORY_TYPE.to_string(),
            alias_name: alias_name.into(),
        }
    }
}

impl VersionedTypedObject for AliasRepositorySpec {
    fn get_type(&self) -> &str {
        &self.repository_type
    }
}

impl RepositorySpec for AliasRepositorySpec {
    fn repository(
        &self,
        ctx: &CredentialsContext,
        creds: Option<&dyn Credentials>,
    ) -> ContextResult<Arc<dyn Repository>> {
        let alias = get_alias(ctx, &self.alias_name)?.ok_or_else(|| {
            ContextError::not_found_in(KIND_REPOSITORY, &self.alias_name, "aliases")
        })?;
        alias.repository(ctx, creds)
    }
}

pub fn register(scheme: &RepositoryTypeScheme) -> ContextResult<()> {
    scheme.register_type(
        ObjectType::new(REPOSITORY_TYPE, |s: AliasRepositorySpec| {
            Arc::new(s) as Arc<dyn RepositorySpec>
        })
        .with_description(
            "Repository declared as alias on the credentials context.\n\
             Fields: aliasName (name of the alias).",
        ),
        &[REPOSITORY_TYPE_V1],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::repositories::memory::MemoryRepositorySpec;
    use crate::credentials::repository::downcast_repository;
    use crate::credentials::repositories::memory::MemoryRepository;

    #[test]
    fn test_alias_resolves_to_memory_repository() {
        let ctx = CredentialsContext::builder().build().unwrap();
        let memory = ctx
            .repository_for_spec(&MemoryRepositorySpec::new("default"), None)
            .unwrap();
        memory
            .write_credentials("direct", &DirectCredentials::simple("USER", "PASSWORD"))
            .unwrap();

        ctx.set_alias("alias", &MemoryRepositorySpec::new("default"), None)
            .unwrap();
        let repo = ctx
            .repository_for_spec(&AliasRepositorySpec::new("alias"), None)
            .unwrap();
        let creds = repo.lookup_credentials("direct").unwrap();
        assert_eq!(creds.get_property("username").as_deref(), Some("USER"));
        assert_eq!(creds.get_property("password").as_deref(), Some("PASSWORD"));
        assert!(downcast_repository::<MemoryRepository>(&*repo).is_some());
    }

    #[test]
    fn test_alias_repository_kept() {
        let ctx = CredentialsContext::builder().build().unwrap();
        ctx.set_alias("a", &MemoryRepositorySpec::new("m"), None).unwrap();
        let entry = ctx.get_alias("a").unwrap().unwrap();
        let first = entry.repository(&ctx, None).unwrap();
        let second = entry.repository(&ctx, None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_alias() {
        let ctx = CredentialsContext::builder().build().unwrap();
        let err = ctx
            .repository_for_spec(&AliasRepositorySpec::new("none"), None)
            .unwrap_err();
        assert!(err.is_not_found_kind(KIND_REPOSITORY));
        assert!(ctx.get_alias("none").unwrap().is_none());
    }
}
