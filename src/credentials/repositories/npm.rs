//! Read-only repository over an npmrc file.
//!
//! `//<registry>/:_authToken=<token>` lines become credential sets named by
//! the registry (`host/path`) carrying the `token` property.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::credentials::consumers::npm;
use crate::credentials::context::CredentialsContext;
use crate::credentials::identity::ConsumerIdentity;
use crate::credentials::matcher::IdentityMatcher;
use crate::credentials::properties::Properties;
use crate::credentials::provider::{ConsumerMatch, ConsumerProvider};
use crate::credentials::repository::{Repository, RepositorySpec, RepositoryTypeScheme};
use crate::credentials::source::{CredentialStore, Credentials, CredentialsSource, LiveCredentials};
use crate::errors::{ContextError, ContextResult, KIND_CREDENTIALS};
use crate::runtime::{ObjectType, VersionedTypedObject};

pub const REPOSITORY_TYPE: &str = "NPMConfig";
pub const REPOSITORY_TYPE_V1: &str = "NPMConfig/v1";

pub const DEFAULT_CONFIG_FILE: &str = "~/.npmrc";

const PROVIDER: &str = "npmrc";
const ATTR_REPOS: &str = "ctxmgmt/credentials/repositories/npm";
const AUTH_TOKEN_SUFFIX: &str = ":_authToken";

/// Parse npmrc content into auth tokens keyed by registry
pub fn parse_npmrc(content: &str) -> BTreeMap<String, String> {
    let mut tokens = BTreeMap::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let Some(registry) = key
            .trim()
            .strip_prefix("//")
            .and_then(|k| k.strip_suffix(AUTH_TOKEN_SUFFIX))
        else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        tokens.insert(registry.trim_end_matches('/').to_string(), value.to_string());
    }
    tokens
}

fn token_properties(token: &str) -> Properties {
    let mut props = Properties::new();
    props.set(npm::ATTR_TOKEN, token);
    props
}

pub struct NpmConfigRepository {
    path: PathBuf,
    store: CredentialStore,
}

impl NpmConfigRepository {
    fn open(path: PathBuf) -> ContextResult<Self> {
        let repo = Self {
            path,
            store: Arc::new(RwLock::new(BTreeMap::new())),
        };
        repo.reload()?;
        Ok(repo)
    }

    /// Re-read the npmrc file
    pub fn reload(&self) -> ContextResult<()> {
        let data = super::read_file(&self.path)?;
        let content = String::from_utf8(data)
            .map_err(|_| ContextError::invalid(format!("npmrc {}: not utf-8", self.path.display())))?;
        let entries = parse_npmrc(&content)
            .into_iter()
            .map(|(registry, token)| (registry, token_properties(&token)))
            .collect();
        let mut store = self
            .store
            .write()
            .map_err(|_| ContextError::lock_poisoned())?;
        *store = entries;
        Ok(())
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl fmt::Debug for NpmConfigRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NpmConfigRepository({})", self.path.display())
    }
}

impl Repository for NpmConfigRepository {
    fn exists_credentials(&self, name: &str) -> ContextResult<bool> {
        let store = self
            .store
            .read()
            .map_err(|_| ContextError::lock_poisoned())?;
        Ok(store.contains_key(name))
    }

    fn lookup_credentials(&self, name: &str) -> ContextResult<Arc<dyn Credentials>> {
        if !self.exists_credentials(name)? {
            return Err(ContextError::not_found_in(KIND_CREDENTIALS, name, REPOSITORY_TYPE));
        }
        Ok(Arc::new(LiveCredentials::new(Arc::clone(&self.store), name)))
    }

    fn write_credentials(
        &self,
        _name: &str,
        _creds: &dyn Credentials,
    ) -> ContextResult<Arc<dyn Credentials>> {
        Err(ContextError::not_supported("write", KIND_CREDENTIALS, REPOSITORY_TYPE))
    }
}

/// Offers the registries of an npmrc file as NPM consumers
pub struct NpmConfigProvider {
    store: CredentialStore,
}

impl ConsumerProvider for NpmConfigProvider {
    fn best_match(
        &self,
        requested: &ConsumerIdentity,
        current: Option<&ConsumerIdentity>,
        matcher: &dyn IdentityMatcher,
    ) -> Option<ConsumerMatch> {
        let keys: Vec<String> = self.store.read().ok()?.keys().cloned().collect();
        let mut found: Option<ConsumerMatch> = None;
        for key in keys {
            let Ok(id) = npm::consumer_id(&format!("https://{}", key), "") else {
                continue;
            };
            let cur = found.as_ref().map(|(_, id)| id).or(current);
            if matcher.matches(requested, cur, &id) {
                let source = LiveCredentials::new(Arc::clone(&self.store), key);
                found = Some((Arc::new(source) as Arc<dyn CredentialsSource>, id));
            }
        }
        found
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpmConfigRepositorySpec {
    #[serde(rename = "type")]
    pub repository_type: String,
    #[serde(default, rename = "npmrcFile", skip_serializing_if = "String::is_empty")]
    pub npmrc_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagate_consumer_identity: Option<bool>,
}

impl NpmConfigRepositorySpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            repository_type: REPOSITORY_TYPE.to_string(),
            npmrc_file: path.into(),
            propagate_consumer_identity: None,
        }
    }

    pub fn with_consumer_propagation(mut self, propagate: bool) -> Self {
        self.propagate_consumer_identity = Some(propagate);
        self
    }
}

impl VersionedTypedObject for NpmConfigRepositorySpec {
    fn get_type(&self) -> &str {
        &self.repository_type
    }
}

impl RepositorySpec for NpmConfigRepositorySpec {
    fn repository(
        &self,
        ctx: &CredentialsContext,
        _creds: Option<&dyn Credentials>,
    ) -> ContextResult<Arc<dyn Repository>> {
        if self.npmrc_file.is_empty() {
            return Err(ContextError::invalid("npmrc path not provided"));
        }
        let path = super::resolve_path(&self.npmrc_file)?;
        let key = path.display().to_string();
        let propagate = self.propagate_consumer_identity.unwrap_or(true);
        let cache = super::cache::<NpmConfigRepository>(ctx, ATTR_REPOS)?;
        let repo = cache.get_or_create(&key, || {
            let repo = NpmConfigRepository::open(path).map_err(|e| {
                super::log_read_failed(ctx, REPOSITORY_TYPE, &key, &e);
                e
            })?;
            super::log_created(ctx, REPOSITORY_TYPE, &key);
            if propagate {
                ctx.register_consumer_provider(
                    &format!("{}/{}", PROVIDER, key),
                    Arc::new(NpmConfigProvider {
                        store: Arc::clone(&repo.store),
                    }),
                )?;
            }
            Ok(Arc::new(repo))
        })?;
        Ok(repo as Arc<dyn Repository>)
    }
}

pub fn register(scheme: &RepositoryTypeScheme) -> ContextResult<()> {
    scheme.register_type(
        ObjectType::new(REPOSITORY_TYPE, |s: NpmConfigRepositorySpec| {
            Arc::new(s) as Arc<dyn RepositorySpec>
        })
        .with_description(
            "Auth tokens read from an npmrc file, one set per registry.\n\
             Fields: npmrcFile (path, ~/ expanded), propagateConsumerIdentity\n\
             (offer entries as NPM consumers, default true).",
        ),
        &[REPOSITORY_TYPE_V1],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const NPMRC: &str = "\
# comment
registry=https://registry.npmjs.org/
//registry.npmjs.org/:_authToken=npm_TOKEN
//npm.acme.com/team/:_authToken=\"acme\"
";

    #[test]
    fn test_parse_npmrc() {
        let tokens = parse_npmrc(NPMRC);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens["registry.npmjs.org"], "npm_TOKEN");
        assert_eq!(tokens["npm.acme.com/team"], "acme");
    }

    #[test]
    fn test_repository_and_consumers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(NPMRC.as_bytes()).unwrap();

        let ctx = CredentialsContext::builder().build().unwrap();
        let spec = NpmConfigRepositorySpec::new(file.path().display().to_string());
        let repo = ctx.repository_for_spec(&spec, None).unwrap();
        let creds = repo.lookup_credentials("registry.npmjs.org").unwrap();
        assert_eq!(creds.get_property(npm::ATTR_TOKEN).as_deref(), Some("npm_TOKEN"));

        let id = npm::consumer_id("https://npm.acme.com/team", "pkg").unwrap();
        let creds = ctx.required_credentials_for_consumer(&id, None).unwrap();
        assert_eq!(creds.get_property(npm::ATTR_TOKEN).as_deref(), Some("acme"));
    }

    #[test]
    fn test_missing_path() {
        let ctx = CredentialsContext::builder().build().unwrap();
        let err = ctx
            .repository_for_spec(&NpmConfigRepositorySpec::new(""), None)
            .unwrap_err();
        assert!(err.is_invalid());

        let dir = tempfile::tempdir().unwrap();
        let spec = NpmConfigRepositorySpec::new(dir.path().join("none").display().to_string());
        assert!(ctx.repository_for_spec(&spec, None).is_err());
    }
}
