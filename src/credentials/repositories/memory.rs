//! In-memory credential repositories, shared by name within an attribute store

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigContext, ConfigTypeScheme};
use crate::credentials::context::CredentialsContext;
use crate::credentials::properties::Properties;
use crate::credentials::repository::{
    CredentialsSpec, Repository, RepositorySpec, RepositoryTypeScheme,
};
use crate::credentials::source::{CredentialStore, Credentials, DirectCredentials, LiveCredentials};
use crate::errors::{ContextError, ContextResult, ErrorList, KIND_CREDENTIALS};
use crate::runtime::{ObjectType, VersionedTypedObject};

pub const REPOSITORY_TYPE: &str = "Memory";
pub const REPOSITORY_TYPE_V1: &str = "Memory/v1";

pub const CONFIG_TYPE: &str = "memory.credentials.config";
pub const CONFIG_TYPE_V1: &str = "memory.credentials.config/v1";

const ATTR_REPOS: &str = "ctxmgmt/credentials/repositories/memory";

/// Named in-memory credential store
pub struct MemoryRepository {
    name: String,
    store: CredentialStore,
}

impl MemoryRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the stored credential sets
    pub fn names(&self) -> Vec<String> {
        self.store
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for MemoryRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryRepository({})", self.name)
    }
}

impl Repository for MemoryRepository {
    fn exists_credentials(&self, name: &str) -> ContextResult<bool> {
        let store = self
            .store
            .read()
            .map_err(|_| ContextError::lock_poisoned())?;
        Ok(store.contains_key(name))
    }

    fn lookup_credentials(&self, name: &str) -> ContextResult<Arc<dyn Credentials>> {
        if !self.exists_credentials(name)? {
            return Err(ContextError::not_found_in(
                KIND_CREDENTIALS,
                name,
                format!("memory repository {:?}", self.name),
            ));
        }
        Ok(Arc::new(LiveCredentials::new(Arc::clone(&self.store), name)))
    }

    fn write_credentials(
        &self,
        name: &str,
        creds: &dyn Credentials,
    ) -> ContextResult<Arc<dyn Credentials>> {
        let props = creds.properties();
        {
            let mut store = self
                .store
                .write()
                .map_err(|_| ContextError::lock_poisoned())?;
            store.insert(name.to_string(), props.clone());
        }
        Ok(Arc::new(DirectCredentials::new(props)))
    }
}

/// The memory repository of the given name, created on first use
pub fn repository(ctx: &CredentialsContext, name: &str) -> ContextResult<Arc<MemoryRepository>> {
    let cache = super::cache::<MemoryRepository>(ctx, ATTR_REPOS)?;
    cache.get_or_create(name, || {
        super::log_created(ctx, REPOSITORY_TYPE, name);
        Ok(Arc::new(MemoryRepository::new(name)))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRepositorySpec {
    #[serde(rename = "type")]
    pub repository_type: String,
    #[serde(rename = "repoName")]
    pub repository_name: String,
}

impl MemoryRepositorySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            repository_type: REPOSITORY_TYPE.to_string(),
            repository_name: name.into(),
        }
    }
}

impl VersionedTypedObject for MemoryRepositorySpec {
    fn get_type(&self) -> &str {
        &self.repository_type
    }
}

impl RepositorySpec for MemoryRepositorySpec {
    fn repository(
        &self,
        ctx: &CredentialsContext,
        _creds: Option<&dyn Credentials>,
    ) -> ContextResult<Arc<dyn Repository>> {
        Ok(repository(ctx, &self.repository_name)? as Arc<dyn Repository>)
    }
}

/// Credential set of a memory credentials config: either direct
/// properties or a reference to credentials of another repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryCredentialsEntry {
    pub credentials_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<CredentialsSpec>,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub credentials: Properties,
}

/// Config filling a memory repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryCredentialsConfig {
    #[serde(rename = "type")]
    pub config_type: String,
    pub repo_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<MemoryCredentialsEntry>,
}

impl MemoryCredentialsConfig {
    pub fn new(repo_name: impl Into<String>) -> Self {
        Self {
            config_type: CONFIG_TYPE.to_string(),
            repo_name: repo_name.into(),
            credentials: Vec::new(),
        }
    }

    pub fn add_credentials(&mut self, name: impl Into<String>, props: Properties) {
        self.credentials.push(MemoryCredentialsEntry {
            credentials_name: name.into(),
            reference: None,
            credentials: props,
        });
    }

    pub fn add_credentials_ref(&mut self, name: impl Into<String>, reference: CredentialsSpec) {
        self.credentials.push(MemoryCredentialsEntry {
            credentials_name: name.into(),
            reference: Some(reference),
            credentials: Properties::new(),
        });
    }
}

impl VersionedTypedObject for MemoryCredentialsConfig {
    fn get_type(&self) -> &str {
        &self.config_type
    }
}

impl Config for MemoryCredentialsConfig {
    fn apply_to(&self, _ctx: &ConfigContext, target: &dyn Any) -> ContextResult<()> {
        let target = target
            .downcast_ref::<CredentialsContext>()
            .ok_or_else(|| ContextError::no_context(CONFIG_TYPE))?;
        let repo = target.repository_for_spec(&MemoryRepositorySpec::new(&self.repo_name), None)?;

        let mut errors = ErrorList::new("applying config");
        for (i, entry) in self.credentials.iter().enumerate() {
            let creds: ContextResult<Arc<dyn Credentials>> = match &entry.reference {
                Some(_) if !entry.credentials.is_empty() => Err(ContextError::invalid(
                    "memory credentials: credentials and reference set",
                )),
                Some(reference) => target.credentials_for_spec(reference),
                None => Ok(Arc::new(DirectCredentials::new(entry.credentials.clone()))),
            };
            let written = creds.and_then(|c| repo.write_credentials(&entry.credentials_name, &*c));
            errors.add(written.map_err(|e| {
                e.wrap(format!("config entry {}[{}]", i, entry.credentials_name))
            }));
        }
        errors.result()
    }
}

pub fn register(scheme: &RepositoryTypeScheme) -> ContextResult<()> {
    scheme.register_type(
        ObjectType::new(REPOSITORY_TYPE, |s: MemoryRepositorySpec| {
            Arc::new(s) as Arc<dyn RepositorySpec>
        })
        .with_description(
            "Credential repository held in memory, shared by name.\n\
             Fields: repoName (name of the repository).",
        ),
        &[REPOSITORY_TYPE_V1],
    )
}

pub fn register_config(scheme: &ConfigTypeScheme) -> ContextResult<()> {
    scheme.register_type(
        ObjectType::new(CONFIG_TYPE, |c: MemoryCredentialsConfig| Arc::new(c) as Arc<dyn Config>)
            .with_description(
                "Credentials stored in a memory repository.\n\
                 Fields: repoName, credentials (list of credentialsName with either\n\
                 credentials (direct properties) or reference (credentials spec)).",
            ),
        &[CONFIG_TYPE_V1],
    )
}
