//! # Credentials Config
//!
//! Config type declaring repositories, aliases and consumer bindings for
//! credentials contexts.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::CredentialsContext;
use super::identity::ConsumerIdentity;
use super::repository::{CredentialsSpec, GenericRepositorySpec, RepositorySpec};
use super::source::{CredentialsChain, CredentialsSource};
use crate::config::{Config, ConfigContext, ConfigTypeScheme};
use crate::errors::{ContextError, ContextResult, ErrorList, ResultExt};
use crate::runtime::{ObjectType, VersionedTypedObject};

pub const CONFIG_TYPE: &str = "credentials.config";
pub const CONFIG_TYPE_V1: &str = "credentials.config/v1";

/// Repository specification with the credentials used to access it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    pub repository: GenericRepositorySpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<CredentialsSpec>,
}

impl RepositoryEntry {
    pub fn new(repository: &dyn RepositorySpec, credentials: Vec<CredentialsSpec>) -> ContextResult<Self> {
        Ok(Self {
            repository: GenericRepositorySpec::from_spec(repository)?,
            credentials,
        })
    }

    fn sources(&self) -> Vec<Arc<dyn CredentialsSource>> {
        sources(&self.credentials)
    }
}

/// Credentials bound to a consumer identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerEntry {
    pub identity: ConsumerIdentity,
    pub credentials: Vec<CredentialsSpec>,
}

fn sources(specs: &[CredentialsSpec]) -> Vec<Arc<dyn CredentialsSource>> {
    specs
        .iter()
        .map(|s| Arc::new(s.clone()) as Arc<dyn CredentialsSource>)
        .collect()
}

/// A single source as is, several merged in order
fn combined(mut sources: Vec<Arc<dyn CredentialsSource>>) -> Option<Arc<dyn CredentialsSource>> {
    match sources.len() {
        0 => None,
        1 => sources.pop(),
        _ => Some(Arc::new(CredentialsChain::new(sources))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(rename = "type")]
    pub config_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumers: Vec<ConsumerEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositoryEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, RepositoryEntry>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialsConfig {
    pub fn new() -> Self {
        Self {
            config_type: CONFIG_TYPE.to_string(),
            consumers: Vec::new(),
            repositories: Vec::new(),
            aliases: BTreeMap::new(),
        }
    }

    pub fn add_consumer(&mut self, identity: ConsumerIdentity, credentials: Vec<CredentialsSpec>) {
        self.consumers.push(ConsumerEntry {
            identity,
            credentials,
        });
    }

    pub fn add_repository(
        &mut self,
        repository: &dyn RepositorySpec,
        credentials: Vec<CredentialsSpec>,
    ) -> ContextResult<()> {
        self.repositories
            .push(RepositoryEntry::new(repository, credentials)?);
        Ok(())
    }

    pub fn add_alias(
        &mut self,
        name: impl Into<String>,
        repository: &dyn RepositorySpec,
        credentials: Vec<CredentialsSpec>,
    ) -> ContextResult<()> {
        self.aliases
            .insert(name.into(), RepositoryEntry::new(repository, credentials)?);
        Ok(())
    }
}

impl VersionedTypedObject for CredentialsConfig {
    fn get_type(&self) -> &str {
        &self.config_type
    }
}

impl Config for CredentialsConfig {
    fn apply_to(&self, _ctx: &ConfigContext, target: &dyn Any) -> ContextResult<()> {
        let target = target
            .downcast_ref::<CredentialsContext>()
            .ok_or_else(|| ContextError::no_context(CONFIG_TYPE))?;

        let mut errors = ErrorList::new("applying credentials config");
        for (i, entry) in self.repositories.iter().enumerate() {
            errors.add(
                target
                    .repository_for_spec_with(&entry.repository, entry.sources())
                    .context(|| format!("repository entry {}", i)),
            );
        }
        for (name, entry) in &self.aliases {
            errors.add(
                target
                    .set_alias(name, &entry.repository, combined(entry.sources()))
                    .context(|| format!("alias {:?}", name)),
            );
        }
        for (i, entry) in self.consumers.iter().enumerate() {
            let result = match combined(sources(&entry.credentials)) {
                Some(source) => target.set_credentials_for_consumer(entry.identity.clone(), source),
                None => Err(ContextError::invalid("consumer entry without credentials")),
            };
            errors.add(result.context(|| format!("consumer entry {}", i)));
        }
        errors.result()
    }
}

pub fn register(scheme: &ConfigTypeScheme) -> ContextResult<()> {
    scheme.register_type(
        ObjectType::new(CONFIG_TYPE, |c: CredentialsConfig| Arc::new(c) as Arc<dyn Config>)
            .with_description(
                "Credential settings for credentials contexts.\n\
                 Fields: repositories (repository specs to load, with access\n\
                 credentials), aliases (named repository specs with credentials),\n\
                 consumers (identity plus list of credential specs; several\n\
                 specs are merged in order).",
            ),
        &[CONFIG_TYPE_V1],
    )
}
