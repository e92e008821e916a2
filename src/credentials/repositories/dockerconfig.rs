//! Read-only repository over a docker config file.
//!
//! Every entry of `auths` becomes a credential set named by its registry
//! key. With consumer propagation enabled, the entries are also offered
//! as OCI registry consumers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credentials::consumers::{oci, Locator};
use crate::credentials::context::CredentialsContext;
use crate::credentials::identity::ConsumerIdentity;
use crate::credentials::matcher::IdentityMatcher;
use crate::credentials::properties::{
    Properties, ATTR_IDENTITY_TOKEN, ATTR_PASSWORD, ATTR_SERVER_ADDRESS, ATTR_USERNAME,
};
use crate::credentials::provider::{ConsumerMatch, ConsumerProvider};
use crate::credentials::repository::{Repository, RepositorySpec, RepositoryTypeScheme};
use crate::credentials::source::{CredentialStore, Credentials, CredentialsSource, LiveCredentials};
use crate::errors::{ContextError, ContextResult, KIND_CREDENTIALS};
use crate::runtime::{ObjectType, VersionedTypedObject};

pub const REPOSITORY_TYPE: &str = "DockerConfig";
pub const REPOSITORY_TYPE_V1: &str = "DockerConfig/v1";

pub const DEFAULT_CONFIG_FILE: &str = "~/.docker/config.json";

/// Credential property holding the raw `auth` field
pub const ATTR_AUTH: &str = "auth";
pub const ATTR_REGISTRY_TOKEN: &str = "registryToken";

const PROVIDER: &str = "dockerconfig";
const ATTR_REPOS: &str = "ctxmgmt/credentials/repositories/dockerconfig";

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    auths: BTreeMap<String, AuthConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthConfig {
    #[serde(default)]
    auth: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default, rename = "serveraddress")]
    server_address: String,
    #[serde(default, rename = "identitytoken")]
    identity_token: String,
    #[serde(default, rename = "registrytoken")]
    registry_token: String,
}

fn norm(s: &str) -> &str {
    s.trim_end_matches('\n')
}

impl AuthConfig {
    fn properties(&self, key: &str) -> ContextResult<Properties> {
        let (mut username, mut password) = (self.username.clone(), self.password.clone());
        if !self.auth.is_empty() {
            let decoded = STANDARD
                .decode(self.auth.trim())
                .map_err(|e| ContextError::invalid(format!("docker auth for {:?}: {}", key, e)))?;
            let decoded = String::from_utf8(decoded)
                .map_err(|_| ContextError::invalid(format!("docker auth for {:?}: not utf-8", key)))?;
            let (u, p) = decoded.split_once(':').ok_or_else(|| {
                ContextError::invalid(format!("docker auth for {:?}: expected user:password", key))
            })?;
            username = u.to_string();
            password = p.to_string();
        }

        let mut props = Properties::new();
        props.set_non_empty(ATTR_USERNAME, norm(&username));
        props.set_non_empty(ATTR_PASSWORD, norm(&password));
        props.set_non_empty(ATTR_AUTH, self.auth.as_str());
        props.set_non_empty(ATTR_SERVER_ADDRESS, norm(&self.server_address));
        props.set_non_empty(ATTR_IDENTITY_TOKEN, norm(&self.identity_token));
        props.set_non_empty(ATTR_REGISTRY_TOKEN, norm(&self.registry_token));
        Ok(props)
    }
}

/// Parse docker config data into credential sets keyed by registry
pub fn parse_config(data: &[u8]) -> ContextResult<BTreeMap<String, Properties>> {
    let cfg: ConfigFile = if data.iter().all(u8::is_ascii_whitespace) {
        ConfigFile::default()
    } else {
        serde_json::from_slice(data)?
    };
    cfg.auths
        .iter()
        .map(|(key, auth)| -> ContextResult<(String, Properties)> {
            Ok((key.clone(), auth.properties(key)?))
        })
        .collect()
}

/// OCI registry identity for a registry key of the `auths` section
pub fn registry_identity(key: &str) -> ConsumerIdentity {
    let mut l = Locator::parse(key);
    if l.path == "v1" || l.path == "v2" {
        l.path.clear();
    }
    if l.host == "index.docker.io" {
        l.host = "docker.io".to_string();
    }
    let mut id = ConsumerIdentity::new(oci::CONSUMER_TYPE);
    id.set(oci::ID_HOSTNAME, l.host);
    id.set(oci::ID_PORT, l.port);
    id.set(oci::ID_PATHPREFIX, l.path);
    id
}

#[derive(Debug, Clone)]
enum ConfigSource {
    File(PathBuf),
    Data(Vec<u8>),
}

pub struct DockerConfigRepository {
    source: ConfigSource,
    store: CredentialStore,
}

impl DockerConfigRepository {
    fn open(source: ConfigSource) -> ContextResult<Self> {
        let repo = Self {
            source,
            store: Arc::new(RwLock::new(BTreeMap::new())),
        };
        repo.reload()?;
        Ok(repo)
    }

    /// Re-read the config; credentials handed out before follow the new content
    pub fn reload(&self) -> ContextResult<()> {
        let entries = match &self.source {
            ConfigSource::File(path) => parse_config(&super::read_file(path)?)?,
            ConfigSource::Data(data) => parse_config(data)?,
        };
        let mut store = self
            .store
            .write()
            .map_err(|_| ContextError::lock_poisoned())?;
        *store = entries;
        Ok(())
    }

    /// Registry keys of all credential sets
    pub fn names(&self) -> Vec<String> {
        self.store
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for DockerConfigRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigSource::File(p) => write!(f, "DockerConfigRepository({})", p.display()),
            ConfigSource::Data(_) => write!(f, "DockerConfigRepository(<data>)"),
        }
    }
}

impl Repository for DockerConfigRepository {
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

/// Offers the entries of a docker config as OCI registry consumers
pub struct DockerConfigProvider {
    store: CredentialStore,
}

impl ConsumerProvider for DockerConfigProvider {
    fn best_match(
        &self,
        requested: &ConsumerIdentity,
        current: Option<&ConsumerIdentity>,
        matcher: &dyn IdentityMatcher,
    ) -> Option<ConsumerMatch> {
        let keys: Vec<String> = self.store.read().ok()?.keys().cloned().collect();
        let mut found: Option<ConsumerMatch> = None;
        for key in keys {
            let id = registry_identity(&key);
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
pub struct DockerConfigRepositorySpec {
    #[serde(rename = "type")]
    pub repository_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_config_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagate_consumer_identity: Option<bool>,
}

impl DockerConfigRepositorySpec {
    /// Spec for a config file; an empty path selects the default file
    pub fn new(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if path.is_empty() {
            path = DEFAULT_CONFIG_FILE.to_string();
        }
        Self {
            repository_type: REPOSITORY_TYPE.to_string(),
            docker_config_file: path,
            docker_config: None,
            propagate_consumer_identity: None,
        }
    }

    /// Spec for inline config data
    pub fn for_config(config: Value) -> Self {
        Self {
            repository_type: REPOSITORY_TYPE.to_string(),
            docker_config_file: String::new(),
            docker_config: Some(config),
            propagate_consumer_identity: None,
        }
    }

    pub fn with_consumer_propagation(mut self, propagate: bool) -> Self {
        self.propagate_consumer_identity = Some(propagate);
        self
    }

    fn source(&self) -> ContextResult<(String, ConfigSource)> {
        match (&self.docker_config_file, &self.docker_config) {
            (f, Some(_)) if !f.is_empty() => Err(ContextError::invalid(
                "docker config: only config file or config data possible",
            )),
            (_, Some(data)) => {
                let data = serde_json::to_vec(data)?;
                Ok((super::data_key(&data), ConfigSource::Data(data)))
            }
            (f, None) if !f.is_empty() => {
                let path = super::resolve_path(f)?;
                Ok((path.display().to_string(), ConfigSource::File(path)))
            }
            _ => Err(ContextError::invalid("docker config: config file or data required")),
        }
    }
}

impl VersionedTypedObject for DockerConfigRepositorySpec {
    fn get_type(&self) -> &str {
        &self.repository_type
    }
}

impl RepositorySpec for DockerConfigRepositorySpec {
    fn repository(
        &self,
        ctx: &CredentialsContext,
        _creds: Option<&dyn Credentials>,
    ) -> ContextResult<Arc<dyn Repository>> {
        let (key, source) = self.source()?;
        let propagate = self.propagate_consumer_identity.unwrap_or(true);
        let cache = super::cache::<DockerConfigRepository>(ctx, ATTR_REPOS)?;
        let repo = cache.get_or_create(&key, || {
            let repo = DockerConfigRepository::open(source).map_err(|e| {
                super::log_read_failed(ctx, REPOSITORY_TYPE, &key, &e);
                e
            })?;
            super::log_created(ctx, REPOSITORY_TYPE, &key);
            if propagate {
                ctx.register_consumer_provider(
                    &format!("{}/{}", PROVIDER, key),
                    Arc::new(DockerConfigProvider {
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
        ObjectType::new(REPOSITORY_TYPE, |s: DockerConfigRepositorySpec| {
            Arc::new(s) as Arc<dyn RepositorySpec>
        })
        .with_description(
            "Credentials read from a docker config file, one set per registry.\n\
             Fields: dockerConfigFile (path, ~/ expanded) or dockerConfig (inline\n\
             config), propagateConsumerIdentity (offer entries as OCIRegistry\n\
             consumers, default true).",
        ),
        &[REPOSITORY_TYPE_V1],
    )
}
