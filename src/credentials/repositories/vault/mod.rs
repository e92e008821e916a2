//! Read-only repository over secrets of a HashiCorp Vault server.
//!
//! Every secret becomes a credential set named by its path below the
//! configured path. Secret metadata may name further secrets to read
//! (`secrets`) and the consumer identity the secret serves (`consumerId`,
//! or the metadata itself if it has a `type`).

pub mod auth;
pub mod client;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

pub use auth::{auth_methods, AuthMethod, AuthMethods};
pub use client::{register_client, InMemoryVaultServer, VaultClient, VaultSecret};

use crate::credentials::consumers::{join_path, vault as consumer};
use crate::credentials::context::CredentialsContext;
use crate::credentials::identity::{ConsumerIdentity, ID_TYPE};
use crate::credentials::matcher::IdentityMatcher;
use crate::credentials::provider::{ConsumerMatch, ConsumerProvider};
use crate::credentials::repository::{Repository, RepositorySpec, RepositoryTypeScheme};
use crate::credentials::source::{
    CredentialStore, Credentials, CredentialsSource, DirectCredentials, LiveCredentials,
};
use crate::errors::{ContextError, ContextResult, KIND_CONSUMER, KIND_CREDENTIALS};
use crate::runtime::{ObjectType, VersionedTypedObject};

pub const REPOSITORY_TYPE: &str = "HashiCorpVault";
pub const REPOSITORY_TYPE_V1: &str = "HashiCorpVault/v1";

const PROVIDER: &str = "vault";
const ATTR_REPOS: &str = "ctxmgmt/credentials/repositories/vault";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultRepositorySpec {
    #[serde(rename = "type")]
    pub repository_type: String,
    #[serde(rename = "serverURL")]
    pub server_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagate_consumer_identity: Option<bool>,
}

impl VaultRepositorySpec {
    pub fn new(server_url: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            repository_type: REPOSITORY_TYPE.to_string(),
            server_url: server_url.into(),
            namespace: String::new(),
            mount_path: mount_path.into(),
            path: String::new(),
            secrets: Vec::new(),
            propagate_consumer_identity: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_secrets(mut self, secrets: &[&str]) -> Self {
        self.secrets = secrets.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_consumer_propagation(mut self, propagate: bool) -> Self {
        self.propagate_consumer_identity = Some(propagate);
        self
    }

    /// Identity under which access credentials for the server are looked up
    pub fn consumer_id(&self) -> ContextResult<ConsumerIdentity> {
        consumer::consumer_id(&self.server_url, &self.namespace, &self.mount_path, &self.path)
    }

    fn key(&self) -> ContextResult<String> {
        Ok(super::data_key(&serde_json::to_vec(self)?))
    }
}

impl VersionedTypedObject for VaultRepositorySpec {
    fn get_type(&self) -> &str {
        &self.repository_type
    }
}

/// Identity a secret serves, taken from its metadata
fn secret_identity(metadata: &BTreeMap<String, String>) -> ContextResult<Option<ConsumerIdentity>> {
    if let Some(id) = metadata.get(client::META_CONSUMER_ID) {
        let id: ConsumerIdentity = serde_json::from_str(id)?;
        id.validate()?;
        return Ok(Some(id));
    }
    if metadata.contains_key(ID_TYPE) {
        let id: ConsumerIdentity = metadata
            .iter()
            .filter(|(k, _)| k.as_str() != client::META_SECRETS)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        return Ok(Some(id));
    }
    Ok(None)
}

/// Secrets read from the server and the identities they serve
#[derive(Default)]
struct Secrets {
    store: CredentialStore,
    consumers: RwLock<Vec<(ConsumerIdentity, String)>>,
}

pub struct VaultRepository {
    spec: VaultRepositorySpec,
    client: Arc<dyn VaultClient>,
    access: DirectCredentials,
    secrets: Arc<Secrets>,
}

impl VaultRepository {
    fn open(
        spec: VaultRepositorySpec,
        client: Arc<dyn VaultClient>,
        access: DirectCredentials,
    ) -> ContextResult<Self> {
        let repo = Self {
            spec,
            client,
            access,
            secrets: Arc::new(Secrets::default()),
        };
        repo.reload()?;
        Ok(repo)
    }

    /// Re-read all secrets from the server
    pub fn reload(&self) -> ContextResult<()> {
        let method = auth_methods().select(&self.access)?;
        let token = method.token(&*self.client, &self.spec.namespace, &self.access)?;
        let (ns, mount) = (&self.spec.namespace, &self.spec.mount_path);

        let mut queue: VecDeque<String> = if self.spec.secrets.is_empty() {
            self.client.list_secrets(&token, ns, mount, &self.spec.path)?.into()
        } else {
            self.spec.secrets.iter().cloned().collect()
        };

        let mut seen = BTreeSet::new();
        let mut entries = BTreeMap::new();
        let mut consumers = Vec::new();
        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let path = join_path(&[&self.spec.path, &name]);
            let secret = self.client.read_secret(&token, ns, mount, &path)?;
            if let Some(more) = secret.metadata.get(client::META_SECRETS) {
                queue.extend(
                    more.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
            }
            if let Some(id) = secret_identity(&secret.metadata)? {
                consumers.push((id, name.clone()));
            }
            entries.insert(name, secret.data);
        }

        *self
            .secrets
            .store
            .write()
            .map_err(|_| ContextError::lock_poisoned())? = entries;
        *self
            .secrets
            .consumers
            .write()
            .map_err(|_| ContextError::lock_poisoned())? = consumers;
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.secrets
            .store
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for VaultRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VaultRepository({} {}/{})",
            self.spec.server_url, self.spec.mount_path, self.spec.path
        )
    }
}

impl Repository for VaultRepository {
    fn exists_credentials(&self, name: &str) -> ContextResult<bool> {
        let store = self
            .secrets
            .store
            .read()
            .map_err(|_| ContextError::lock_poisoned())?;
        Ok(store.contains_key(name))
    }

    fn lookup_credentials(&self, name: &str) -> ContextResult<Arc<dyn Credentials>> {
        if !self.exists_credentials(name)? {
            return Err(ContextError::not_found_in(KIND_CREDENTIALS, name, REPOSITORY_TYPE));
        }
        Ok(Arc::new(LiveCredentials::new(
            Arc::clone(&self.secrets.store),
            name,
        )))
    }

    fn write_credentials(
        &self,
        _name: &str,
        _creds: &dyn Credentials,
    ) -> ContextResult<Arc<dyn Credentials>> {
        Err(ContextError::not_supported("write", KIND_CREDENTIALS, REPOSITORY_TYPE))
    }
}

/// Offers secrets carrying a consumer identity as consumers
struct VaultProvider {
    secrets: Arc<Secrets>,
}

impl ConsumerProvider for VaultProvider {
    fn best_match(
        &self,
        requested: &ConsumerIdentity,
        current: Option<&ConsumerIdentity>,
        matcher: &dyn IdentityMatcher,
    ) -> Option<ConsumerMatch> {
        let consumers = self.secrets.consumers.read().ok()?;
        let mut found: Option<ConsumerMatch> = None;
        for (id, name) in consumers.iter() {
            let cur = found.as_ref().map(|(_, id)| id).or(current);
            if matcher.matches(requested, cur, id) {
                let source = LiveCredentials::new(Arc::clone(&self.secrets.store), name.clone());
                found = Some((Arc::new(source) as Arc<dyn CredentialsSource>, id.clone()));
            }
        }
        found
    }
}

impl RepositorySpec for VaultRepositorySpec {
    fn repository(
        &self,
        ctx: &CredentialsContext,
        creds: Option<&dyn Credentials>,
    ) -> ContextResult<Arc<dyn Repository>> {
        if self.server_url.is_empty() {
            return Err(ContextError::invalid("server url"));
        }
        let key = self.key()?;
        let cache = super::cache::<VaultRepository>(ctx, ATTR_REPOS)?;
        if let Some(repo) = cache.get(&key) {
            return Ok(repo as Arc<dyn Repository>);
        }

        // resolved outside the cache lock: lookups may create other repositories
        let access = match creds {
            Some(c) => DirectCredentials::copy_of(c),
            None => {
                let id = self.consumer_id()?;
                let found = ctx.credentials_for_consumer(&id, None)?.ok_or_else(|| {
                    ContextError::not_found_in(KIND_CONSUMER, id.to_string(), "vault access credentials")
                })?;
                DirectCredentials::copy_of(&*found)
            }
        };
        let client = client::client_for(ctx, &self.server_url)?;

        let repo = cache.get_or_create(&key, || {
            let repo = VaultRepository::open(self.clone(), client, access).map_err(|e| {
                super::log_read_failed(ctx, REPOSITORY_TYPE, &self.server_url, &e);
                e
            })?;
            super::log_created(ctx, REPOSITORY_TYPE, &self.server_url);
            if self.propagate_consumer_identity.unwrap_or(true) {
                ctx.register_consumer_provider(
                    &format!("{}/{}", PROVIDER, key),
                    Arc::new(VaultProvider {
                        secrets: Arc::clone(&repo.secrets),
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
        ObjectType::new(REPOSITORY_TYPE, |s: VaultRepositorySpec| {
            Arc::new(s) as Arc<dyn RepositorySpec>
        })
        .with_description(
            "Credentials read from secrets of a HashiCorp Vault server.\n\
             Fields: serverURL (required), namespace, mountPath, path, secrets\n\
             (secret names, default: all below path), propagateConsumerIdentity\n\
             (offer secrets with a consumer identity, default true).\n\
             Access credentials are given explicitly or looked up for the\n\
             HashiCorpVault consumer of the server; authmeth selects approle\n\
             (roleid, secretid) or token (token).",
        ),
        &[REPOSITORY_TYPE_V1],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::consumers::oci;
    use crate::credentials::properties::Properties;

    const SERVER: &str = "https://vault.acme.com:8200";

    fn setup() -> Arc<CredentialsContext> {
        let server = InMemoryVaultServer::new();
        server.add_approle("role", "secret", "tok");
        server.set_secret(
            "",
            "secret",
            "ci/registry",
            VaultSecret {
                data: Properties::from([("username", "ci"), ("password", "pw")]),
                metadata: BTreeMap::from([
                    (
                        client::META_CONSUMER_ID.to_string(),
                        r#"{"type":"OCIRegistry","hostname":"ghcr.io"}"#.to_string(),
                    ),
                    (client::META_SECRETS.to_string(), "npm".to_string()),
                ]),
            },
        );
        server.set_secret(
            "",
            "secret",
            "ci/npm",
            VaultSecret {
                data: Properties::from([("token", "npm")]),
                metadata: BTreeMap::new(),
            },
        );

        let ctx = CredentialsContext::builder().build().unwrap();
        register_client(&ctx, SERVER, Arc::new(server)).unwrap();
        ctx
    }

    fn approle() -> Properties {
        Properties::from([
            (consumer::ATTR_AUTHMETH, consumer::AUTH_APPROLE),
            (consumer::ATTR_ROLEID, "role"),
            (consumer::ATTR_SECRETID, "secret"),
        ])
    }

    #[test]
    fn test_reads_secrets_with_access_from_consumer() {
        let ctx = setup();
        let spec = VaultRepositorySpec::new(SERVER, "secret")
            .with_path("ci")
            .with_secrets(&["registry"]);
        ctx.set_credentials_for_consumer(
            consumer::consumer_id(SERVER, "", "secret", "").unwrap(),
            Arc::new(DirectCredentials::new(approle())),
        )
        .unwrap();

        let repo = ctx.repository_for_spec(&spec, None).unwrap();
        let creds = repo.lookup_credentials("registry").unwrap();
        assert_eq!(creds.get_property("username").as_deref(), Some("ci"));
        assert!(repo.exists_credentials("npm").unwrap());

        let creds = ctx
            .required_credentials_for_consumer(&oci::consumer_id("ghcr.io", "app"), None)
            .unwrap();
        assert_eq!(creds.get_property("password").as_deref(), Some("pw"));
    }

    #[test]
    fn test_lists_secrets_with_explicit_access() {
        let ctx = setup();
        let spec = VaultRepositorySpec::new(SERVER, "secret").with_path("ci");
        let access = DirectCredentials::new(approle());
        let repo = spec.repository(&ctx, Some(&access)).unwrap();
        assert!(repo.exists_credentials("registry").unwrap());
        assert!(repo
            .write_credentials("x", &access)
            .unwrap_err()
            .is_not_supported());
    }

    #[test]
    fn test_server_url_required() {
        let ctx = setup();
        let spec = VaultRepositorySpec::new("", "secret");
        assert!(ctx.repository_for_spec(&spec, None).unwrap_err().is_invalid());
    }

    #[test]
    fn test_missing_access_credentials() {
        let ctx = setup();
        let spec = VaultRepositorySpec::new(SERVER, "secret");
        let err = ctx.repository_for_spec(&spec, None).unwrap_err();
        assert!(err.is_not_found_kind(KIND_CONSUMER));
    }

    #[test]
    fn test_wire_format() {
        let spec: VaultRepositorySpec = serde_json::from_str(
            r#"{"type":"HashiCorpVault","serverURL":"https://v","mountPath":"secret","secrets":["a"]}"#,
        )
        .unwrap();
        assert_eq!(spec.server_url, "https://v");
        assert_eq!(spec.mount_path, "secret");
        assert_eq!(spec.secrets, vec!["a"]);
    }
}
