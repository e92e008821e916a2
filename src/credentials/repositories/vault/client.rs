//! Vault server access.
//!
//! The repository never talks to a server itself. Clients are registered
//! per server URL on the attribute store of a context.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use crate::credentials::context::CredentialsContext;
use crate::credentials::properties::Properties;
use crate::errors::{ContextError, ContextResult};

const ATTR_CLIENTS: &str = "ctxmgmt/credentials/repositories/vault/clients";

/// Kind used for missing vault clients and secrets
pub const KIND_VAULT_CLIENT: &str = "vault client";
pub const KIND_SECRET: &str = "vault secret";

/// Secret metadata listing further secrets to read
pub const META_SECRETS: &str = "secrets";
/// Secret metadata holding a JSON consumer identity
pub const META_CONSUMER_ID: &str = "consumerId";

/// A secret: its data are the credential properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VaultSecret {
    pub data: Properties,
    pub metadata: BTreeMap<String, String>,
}

/// Operations of a vault server used by the repository
pub trait VaultClient: Send + Sync {
    /// Exchange app role credentials for a client token
    fn approle_login(&self, namespace: &str, role_id: &str, secret_id: &str) -> ContextResult<String>;

    /// Names of the secrets directly below `path`
    fn list_secrets(
        &self,
        token: &str,
        namespace: &str,
        mount_path: &str,
        path: &str,
    ) -> ContextResult<Vec<String>>;

    fn read_secret(
        &self,
        token: &str,
        namespace: &str,
        mount_path: &str,
        path: &str,
    ) -> ContextResult<VaultSecret>;
}

#[derive(Default)]
struct VaultClients {
    clients: RwLock<BTreeMap<String, Arc<dyn VaultClient>>>,
}

fn clients(ctx: &CredentialsContext) -> ContextResult<Arc<VaultClients>> {
    ctx.attributes()
        .get_or_create(ATTR_CLIENTS, || Ok(VaultClients::default()))
}

/// Register the client used for a server URL
pub fn register_client(
    ctx: &CredentialsContext,
    server_url: &str,
    client: Arc<dyn VaultClient>,
) -> ContextResult<()> {
    let clients = clients(ctx)?;
    let mut map = clients
        .clients
        .write()
        .map_err(|_| ContextError::lock_poisoned())?;
    map.insert(server_url.to_string(), client);
    Ok(())
}

pub fn client_for(ctx: &CredentialsContext, server_url: &str) -> ContextResult<Arc<dyn VaultClient>> {
    let clients = clients(ctx)?;
    let map = clients
        .clients
        .read()
        .map_err(|_| ContextError::lock_poisoned())?;
    map.get(server_url)
        .cloned()
        .ok_or_else(|| ContextError::not_found(KIND_VAULT_CLIENT, server_url))
}

type SecretKey = (String, String, String);

/// Vault server kept in memory, for tests and local setups
#[derive(Default)]
pub struct InMemoryVaultServer {
    tokens: RwLock<BTreeSet<String>>,
    approles: RwLock<BTreeMap<(String, String), String>>,
    secrets: RwLock<BTreeMap<SecretKey, VaultSecret>>,
}

impl InMemoryVaultServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_token(&self, token: &str) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(token.to_string());
        }
    }

    /// Accept an app role login, handing out `token`
    pub fn add_approle(&self, role_id: &str, secret_id: &str, token: &str) {
        self.add_token(token);
        if let Ok(mut approles) = self.approles.write() {
            approles.insert((role_id.to_string(), secret_id.to_string()), token.to_string());
        }
    }

    pub fn set_secret(&self, namespace: &str, mount_path: &str, path: &str, secret: VaultSecret) {
        if let Ok(mut secrets) = self.secrets.write() {
            secrets.insert(key(namespace, mount_path, path), secret);
        }
    }

    fn check_token(&self, token: &str) -> ContextResult<()> {
        let tokens = self
            .tokens
            .read()
            .map_err(|_| ContextError::lock_poisoned())?;
        if tokens.contains(token) {
            Ok(())
        } else {
            Err(ContextError::invalid("vault token: permission denied"))
        }
    }
}

fn key(namespace: &str, mount_path: &str, path: &str) -> SecretKey {
    (
        namespace.to_string(),
        mount_path.trim_matches('/').to_string(),
        path.trim_matches('/').to_string(),
    )
}

impl VaultClient for InMemoryVaultServer {
    fn approle_login(&self, _namespace: &str, role_id: &str, secret_id: &str) -> ContextResult<String> {
        let approles = self
            .approles
            .read()
            .map_err(|_| ContextError::lock_poisoned())?;
        approles
            .get(&(role_id.to_string(), secret_id.to_string()))
            .cloned()
            .ok_or_else(|| ContextError::invalid("approle login: permission denied"))
    }

    fn list_secrets(
        &self,
        token: &str,
        namespace: &str,
        mount_path: &str,
        path: &str,
    ) -> ContextResult<Vec<String>> {
        self.check_token(token)?;
        let (ns, mount, dir) = key(namespace, mount_path, path);
        let secrets = self
            .secrets
            .read()
            .map_err(|_| ContextError::lock_poisoned())?;
        let names = secrets
            .keys()
            .filter(|(n, m, _)| *n == ns && *m == mount)
            .filter_map(|(_, _, p)| {
                let rest = if dir.is_empty() {
                    p.as_str()
                } else {
                    p.strip_prefix(dir.as_str())?.strip_prefix('/')?
                };
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        Ok(names)
    }

    fn read_secret(
        &self,
        token: &str,
        namespace: &str,
        mount_path: &str,
        path: &str,
    ) -> ContextResult<VaultSecret> {
        self.check_token(token)?;
        let k = key(namespace, mount_path, path);
        let secrets = self
            .secrets
            .read()
            .map_err(|_| ContextError::lock_poisoned())?;
        secrets
            .get(&k)
            .cloned()
            .ok_or_else(|| ContextError::not_found_in(KIND_SECRET, k.2, k.1))
    }
}
