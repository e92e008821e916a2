//! Vault auth methods, selected by the `authmeth` credential property

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use super::client::VaultClient;
use crate::credentials::consumers::vault::{
    ATTR_ROLEID, ATTR_SECRETID, ATTR_TOKEN, AUTH_APPROLE, AUTH_TOKEN,
};
use crate::credentials::source::Credentials;
use crate::errors::{ContextError, ContextResult};

/// Kind used for unknown auth methods
pub const KIND_AUTH_METHOD: &str = "vault auth method";

pub trait AuthMethod: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Check that the credentials carry what the method needs
    fn validate(&self, creds: &dyn Credentials) -> ContextResult<()>;

    /// Client token for the credentials
    fn token(
        &self,
        client: &dyn VaultClient,
        namespace: &str,
        creds: &dyn Credentials,
    ) -> ContextResult<String>;
}

fn required(creds: &dyn Credentials, property: &str, method: &str) -> ContextResult<String> {
    creds.get_property(property).ok_or_else(|| {
        ContextError::invalid(format!(
            "credential property {:?} required for auth method {:?}",
            property, method
        ))
    })
}

/// App role login with `roleid` and `secretid`
#[derive(Debug)]
pub struct AppRole;

impl AuthMethod for AppRole {
    fn name(&self) -> &str {
        AUTH_APPROLE
    }

    fn validate(&self, creds: &dyn Credentials) -> ContextResult<()> {
        required(creds, ATTR_ROLEID, AUTH_APPROLE)?;
        required(creds, ATTR_SECRETID, AUTH_APPROLE)?;
        Ok(())
    }

    fn token(
        &self,
        client: &dyn VaultClient,
        namespace: &str,
        creds: &dyn Credentials,
    ) -> ContextResult<String> {
        let role_id = required(creds, ATTR_ROLEID, AUTH_APPROLE)?;
        let secret_id = required(creds, ATTR_SECRETID, AUTH_APPROLE)?;
        client.approle_login(namespace, &role_id, &secret_id)
    }
}

/// Static client token
#[derive(Debug)]
pub struct Token;

impl AuthMethod for Token {
    fn name(&self) -> &str {
        AUTH_TOKEN
    }

    fn validate(&self, creds: &dyn Credentials) -> ContextResult<()> {
        required(creds, ATTR_TOKEN, AUTH_TOKEN).map(|_| ())
    }

    fn token(
        &self,
        _client: &dyn VaultClient,
        _namespace: &str,
        creds: &dyn Credentials,
    ) -> ContextResult<String> {
        required(creds, ATTR_TOKEN, AUTH_TOKEN)
    }
}

/// Registry of auth methods by name
#[derive(Default)]
pub struct AuthMethods {
    methods: RwLock<BTreeMap<String, Arc<dyn AuthMethod>>>,
}

impl AuthMethods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, method: Arc<dyn AuthMethod>) {
        if let Ok(mut methods) = self.methods.write() {
            methods.insert(method.name().to_string(), method);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AuthMethod>> {
        self.methods.read().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.methods
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Method selected by the credentials; `token` if none is named
    pub fn select(&self, creds: &dyn Credentials) -> ContextResult<Arc<dyn AuthMethod>> {
        let name = creds
            .get_property(crate::credentials::consumers::vault::ATTR_AUTHMETH)
            .unwrap_or_else(|| AUTH_TOKEN.to_string());
        let method = self
            .get(&name)
            .ok_or_else(|| ContextError::unknown_type(KIND_AUTH_METHOD, &name))?;
        method.validate(creds)?;
        Ok(method)
    }
}

/// Process-wide auth methods, initially `approle` and `token`
pub fn auth_methods() -> &'static AuthMethods {
    static METHODS: OnceLock<AuthMethods> = OnceLock::new();
    METHODS.get_or_init(|| {
        let methods = AuthMethods::new();
        methods.register(Arc::new(AppRole));
        methods.register(Arc::new(Token));
        methods
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::properties::Properties;
    use crate::credentials::source::DirectCredentials;

    #[test]
    fn test_select_defaults_to_token() {
        let creds = DirectCredentials::new(Properties::from([(ATTR_TOKEN, "t")]));
        assert_eq!(auth_methods().select(&creds).unwrap().name(), AUTH_TOKEN);
    }

    #[test]
    fn test_select_validates() {
        let creds = DirectCredentials::new(Properties::from([
            ("authmeth", AUTH_APPROLE),
            (ATTR_ROLEID, "r"),
        ]));
        assert!(auth_methods().select(&creds).unwrap_err().is_invalid());

        let creds = DirectCredentials::new(Properties::from([("authmeth", "kerberos")]));
        assert!(auth_methods()
            .select(&creds)
            .unwrap_err()
            .is_unknown_kind(KIND_AUTH_METHOD));
    }

    #[test]
    fn test_names() {
        assert_eq!(auth_methods().names(), vec![AUTH_APPROLE, AUTH_TOKEN]);
    }
}
