//! HashiCorp Vault consumers and their credential attributes

use super::{join_path, Locator};
use crate::credentials::identity::ConsumerIdentity;
use crate::credentials::matcher::{hostpath, SpecificityMatcher};
use crate::errors::{ContextError, ContextResult};

pub use crate::credentials::matcher::hostpath::{ID_HOSTNAME, ID_PATHPREFIX, ID_PORT, ID_SCHEME};
pub use crate::credentials::properties::ATTR_TOKEN;

pub const CONSUMER_TYPE: &str = "HashiCorpVault";

pub const ID_NAMESPACE: &str = "namespace";
pub const ID_MOUNTPATH: &str = "mountPath";

/// Credential property selecting the auth method
pub const ATTR_AUTHMETH: &str = "authmeth";
pub const ATTR_ROLEID: &str = "roleid";
pub const ATTR_SECRETID: &str = "secretid";

pub const AUTH_APPROLE: &str = "approle";
pub const AUTH_TOKEN: &str = "token";

pub fn matcher() -> SpecificityMatcher {
    hostpath::matcher(CONSUMER_TYPE)
}

/// Consumer identity for accessing secrets of a vault server
pub fn consumer_id(
    server_url: &str,
    namespace: &str,
    mount_path: &str,
    path: &str,
) -> ContextResult<ConsumerIdentity> {
    let l = Locator::parse(server_url);
    if l.host.is_empty() {
        return Err(ContextError::invalid(format!("vault server url {:?}", server_url)));
    }
    let mut id = ConsumerIdentity::new(CONSUMER_TYPE);
    id.set(ID_HOSTNAME, l.host);
    id.set(ID_PORT, l.port);
    id.set(ID_SCHEME, l.scheme);
    id.set(ID_NAMESPACE, namespace);
    id.set(ID_MOUNTPATH, mount_path);
    id.set(ID_PATHPREFIX, join_path(&[path]));
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::matcher::IdentityMatcher;

    #[test]
    fn test_server_binding_serves_paths() {
        let req = consumer_id("https://vault:8200", "ns", "secret", "team/app").unwrap();
        let server = consumer_id("https://vault:8200", "ns", "secret", "").unwrap();
        let other_mount = consumer_id("https://vault:8200", "ns", "kv", "").unwrap();
        assert!(matcher().matches(&req, None, &server));
        assert!(!matcher().matches(&req, None, &other_mount));
    }

    #[test]
    fn test_requires_host() {
        assert!(consumer_id("", "", "", "").unwrap_err().is_invalid());
    }
}
