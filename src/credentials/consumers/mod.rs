//! # Standard Consumer Types
//!
//! Consumer identity types of the standard repository backends and their
//! identity matchers.

pub mod npm;
pub mod oci;
pub mod vault;

use std::sync::Arc;

use super::matcher::{hostpath, IdentityMatcher, IdentityMatcherRegistry};

/// Components of a `scheme://host:port/path` locator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locator {
    pub scheme: String,
    pub host: String,
    pub port: String,
    pub path: String,
}

impl Locator {
    /// Split a locator; scheme, port and path are optional
    pub fn parse(locator: &str) -> Self {
        let (scheme, rest) = match locator.split_once("://") {
            Some((s, r)) => (s.to_string(), r),
            None => (String::new(), locator),
        };
        let (hostport, path) = match rest.split_once('/') {
            Some((h, p)) => (h, p.trim_matches('/')),
            None => (rest, ""),
        };
        let (host, port) = match hostport.split_once(':') {
            Some((h, p)) => (h, p),
            None => (hostport, ""),
        };
        Self {
            scheme,
            host: host.to_string(),
            port: port.to_string(),
            path: path.to_string(),
        }
    }
}

/// Join path segments, dropping empty ones
pub(crate) fn join_path(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Register the matchers of all standard consumer types
pub fn register(matchers: &IdentityMatcherRegistry) {
    matchers.register(
        hostpath::IDENTITY_TYPE,
        Arc::new(hostpath::matcher(hostpath::IDENTITY_TYPE)) as Arc<dyn IdentityMatcher>,
        "Generic host/path matcher: exact hostname, port and scheme, \
         path prefix matching for pathprefix.",
    );
    matchers.register(
        oci::CONSUMER_TYPE,
        Arc::new(oci::matcher()) as Arc<dyn IdentityMatcher>,
        "OCI registry credential matcher, acting like the hostpath matcher.",
    );
    matchers.register(
        npm::CONSUMER_TYPE,
        Arc::new(npm::matcher()) as Arc<dyn IdentityMatcher>,
        "NPM registry credential matcher, acting like the hostpath matcher.",
    );
    matchers.register(
        vault::CONSUMER_TYPE,
        Arc::new(vault::matcher()) as Arc<dyn IdentityMatcher>,
        "HashiCorp Vault matcher: exact server, namespace and mount path, \
         path prefix matching for the secret path.",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locator() {
        let l = Locator::parse("https://ghcr.io:443/acme/app/");
        assert_eq!(l.scheme, "https");
        assert_eq!(l.host, "ghcr.io");
        assert_eq!(l.port, "443");
        assert_eq!(l.path, "acme/app");

        let l = Locator::parse("localhost");
        assert_eq!(l, Locator { host: "localhost".to_string(), ..Locator::default() });
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&["/a/", "", "b"]), "a/b");
        assert_eq!(join_path(&["", ""]), "");
    }

    #[test]
    fn test_register() {
        let registry = IdentityMatcherRegistry::new();
        register(&registry);
        let types: Vec<String> = registry.list().into_iter().map(|(t, _)| t).collect();
        assert_eq!(types, vec!["HashiCorpVault", "NPM", "OCIRegistry", "hostpath"]);
    }
}
