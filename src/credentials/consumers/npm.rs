//! NPM registry consumers

use super::{join_path, Locator};
use crate::credentials::identity::ConsumerIdentity;
use crate::credentials::matcher::{hostpath, SpecificityMatcher};
use crate::errors::{ContextError, ContextResult};

pub use crate::credentials::matcher::hostpath::{ID_HOSTNAME, ID_PATHPREFIX, ID_PORT};
pub use crate::credentials::properties::ATTR_TOKEN;

pub const CONSUMER_TYPE: &str = "NPM";

pub fn matcher() -> SpecificityMatcher {
    hostpath::matcher(CONSUMER_TYPE)
}

/// Consumer identity of a package in an NPM registry given by URL
pub fn consumer_id(registry_url: &str, package: &str) -> ContextResult<ConsumerIdentity> {
    let l = Locator::parse(registry_url);
    if l.scheme.is_empty() || l.host.is_empty() {
        return Err(ContextError::invalid(format!(
            "npm registry url {:?}",
            registry_url
        )));
    }
    let mut id = ConsumerIdentity::new(CONSUMER_TYPE);
    id.set(ID_HOSTNAME, l.host);
    id.set(ID_PORT, l.port);
    id.set(ID_PATHPREFIX, join_path(&[&l.path, package]));
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_id() {
        let id = consumer_id("https://registry.npmjs.org/", "lodash").unwrap();
        assert_eq!(id.get(ID_HOSTNAME), Some("registry.npmjs.org"));
        assert_eq!(id.get(ID_PATHPREFIX), Some("lodash"));
    }

    #[test]
    fn test_consumer_id_requires_url() {
        assert!(consumer_id("registry.npmjs.org", "").unwrap_err().is_invalid());
    }
}
