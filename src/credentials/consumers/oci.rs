//! OCI registry consumers

use super::{join_path, Locator};
use crate::credentials::identity::ConsumerIdentity;
use crate::credentials::matcher::{hostpath, SpecificityMatcher};

pub use crate::credentials::matcher::hostpath::{ID_HOSTNAME, ID_PATHPREFIX, ID_PORT, ID_SCHEME};
pub use crate::credentials::properties::{
    ATTR_CERTIFICATE_AUTHORITY, ATTR_IDENTITY_TOKEN, ATTR_PASSWORD, ATTR_USERNAME,
};

pub const CONSUMER_TYPE: &str = "OCIRegistry";

pub fn matcher() -> SpecificityMatcher {
    hostpath::matcher(CONSUMER_TYPE)
}

/// Split `host[:port][/path]` into its parts
pub fn split_locator(locator: &str) -> (String, String, String) {
    let l = Locator::parse(locator);
    (l.host, l.port, l.path)
}

/// Consumer identity of a repository in an OCI registry
pub fn consumer_id(locator: &str, repository: &str) -> ConsumerIdentity {
    let l = Locator::parse(locator);
    let mut id = ConsumerIdentity::new(CONSUMER_TYPE);
    id.set(ID_HOSTNAME, l.host);
    id.set(ID_PORT, l.port);
    id.set(ID_SCHEME, l.scheme);
    id.set(ID_PATHPREFIX, join_path(&[&l.path, repository]));
    id
}
