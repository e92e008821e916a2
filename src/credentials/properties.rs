//! Credential property bags

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Well-known property names shared across backends
pub const ATTR_TYPE: &str = "type";
pub const ATTR_USERNAME: &str = "username";
pub const ATTR_PASSWORD: &str = "password";
pub const ATTR_IDENTITY_TOKEN: &str = "identityToken";
pub const ATTR_CERTIFICATE_AUTHORITY: &str = "certificateAuthority";
pub const ATTR_SERVER_ADDRESS: &str = "serverAddress";
pub const ATTR_TOKEN: &str = "token";

/// Name/value mapping of credential properties.
///
/// Keys are kept sorted, so serialization and digests are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Set a property only if the value is not empty
    pub fn set_non_empty(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.0.insert(name.into(), value);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Overwrite entries with those of `other`
    pub fn merge(&mut self, other: &Properties) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// SHA-256 digest of the canonical JSON form
    pub fn digest(&self) -> String {
        let canonical = serde_json::to_string(&self.0).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Rendering with all values replaced, for output and logs
    pub fn redacted(&self) -> String {
        let names: Vec<&str> = self.0.keys().map(String::as_str).collect();
        format!("{{{}}}", names.join(", "))
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Properties {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}
