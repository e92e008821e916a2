//! Consumer identities

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::properties::ATTR_TYPE;
use crate::errors::{ContextError, ContextResult};

/// Identity attribute holding the consumer type
pub const ID_TYPE: &str = ATTR_TYPE;

/// Attribute set describing a credential consumer.
///
/// Equality ignores attribute order. Identities registered with a
/// provider are treated as immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerIdentity(BTreeMap<String, String>);

impl ConsumerIdentity {
    /// Identity with only its type attribute
    pub fn new(consumer_type: impl Into<String>) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert(ID_TYPE.to_string(), consumer_type.into());
        Self(attrs)
    }

    /// Builder style attribute setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Set an attribute; empty values remove it
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if value.is_empty() {
            self.0.remove(&name);
        } else {
            self.0.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn get_type(&self) -> &str {
        self.get(ID_TYPE).unwrap_or_default()
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

    /// Identities must carry a consumer type
    pub fn validate(&self) -> ContextResult<()> {
        if self.get_type().is_empty() {
            return Err(ContextError::invalid(format!(
                "consumer identity {}: missing type",
                self
            )));
        }
        Ok(())
    }

    /// Parse `k=v,k=v` notation
    pub fn parse(spec: &str) -> ContextResult<Self> {
        let mut id = Self::default();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => id.set(k.trim(), v.trim()),
                _ => {
                    return Err(ContextError::invalid(format!(
                        "consumer attribute {:?}: expected <name>=<value>",
                        part
                    )))
                }
            }
        }
        id.validate()?;
        Ok(id)
    }
}

impl fmt::Display for ConsumerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", attrs.join(","))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConsumerIdentity {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
