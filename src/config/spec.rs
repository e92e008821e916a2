//! # Config Objects
//!
//! Config objects are typed specifications applied to arbitrary targets.
//! A config object that does not recognize a target fails with a
//! not-applicable error (unknown config type or no context), which
//! aggregate appliers skip.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::ConfigContext;
use crate::errors::{ContextResult, KIND_CONFIG_TYPE};
use crate::runtime::{Scheme, UnstructuredTypedObject, VersionedTypedObject};

/// Suffix of config type names
pub const CONFIG_TYPE_SUFFIX: &str = ".config";

/// Typed configuration applicable to targets
pub trait Config: VersionedTypedObject {
    fn apply_to(&self, ctx: &ConfigContext, target: &dyn Any) -> ContextResult<()>;
}

/// Scheme of all config types
pub type ConfigTypeScheme = Scheme<dyn Config>;

/// New config type scheme keeping configs of unknown types as [`GenericConfig`]
pub fn new_config_type_scheme() -> ConfigTypeScheme {
    Scheme::new(KIND_CONFIG_TYPE).accept_unknown(Arc::new(|u: UnstructuredTypedObject| {
        Arc::new(GenericConfig::new(u)) as Arc<dyn Config>
    }))
}

/// Config object kept in serialized form and evaluated on use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenericConfig(UnstructuredTypedObject);

impl GenericConfig {
    pub fn new(u: UnstructuredTypedObject) -> Self {
        Self(u)
    }

    /// Capture a typed config
    pub fn from_config(config: &dyn Config) -> ContextResult<Self> {
        Ok(Self(UnstructuredTypedObject::from_object(config)?))
    }

    pub fn unstructured(&self) -> &UnstructuredTypedObject {
        &self.0
    }

    /// Resolve the concrete config against the types currently registered.
    ///
    /// Fails with an unknown config type error while the type is unknown;
    /// the object remembers the outcome in its unknown flag.
    pub fn evaluate(&self, ctx: &ConfigContext) -> ContextResult<Arc<dyn Config>> {
        ctx.config_types().evaluate(&self.0)
    }
}

impl VersionedTypedObject for GenericConfig {
    fn get_type(&self) -> &str {
        self.0.get_type()
    }

    fn is_unknown(&self) -> bool {
        self.0.is_unknown()
    }
}

impl Config for GenericConfig {
    fn apply_to(&self, ctx: &ConfigContext, target: &dyn Any) -> ContextResult<()> {
        let config = self.evaluate(ctx)?;
        config.apply_to(ctx, target)
    }
}

/// Ordered list of config objects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationList {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<GenericConfig>,
}

impl ConfigurationList {
    pub fn add_config(&mut self, config: &dyn Config) -> ContextResult<()> {
        self.configurations.push(GenericConfig::from_config(config)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }
}

/// Named bundle of config objects, applied only on activation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSet {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(flatten)]
    pub list: ConfigurationList,
}

impl ConfigSet {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            list: ConfigurationList::default(),
        }
    }

    pub fn add_config(&mut self, config: &dyn Config) -> ContextResult<()> {
        self.list.add_config(config)
    }

    pub fn configurations(&self) -> &[GenericConfig] {
        &self.list.configurations
    }
}
