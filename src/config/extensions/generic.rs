//! Aggregate config: a list of configs, named config sets and set activations

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::context::ConfigContext;
use crate::config::spec::{Config, ConfigSet, ConfigTypeScheme, GenericConfig};
use crate::errors::{ContextError, ContextResult, ErrorList};
use crate::runtime::{versioned, ObjectType, VersionedTypedObject};

pub const CONFIG_TYPE: &str = "generic";

/// Aggregate config applicable to config contexts only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateConfig {
    #[serde(rename = "type")]
    pub config_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<GenericConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sets: BTreeMap<String, ConfigSet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set_activations: Vec<String>,
}

impl AggregateConfig {
    pub fn new() -> Self {
        Self {
            config_type: versioned(CONFIG_TYPE, "v1"),
            ..Self::default()
        }
    }

    pub fn add_config(&mut self, config: &dyn Config) -> ContextResult<()> {
        self.configurations.push(GenericConfig::from_config(config)?);
        Ok(())
    }

    pub fn add_set(&mut self, name: impl Into<String>, description: impl Into<String>) {
        self.sets
            .entry(name.into())
            .or_insert_with(|| ConfigSet::new(description));
    }

    /// Add a config to a named set, creating the set if needed
    pub fn add_config_to_set(&mut self, name: &str, config: &dyn Config) -> ContextResult<()> {
        self.sets
            .entry(name.to_string())
            .or_default()
            .add_config(config)
    }

    pub fn activate_set(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.set_activations.contains(&name) {
            self.set_activations.push(name);
        }
    }
}

impl VersionedTypedObject for AggregateConfig {
    fn get_type(&self) -> &str {
        &self.config_type
    }
}

impl Config for AggregateConfig {
    fn apply_to(&self, _ctx: &ConfigContext, target: &dyn Any) -> ContextResult<()> {
        let target = target
            .downcast_ref::<ConfigContext>()
            .ok_or_else(|| ContextError::no_context(CONFIG_TYPE))?;

        let mut errors = ErrorList::new("applying generic config list");
        for (name, set) in &self.sets {
            errors.add(target.add_config_set(name.clone(), set.clone()));
        }
        for (i, config) in self.configurations.iter().enumerate() {
            let config: Arc<dyn Config> = Arc::new(config.clone());
            errors.add(target.apply_config(config, &format!("config entry {}", i)));
        }
        for name in &self.set_activations {
            errors.add(target.apply_config_set(name));
        }
        errors.result()
    }
}

pub fn register(scheme: &ConfigTypeScheme) -> ContextResult<()> {
    scheme.register_type(
        ObjectType::new(CONFIG_TYPE, |c: AggregateConfig| Arc::new(c) as Arc<dyn Config>)
            .with_description(
                "Aggregation of config objects.\n\
                 Fields: configurations (list of configs), sets (named config sets),\n\
                 setActivations (names of sets to activate).",
            ),
        &["generic/v1", "generic.config", "generic.config/v1"],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::new_config_type_scheme;
    use crate::runtime::Encoding;

    #[test]
    fn test_decode_versioned_aliases() {
        let scheme = new_config_type_scheme();
        register(&scheme).unwrap();
        for t in ["generic", "generic/v1", "generic.config/v1"] {
            let data = format!(r#"{{"type":"{}","configurations":[{{"type":"x.config"}}]}}"#, t);
            let cfg = scheme.decode(data.as_bytes(), Encoding::Json).unwrap();
            let aggregate = crate::runtime::downcast::<AggregateConfig, _>(&*cfg).unwrap();
            assert_eq!(aggregate.configurations.len(), 1);
        }
    }

    #[test]
    fn test_wire_format() {
        let mut cfg = AggregateConfig::new();
        cfg.add_set("std", "standard");
        cfg.activate_set("std");
        cfg.activate_set("std");
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "generic/v1",
                "sets": {"std": {"description": "standard"}},
                "setActivations": ["std"]
            })
        );
    }
}
