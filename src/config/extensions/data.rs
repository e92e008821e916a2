//! Data config: an opaque payload handed to a named config applier

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::context::ConfigContext;
use crate::config::spec::{Config, ConfigTypeScheme};
use crate::errors::{ContextError, ContextResult, KIND_CONFIG_APPLIER};
use crate::runtime::{versioned, ObjectType, VersionedTypedObject};

pub const CONFIG_TYPE: &str = "data.config";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(rename = "type")]
    pub config_type: String,
    pub applier: String,
    #[serde(default)]
    pub data: Value,
}

impl DataConfig {
    pub fn new(applier: impl Into<String>, data: Value) -> Self {
        Self {
            config_type: versioned(CONFIG_TYPE, "v1"),
            applier: applier.into(),
            data,
        }
    }
}

impl VersionedTypedObject for DataConfig {
    fn get_type(&self) -> &str {
        &self.config_type
    }
}

impl Config for DataConfig {
    fn apply_to(&self, ctx: &ConfigContext, target: &dyn Any) -> ContextResult<()> {
        let applier = ctx
            .appliers()
            .get(&self.applier)
            .ok_or_else(|| ContextError::unknown_type(KIND_CONFIG_APPLIER, &self.applier))?;
        applier.apply_to(ctx, &self.data, target)
    }
}

pub fn register(scheme: &ConfigTypeScheme) -> ContextResult<()> {
    scheme.register_type(
        ObjectType::new(CONFIG_TYPE, |c: DataConfig| Arc::new(c) as Arc<dyn Config>)
            .with_description(
                "Arbitrary data handed to a registered config applier.\n\
                 Fields: applier (applier name), data (payload).",
            ),
        &[],
    )
}
