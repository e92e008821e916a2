//! `logging.config`: logging settings applied through the config system

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::{configure_once, LoggingSettings};
use crate::config::{Config, ConfigContext, ConfigTypeScheme};
use crate::credentials::CredentialsContext;
use crate::datacontext::{AttributesContext, Context, CONTEXT_TYPE as ATTRIBUTES_CONTEXT_TYPE};
use crate::errors::{ContextError, ContextResult};
use crate::runtime::{ObjectType, VersionedTypedObject};

pub const CONFIG_TYPE: &str = "logging.config";
pub const CONFIG_TYPE_V1: &str = "logging.config/v1";

/// Context type selecting the process-wide static logging context
pub const DEFAULT_CONTEXT: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(rename = "type")]
    pub config_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context_type: String,
    #[serde(default)]
    pub settings: LoggingSettings,
    /// Distinguishes otherwise equal settings applied to the static context
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extra_id: String,
}

impl LoggingConfig {
    pub fn new(context_type: impl Into<String>, settings: LoggingSettings) -> Self {
        Self {
            config_type: CONFIG_TYPE.to_string(),
            context_type: context_type.into(),
            settings,
            extra_id: String::new(),
        }
    }

    pub fn with_extra_id(mut self, extra_id: impl Into<String>) -> Self {
        self.extra_id = extra_id.into();
        self
    }
}

fn as_context(target: &dyn Any) -> Option<&dyn Context> {
    if let Some(c) = target.downcast_ref::<AttributesContext>() {
        return Some(c);
    }
    if let Some(c) = target.downcast_ref::<ConfigContext>() {
        return Some(c);
    }
    target
        .downcast_ref::<CredentialsContext>()
        .map(|c| c as &dyn Context)
}

impl VersionedTypedObject for LoggingConfig {
    fn get_type(&self) -> &str {
        &self.config_type
    }
}

impl Config for LoggingConfig {
    fn apply_to(&self, _ctx: &ConfigContext, target: &dyn Any) -> ContextResult<()> {
        match self.context_type.as_str() {
            DEFAULT_CONTEXT => configure_once(&self.settings, &self.extra_id).map(|_| ()),
            "" | ATTRIBUTES_CONTEXT_TYPE => {
                let attrs = target
                    .downcast_ref::<AttributesContext>()
                    .ok_or_else(|| ContextError::no_context(CONFIG_TYPE))?;
                attrs.logging_context().apply_settings(&self.settings)
            }
            wanted => {
                let ctx = as_context(target)
                    .filter(|c| c.context_type() == wanted)
                    .ok_or_else(|| ContextError::no_context(CONFIG_TYPE))?;
                ctx.base().logging().apply_settings(&self.settings)
            }
        }
    }
}

pub fn register(scheme: &ConfigTypeScheme) -> ContextResult<()> {
    scheme.register_type(
        ObjectType::new(CONFIG_TYPE, |c: LoggingConfig| Arc::new(c) as Arc<dyn Config>)
            .with_description(
                "Logging settings.\n\
                 Fields: contextType (default: the process-wide logging context,\n\
                 applied once per content and extraId; attributes.context or\n\
                 empty: the root context; any other context type selects\n\
                 targets of that type), settings (defaultLevel, rules of realm\n\
                 and level), extraId.",
            ),
        &[CONFIG_TYPE_V1],
    )
}
