//! Construction of config contexts

use std::sync::{Arc, OnceLock};

use super::applier::ConfigApplierRegistry;
use super::context::ConfigContext;
use super::spec::{new_config_type_scheme, ConfigTypeScheme};
use super::updater::Updater;
use crate::datacontext::{default_attributes_context, AttributesContext, BuilderMode, ContextUpdater};
use crate::plugins;

/// Builder for [`ConfigContext`]s
#[derive(Default)]
pub struct ConfigContextBuilder {
    mode: BuilderMode,
    attributes: Option<Arc<AttributesContext>>,
    config_types: Option<Arc<ConfigTypeScheme>>,
    appliers: Option<Arc<ConfigApplierRegistry>>,
}

impl ConfigContextBuilder {
    pub fn new(mode: BuilderMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_attributes(mut self, attributes: Arc<AttributesContext>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_config_types(mut self, config_types: Arc<ConfigTypeScheme>) -> Self {
        self.config_types = Some(config_types);
        self
    }

    pub fn with_appliers(mut self, appliers: Arc<ConfigApplierRegistry>) -> Self {
        self.appliers = Some(appliers);
        self
    }

    /// Create the context and install its updater on the attributes context
    pub fn build(self) -> Arc<ConfigContext> {
        if self.mode == BuilderMode::Shared
            && self.attributes.is_none()
            && self.config_types.is_none()
            && self.appliers.is_none()
        {
            return Arc::clone(default_config_context());
        }

        let defaults = plugins::defaults();
        let attributes = self.attributes.unwrap_or_else(|| match self.mode {
            BuilderMode::Shared => Arc::clone(default_attributes_context()),
            _ => AttributesContext::new(None),
        });
        let config_types = self.config_types.unwrap_or_else(|| {
            self.mode.registry(
                &defaults.config_types,
                |d| d.derive(),
                |d| d.snapshot(),
                new_config_type_scheme,
            )
        });
        let appliers = self.appliers.unwrap_or_else(|| {
            self.mode.registry(
                &defaults.appliers,
                |d| d.derive(),
                |d| d.snapshot(),
                ConfigApplierRegistry::new,
            )
        });

        let ctx = ConfigContext::new(Arc::clone(&attributes), config_types, appliers);
        attributes.assure_updater(|| Arc::new(Updater::new(&ctx)) as Arc<dyn ContextUpdater>);
        ctx
    }
}

/// Process-wide default config context on the default attributes context
pub fn default_config_context() -> &'static Arc<ConfigContext> {
    static DEFAULT: OnceLock<Arc<ConfigContext>> = OnceLock::new();
    DEFAULT.get_or_init(|| {
        ConfigContextBuilder::new(BuilderMode::Defaulted)
            .with_attributes(Arc::clone(default_attributes_context()))
            .build()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::extensions::generic;
    use crate::datacontext::Context;

    #[test]
    fn test_shared_mode_reuses_default() {
        let a = ConfigContextBuilder::new(BuilderMode::Shared).build();
        let b = ConfigContextBuilder::new(BuilderMode::Shared).build();
        assert!(a.is_identical_to(&*b));
        assert!(a.is_identical_to(&**default_config_context()));
    }

    #[test]
    fn test_modes_select_config_types() {
        let extended = ConfigContextBuilder::new(BuilderMode::Extended).build();
        assert!(extended.config_types().is_known(generic::CONFIG_TYPE));
        assert!(extended.config_types().base().is_some());

        let configured = ConfigContextBuilder::new(BuilderMode::Configured).build();
        assert!(configured.config_types().is_known(generic::CONFIG_TYPE));
        assert!(configured.config_types().base().is_none());

        let initial = ConfigContextBuilder::new(BuilderMode::Initial).build();
        assert!(!initial.config_types().is_known(generic::CONFIG_TYPE));
    }

    #[test]
    fn test_build_installs_updater() {
        let attrs = AttributesContext::new(None);
        let _ctx = ConfigContextBuilder::new(BuilderMode::Extended)
            .with_attributes(Arc::clone(&attrs))
            .build();
        assert!(attrs.has_updater());
    }
}
