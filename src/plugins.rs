//! # Plugins
//!
//! Types become known by installing plugins into a set of registrations.
//! The process-wide defaults get the standard plugins on first use.
//! Installing registers types by name; a later registration of a name
//! replaces the earlier one, so installation is idempotent.

use std::sync::{Arc, OnceLock};

use crate::config::{extensions, new_config_type_scheme, ConfigApplierRegistry, ConfigTypeScheme};
use crate::credentials::repository::{new_repository_type_scheme, RepositoryTypeScheme};
use crate::credentials::{self, consumers, repositories, IdentityMatcherRegistry};
use crate::errors::{ContextResult, ErrorList};
use crate::observability::{self, static_logging_context, Severity, REALM};

/// Registries filled by plugins
pub struct Registrations {
    pub config_types: Arc<ConfigTypeScheme>,
    pub appliers: Arc<ConfigApplierRegistry>,
    pub repository_types: Arc<RepositoryTypeScheme>,
    pub matchers: Arc<IdentityMatcherRegistry>,
}

impl Default for Registrations {
    fn default() -> Self {
        Self::new()
    }
}

impl Registrations {
    /// Empty registrations
    pub fn new() -> Self {
        Self {
            config_types: Arc::new(new_config_type_scheme()),
            appliers: Arc::new(ConfigApplierRegistry::new()),
            repository_types: Arc::new(new_repository_type_scheme()),
            matchers: Arc::new(IdentityMatcherRegistry::new()),
        }
    }

    /// Install plugins in order; failures of single plugins are collected
    pub fn install(&self, plugins: &[Arc<dyn Plugin>]) -> ContextResult<()> {
        let mut errors = ErrorList::new("installing plugins");
        for plugin in plugins {
            errors.add(
                plugin
                    .install(self)
                    .map_err(|e| e.wrap(format!("plugin {:?}", plugin.name()))),
            );
        }
        errors.result()
    }
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn install(&self, registrations: &Registrations) -> ContextResult<()>;
}

/// Plugin backed by a plain function
pub struct StaticPlugin {
    name: &'static str,
    install: fn(&Registrations) -> ContextResult<()>,
}

impl StaticPlugin {
    pub const fn new(name: &'static str, install: fn(&Registrations) -> ContextResult<()>) -> Self {
        Self { name, install }
    }
}

impl Plugin for StaticPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn install(&self, registrations: &Registrations) -> ContextResult<()> {
        (self.install)(registrations)
    }
}

fn config_types(r: &Registrations) -> ContextResult<()> {
    extensions::register(&r.config_types)?;
    credentials::config::register(&r.config_types)?;
    repositories::memory::register_config(&r.config_types)?;
    observability::config::register(&r.config_types)
}

fn repository_types(r: &Registrations) -> ContextResult<()> {
    repositories::register(&r.repository_types)
}

fn consumer_types(r: &Registrations) -> ContextResult<()> {
    consumers::register(&r.matchers);
    Ok(())
}

/// Config types, repository types and consumer identity types of this crate
pub fn standard_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(StaticPlugin::new("config types", config_types)),
        Arc::new(StaticPlugin::new("repository types", repository_types)),
        Arc::new(StaticPlugin::new("consumer types", consumer_types)),
    ]
}

/// Process-wide registrations with the standard plugins installed
pub fn defaults() -> &'static Registrations {
    static DEFAULTS: OnceLock<Registrations> = OnceLock::new();
    DEFAULTS.get_or_init(|| {
        let registrations = Registrations::new();
        if let Err(e) = registrations.install(&standard_plugins()) {
            static_logging_context().log(
                REALM,
                Severity::Error,
                "PLUGIN_INSTALL_FAILED",
                &[("error", &e.to_string())],
            );
        }
        registrations
    })
}
