//! # Configuration
//!
//! Typed config objects, the config context with its append-only log,
//! config sets, data appliers and the lazy updater replaying the log onto
//! dependent contexts.

pub mod applier;
pub mod builder;
pub mod context;
pub mod extensions;
pub mod spec;
pub mod updater;

pub use applier::{typed_applier, ConfigApplier, ConfigApplierRegistry};
pub use builder::{default_config_context, ConfigContextBuilder};
pub use context::{ConfigContext, LogEntry, CONTEXT_TYPE};
pub use extensions::{AggregateConfig, DataConfig};
pub use spec::{
    new_config_type_scheme, Config, ConfigSet, ConfigTypeScheme, ConfigurationList, GenericConfig,
    CONFIG_TYPE_SUFFIX,
};
pub use updater::Updater;
