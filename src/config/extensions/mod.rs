//! Config types provided by the config subsystem itself

pub mod data;
pub mod generic;

use super::spec::ConfigTypeScheme;
use crate::errors::ContextResult;

pub use data::DataConfig;
pub use generic::AggregateConfig;

/// Register the aggregate and data config types
pub fn register(scheme: &ConfigTypeScheme) -> ContextResult<()> {
    generic::register(scheme)?;
    data::register(scheme)
}
