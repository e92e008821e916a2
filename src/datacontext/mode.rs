//! Builder modes selecting how a new context obtains its registries

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::ContextError;

/// Construction mode of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuilderMode {
    /// Reuse the process default context where possible
    Shared,
    /// Use the default registries directly
    Defaulted,
    /// Local registries delegating to the defaults
    #[default]
    Extended,
    /// Local copies of the defaults at construction time
    Configured,
    /// Empty registries
    Initial,
}

impl BuilderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuilderMode::Shared => "shared",
            BuilderMode::Defaulted => "defaulted",
            BuilderMode::Extended => "extended",
            BuilderMode::Configured => "configured",
            BuilderMode::Initial => "initial",
        }
    }

    /// Select a registry for this mode.
    ///
    /// `derive` creates a registry delegating to the default, `snapshot`
    /// a detached copy of it and `empty` a new empty one.
    pub fn registry<R>(
        &self,
        default: &Arc<R>,
        derive: impl FnOnce(&Arc<R>) -> R,
        snapshot: impl FnOnce(&R) -> R,
        empty: impl FnOnce() -> R,
    ) -> Arc<R> {
        match self {
            BuilderMode::Shared | BuilderMode::Defaulted => Arc::clone(default),
            BuilderMode::Extended => Arc::new(derive(default)),
            BuilderMode::Configured => Arc::new(snapshot(default)),
            BuilderMode::Initial => Arc::new(empty()),
        }
    }
}

impl fmt::Display for BuilderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BuilderMode {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(BuilderMode::Shared),
            "defaulted" => Ok(BuilderMode::Defaulted),
            "extended" => Ok(BuilderMode::Extended),
            "configured" => Ok(BuilderMode::Configured),
            "initial" => Ok(BuilderMode::Initial),
            _ => Err(ContextError::invalid(format!("builder mode {:?}", s))),
        }
    }
}
