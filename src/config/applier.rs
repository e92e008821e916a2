//! # Config Appliers
//!
//! Appliers give behavior to opaque `data.config` payloads. They are
//! registered by name and looked up when the data config is applied.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::context::ConfigContext;
use crate::errors::{ContextError, ContextResult};

/// Applies a data payload to a target
pub trait ConfigApplier: Send + Sync {
    fn apply_to(&self, ctx: &ConfigContext, data: &Value, target: &dyn Any) -> ContextResult<()>;
}

impl<F> ConfigApplier for F
where
    F: Fn(&ConfigContext, &Value, &dyn Any) -> ContextResult<()> + Send + Sync,
{
    fn apply_to(&self, ctx: &ConfigContext, data: &Value, target: &dyn Any) -> ContextResult<()> {
        self(ctx, data, target)
    }
}

/// Applier decoding its payload into `D` and accepting only targets of type `T`.
///
/// Other targets are reported as not applicable.
pub fn typed_applier<T, D, F>(name: &str, apply: F) -> Arc<dyn ConfigApplier>
where
    T: Any,
    D: DeserializeOwned + 'static,
    F: Fn(&ConfigContext, D, &T) -> ContextResult<()> + Send + Sync + 'static,
{
    let name = name.to_string();
    Arc::new(
        move |ctx: &ConfigContext, data: &Value, target: &dyn Any| -> ContextResult<()> {
            let target = target
                .downcast_ref::<T>()
                .ok_or_else(|| ContextError::no_context(name.clone()))?;
            let payload: D = serde_json::from_value(data.clone())?;
            apply(ctx, payload, target)
        },
    )
}

#[derive(Clone)]
struct ApplierEntry {
    applier: Arc<dyn ConfigApplier>,
    description: String,
}

/// Appliers by name, with base delegation
#[derive(Default)]
pub struct ConfigApplierRegistry {
    base: Option<Arc<ConfigApplierRegistry>>,
    appliers: RwLock<BTreeMap<String, ApplierEntry>>,
}

impl ConfigApplierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn derive(self: &Arc<Self>) -> Self {
        Self {
            base: Some(Arc::clone(self)),
            appliers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn snapshot(&self) -> Self {
        let mut all = BTreeMap::new();
        self.collect(&mut all);
        Self {
            base: None,
            appliers: RwLock::new(all),
        }
    }

    fn collect(&self, all: &mut BTreeMap<String, ApplierEntry>) {
        if let Some(b) = &self.base {
            b.collect(all);
        }
        if let Ok(a) = self.appliers.read() {
            for (k, v) in a.iter() {
                all.insert(k.clone(), v.clone());
            }
        }
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        applier: Arc<dyn ConfigApplier>,
        description: impl Into<String>,
    ) {
        if let Ok(mut a) = self.appliers.write() {
            a.insert(
                name.into(),
                ApplierEntry {
                    applier,
                    description: description.into(),
                },
            );
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ConfigApplier>> {
        let local = self
            .appliers
            .read()
            .ok()
            .and_then(|a| a.get(name).map(|e| Arc::clone(&e.applier)));
        local.or_else(|| self.base.as_ref().and_then(|b| b.get(name)))
    }

    /// Registered appliers with their descriptions
    pub fn list(&self) -> Vec<(String, String)> {
        let mut all = BTreeMap::new();
        self.collect(&mut all);
        all.into_iter().map(|(k, v)| (k, v.description)).collect()
    }
}
