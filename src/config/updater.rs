//! # Lazy Config Updates
//!
//! An updater remembers how much of a config context's log was applied to
//! its target. On `update` it replays the new suffix of the log in order
//! and advances the watermark. Compare, replay and advance happen under
//! one lock, so concurrent updates never replay an entry twice.
//!
//! The updater holds the config context weakly and receives the target
//! per call, so neither side keeps the other alive.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, ThreadId};

use super::context::ConfigContext;
use crate::datacontext::ContextUpdater;
use crate::errors::{ContextError, ContextResult};
use crate::observability::Event;

/// Per-target watermark into a config log
pub struct Updater {
    config: Weak<ConfigContext>,
    watermark: Mutex<usize>,
    active: Mutex<Option<ThreadId>>,
}

/// Marks the updater active for the current thread until dropped
struct ActiveGuard<'a> {
    active: &'a Mutex<Option<ThreadId>>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut a) = self.active.lock() {
            *a = None;
        }
    }
}

impl Updater {
    /// Updater starting before the first log entry
    pub fn new(config: &Arc<ConfigContext>) -> Self {
        Self {
            config: Arc::downgrade(config),
            watermark: Mutex::new(0),
            active: Mutex::new(None),
        }
    }

    /// Number of log entries already applied
    pub fn generation(&self) -> usize {
        self.watermark.lock().map(|w| *w).unwrap_or(0)
    }

    fn lock_watermark(&self) -> ContextResult<MutexGuard<'_, usize>> {
        self.watermark
            .lock()
            .map_err(|_| ContextError::lock_poisoned())
    }

    fn is_active_on_current_thread(&self) -> ContextResult<bool> {
        let active = self
            .active
            .lock()
            .map_err(|_| ContextError::lock_poisoned())?;
        Ok(*active == Some(thread::current().id()))
    }

    /// Replay all config objects logged since the last update onto `target`.
    ///
    /// Updates triggered while replaying on the same thread are no-ops.
    pub fn update(&self, target: &dyn Any) -> ContextResult<()> {
        let config = match self.config.upgrade() {
            Some(c) => c,
            None => return Ok(()),
        };
        if self.is_active_on_current_thread()? {
            return Ok(());
        }

        let mut watermark = self.lock_watermark()?;
        if config.generation() <= *watermark {
            return Ok(());
        }

        {
            let mut active = self
                .active
                .lock()
                .map_err(|_| ContextError::lock_poisoned())?;
            *active = Some(thread::current().id());
        }
        let _guard = ActiveGuard {
            active: &self.active,
        };

        let from = *watermark;
        let (generation, result) = config.apply_to(from, target);
        *watermark = generation;
        config.logging().event(
            Event::UpdateReplayed,
            &[
                ("from", &from.to_string()),
                ("to", &generation.to_string()),
            ],
        );
        result
    }
}

impl ContextUpdater for Updater {
    fn update(&self, target: &dyn Any) -> ContextResult<()> {
        Updater::update(self, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::applier::ConfigApplierRegistry;
    use crate::config::spec::{new_config_type_scheme, Config};
    use crate::datacontext::AttributesContext;
    use crate::runtime::VersionedTypedObject;
    use serde::Serialize;

    #[derive(Debug, Serialize)]
    struct StepConfig {
        #[serde(rename = "type")]
        config_type: String,
        name: String,
        fail: bool,
        reenter: bool,
    }

    impl StepConfig {
        fn new(name: &str) -> Self {
            Self {
                config_type: "step.config".to_string(),
                name: name.to_string(),
                fail: false,
                reenter: false,
            }
        }
    }

    impl VersionedTypedObject for StepConfig {
        fn get_type(&self) -> &str {
            &self.config_type
        }
    }

    impl Config for StepConfig {
        fn apply_to(&self, _ctx: &ConfigContext, target: &dyn Any) -> ContextResult<()> {
            let target = target
                .downcast_ref::<Target>()
                .ok_or_else(|| ContextError::no_context("step.config"))?;
            target.seen.lock().unwrap().push(self.name.clone());
            if self.reenter {
                target.updater.update(target)?;
            }
            if self.fail {
                return Err(ContextError::invalid(format!("step {}", self.name)));
            }
            Ok(())
        }
    }

    struct Target {
        updater: Updater,
        seen: Mutex<Vec<String>>,
    }

    fn config_context() -> Arc<ConfigContext> {
        ConfigContext::new(
            AttributesContext::new(None),
            Arc::new(new_config_type_scheme()),
            Arc::new(ConfigApplierRegistry::new()),
        )
    }

    fn target(config: &Arc<ConfigContext>) -> Target {
        Target {
            updater: Updater::new(config),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn apply(config: &ConfigContext, step: StepConfig) {
        let name = step.name.clone();
        config.apply_config(Arc::new(step), &name).unwrap();
    }

    #[test]
    fn test_replays_only_new_entries() {
        let config = config_context();
        let t = target(&config);
        apply(&config, StepConfig::new("a"));
        t.updater.update(&t).unwrap();
        apply(&config, StepConfig::new("b"));
        t.updater.update(&t).unwrap();
        t.updater.update(&t).unwrap();

        assert_eq!(*t.seen.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(t.updater.generation(), 2);
    }

    #[test]
    fn test_failed_entry_reported_once() {
        let config = config_context();
        let t = target(&config);
        apply(&config, StepConfig { fail: true, ..StepConfig::new("bad") });
        apply(&config, StepConfig::new("good"));

        match t.updater.update(&t).unwrap_err() {
            ContextError::List(list) => {
                assert_eq!(list.len(), 1);
                assert!(list.errors()[0].is_invalid());
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(t.updater.generation(), 2);
        t.updater.update(&t).unwrap();
        assert_eq!(*t.seen.lock().unwrap(), vec!["bad", "good"]);
    }

    #[test]
    fn test_reentrant_update_is_noop() {
        let config = config_context();
        let t = target(&config);
        apply(&config, StepConfig { reenter: true, ..StepConfig::new("outer") });
        apply(&config, StepConfig::new("next"));

        t.updater.update(&t).unwrap();
        assert_eq!(*t.seen.lock().unwrap(), vec!["outer", "next"]);
    }

    #[test]
    fn test_dropped_config_context_ignored() {
        let config = config_context();
        let t = target(&config);
        apply(&config, StepConfig::new("a"));
        drop(config);

        t.updater.update(&t).unwrap();
        assert!(t.seen.lock().unwrap().is_empty());
        assert_eq!(t.updater.generation(), 0);
    }
}
