//! # Config Contexts
//!
//! A config context records every applied config object in an append-only
//! log. Dependent contexts replay the log lazily through their updater.
//! Named config sets are stored inactive and appended to the log on their
//! first activation.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::applier::ConfigApplierRegistry;
use super::spec::{Config, ConfigSet, ConfigTypeScheme, GenericConfig};
use crate::datacontext::{AttributesContext, Context, ContextBase};
use crate::errors::{ContextError, ContextResult, ErrorList, KIND_CONFIG_SET};
use crate::observability::{Event, LoggingContext};
use crate::runtime::Encoding;

/// Type name of config contexts
pub const CONTEXT_TYPE: &str = "config.context";

/// One applied config object
#[derive(Clone)]
pub struct LogEntry {
    pub config: Arc<dyn Config>,
    pub description: String,
}

#[derive(Default)]
struct ConfigState {
    log: Vec<LogEntry>,
    sets: BTreeMap<String, ConfigSet>,
    activated: BTreeSet<String>,
}

/// Context collecting config objects for a context hierarchy
pub struct ConfigContext {
    base: ContextBase,
    attributes_context: Arc<AttributesContext>,
    config_types: Arc<ConfigTypeScheme>,
    appliers: Arc<ConfigApplierRegistry>,
    state: Mutex<ConfigState>,
}

impl ConfigContext {
    /// Config context sharing the attributes of `attributes_context`.
    ///
    /// Use [`super::ConfigContextBuilder`] to also install the lazy updater
    /// on the attributes context.
    pub fn new(
        attributes_context: Arc<AttributesContext>,
        config_types: Arc<ConfigTypeScheme>,
        appliers: Arc<ConfigApplierRegistry>,
    ) -> Arc<Self> {
        let base = ContextBase::sharing(
            CONTEXT_TYPE,
            Arc::clone(attributes_context.attributes()),
            LoggingContext::child(attributes_context.logging_context()),
        );
        Arc::new(Self {
            base,
            attributes_context,
            config_types,
            appliers,
            state: Mutex::new(ConfigState::default()),
        })
    }

    fn lock_state(&self) -> ContextResult<MutexGuard<'_, ConfigState>> {
        self.state.lock().map_err(|_| ContextError::lock_poisoned())
    }

    pub fn attributes_context(&self) -> &Arc<AttributesContext> {
        &self.attributes_context
    }

    pub fn config_types(&self) -> &Arc<ConfigTypeScheme> {
        &self.config_types
    }

    pub fn appliers(&self) -> &Arc<ConfigApplierRegistry> {
        &self.appliers
    }

    pub fn logging(&self) -> &Arc<LoggingContext> {
        self.base.logging()
    }

    /// Number of config objects applied so far
    pub fn generation(&self) -> usize {
        self.state.lock().map(|s| s.log.len()).unwrap_or(0)
    }

    /// Decode a config object without applying it
    pub fn get_config_for_data(&self, data: &[u8], encoding: Encoding) -> ContextResult<Arc<dyn Config>> {
        self.config_types.decode(data, encoding)
    }

    /// Decode and apply a config object
    pub fn apply_data(
        &self,
        data: &[u8],
        encoding: Encoding,
        description: &str,
    ) -> ContextResult<Arc<dyn Config>> {
        let config = self.get_config_for_data(data, encoding)?;
        self.apply_config(Arc::clone(&config), description)?;
        Ok(config)
    }

    /// Record a config object in the log and apply it to this context.
    ///
    /// Configs not applicable to a config context are only recorded.
    pub fn apply_config(&self, config: Arc<dyn Config>, description: &str) -> ContextResult<()> {
        {
            let mut state = self.lock_state()?;
            state.log.push(LogEntry {
                config: Arc::clone(&config),
                description: description.to_string(),
            });
        }
        self.logging().event(
            Event::ConfigApplied,
            &[("config", config.get_type()), ("description", description)],
        );

        match config.apply_to(self, self) {
            Ok(()) => Ok(()),
            Err(e) if e.is_config_not_applicable() => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                self.logging().event(
                    Event::ConfigApplyFailed,
                    &[
                        ("config", config.get_type()),
                        ("description", description),
                        ("error", &msg),
                    ],
                );
                Err(e.wrap(format!("applying config {:?}", description)))
            }
        }
    }

    /// Apply the log entries from position `from` on to `target`.
    ///
    /// Returns the log length the replay covered together with the errors of
    /// entries that failed for other reasons than not being applicable.
    pub fn apply_to(&self, from: usize, target: &dyn Any) -> (usize, ContextResult<()>) {
        let (entries, generation) = match self.lock_state() {
            Ok(state) => {
                let start = from.min(state.log.len());
                (state.log[start..].to_vec(), state.log.len())
            }
            Err(e) => return (from, Err(e)),
        };

        let mut errors = ErrorList::new("applying config");
        for entry in entries {
            match entry.config.apply_to(self, target) {
                Ok(()) => {}
                Err(e) if e.is_config_not_applicable() => {}
                Err(e) => errors.push(e.wrap(entry.description.clone())),
            }
        }
        (generation, errors.result())
    }

    /// Replay the complete log onto `target`
    pub fn apply_all_to(&self, target: &dyn Any) -> ContextResult<()> {
        self.apply_to(0, target).1
    }

    /// Log entries as (config type, description)
    pub fn log_entries(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .map(|s| {
                s.log
                    .iter()
                    .map(|e| (e.config.get_type().to_string(), e.description.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Store a named config set; it stays inactive until activated
    pub fn add_config_set(&self, name: impl Into<String>, set: ConfigSet) -> ContextResult<()> {
        let mut state = self.lock_state()?;
        state.sets.insert(name.into(), set);
        Ok(())
    }

    pub fn get_config_set(&self, name: &str) -> ContextResult<Option<ConfigSet>> {
        Ok(self.lock_state()?.sets.get(name).cloned())
    }

    pub fn is_config_set_active(&self, name: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.activated.contains(name))
            .unwrap_or(false)
    }

    /// Apply the members of a named config set.
    ///
    /// Only the first activation of a name applies anything.
    pub fn apply_config_set(&self, name: &str) -> ContextResult<()> {
        let set = {
            let mut state = self.lock_state()?;
            if state.activated.contains(name) {
                return Ok(());
            }
            let set = state
                .sets
                .get(name)
                .cloned()
                .ok_or_else(|| ContextError::not_found(KIND_CONFIG_SET, name))?;
            state.activated.insert(name.to_string());
            set
        };
        self.logging().event(
            Event::ConfigSetActivated,
            &[("set", name), ("configs", &set.configurations().len().to_string())],
        );

        let mut errors = ErrorList::new(format!("applying config set {:?}", name));
        for (i, config) in set.configurations().iter().enumerate() {
            let config: Arc<dyn Config> = Arc::new(GenericConfig::clone(config));
            errors.add(self.apply_config(config, &format!("{}[{}]", name, i)));
        }
        errors.result()
    }
}

impl Context for ConfigContext {
    fn base(&self) -> &ContextBase {
        &self.base
    }
}
