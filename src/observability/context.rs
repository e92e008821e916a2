//! # Logging Contexts
//!
//! Every data context owns a logging context. A logging context has a
//! default level, per-realm rules and a sink; anything not set locally is
//! inherited from the parent. Realms are `/` separated names, a rule for
//! `a` also covers `a/b`.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::events::Event;
use super::logger::{LogSink, Logger, Severity};
use crate::errors::{ContextError, ContextResult};

/// Realm used for all library events
pub const REALM: &str = "ctxmgmt";

/// Level used if no context in the chain defines one
pub const DEFAULT_LEVEL: Severity = Severity::Warn;

#[derive(Debug, Clone, PartialEq, Eq)]
struct RealmRule {
    realm: String,
    level: Severity,
}

#[derive(Debug, Default)]
struct LoggingState {
    level: Option<Severity>,
    rules: Vec<RealmRule>,
    sink: Option<LogSink>,
}

/// Hierarchical logging configuration
#[derive(Debug, Default)]
pub struct LoggingContext {
    parent: Option<Arc<LoggingContext>>,
    state: RwLock<LoggingState>,
}

impl LoggingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context inheriting everything not set locally from `parent`
    pub fn child(parent: &Arc<LoggingContext>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            state: RwLock::new(LoggingState::default()),
        })
    }

    pub fn set_default_level(&self, level: Severity) {
        if let Ok(mut s) = self.state.write() {
            s.level = Some(level);
        }
    }

    /// Set the level for a realm and its sub realms
    pub fn set_rule(&self, realm: impl Into<String>, level: Severity) {
        let realm = realm.into();
        if let Ok(mut s) = self.state.write() {
            match s.rules.iter_mut().find(|r| r.realm == realm) {
                Some(rule) => rule.level = level,
                None => s.rules.push(RealmRule { realm, level }),
            }
        }
    }

    pub fn set_sink(&self, sink: LogSink) {
        if let Ok(mut s) = self.state.write() {
            s.sink = Some(sink);
        }
    }

    /// Drop all local settings
    pub fn reset(&self) {
        if let Ok(mut s) = self.state.write() {
            s.level = None;
            s.rules.clear();
        }
    }

    fn rule_level(&self, realm: &str) -> Option<Severity> {
        let local = self.state.read().ok().and_then(|s| {
            s.rules
                .iter()
                .filter(|r| realm_covers(&r.realm, realm))
                .max_by_key(|r| r.realm.len())
                .map(|r| r.level)
        });
        local.or_else(|| self.parent.as_ref().and_then(|p| p.rule_level(realm)))
    }

    fn default_level(&self) -> Severity {
        let local = self.state.read().ok().and_then(|s| s.level);
        match (local, &self.parent) {
            (Some(l), _) => l,
            (None, Some(p)) => p.default_level(),
            (None, None) => DEFAULT_LEVEL,
        }
    }

    fn sink(&self) -> LogSink {
        let local = self.state.read().ok().and_then(|s| s.sink.clone());
        match (local, &self.parent) {
            (Some(s), _) => s,
            (None, Some(p)) => p.sink(),
            (None, None) => LogSink::Console,
        }
    }

    /// Effective level of a realm
    pub fn level(&self, realm: &str) -> Severity {
        self.rule_level(realm).unwrap_or_else(|| self.default_level())
    }

    pub fn enabled(&self, realm: &str, severity: Severity) -> bool {
        severity >= self.level(realm)
    }

    /// Log a line if the realm's level allows it
    pub fn log(&self, realm: &str, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !self.enabled(realm, severity) {
            return;
        }
        let mut all: Vec<(&str, &str)> = Vec::with_capacity(fields.len() + 1);
        all.push(("realm", realm));
        all.extend_from_slice(fields);
        self.sink().write(severity, &Logger::format(severity, event, &all));
    }

    /// Log a lifecycle event with its default severity in the library realm
    pub fn event(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(REALM, event.severity(), event.as_str(), fields);
    }

    /// Apply declarative settings
    pub fn apply_settings(&self, settings: &LoggingSettings) -> ContextResult<()> {
        if let Some(level) = &settings.default_level {
            self.set_default_level(level.parse()?);
        }
        for rule in &settings.rules {
            if rule.realm.is_empty() {
                return Err(ContextError::invalid("logging rule: missing realm"));
            }
            self.set_rule(rule.realm.clone(), rule.level.parse()?);
        }
        Ok(())
    }
}

fn realm_covers(rule: &str, realm: &str) -> bool {
    realm == rule || (realm.starts_with(rule) && realm[rule.len()..].starts_with('/'))
}

/// Serialized logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_level: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RealmRuleSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmRuleSpec {
    pub realm: String,
    pub level: String,
}

impl LoggingSettings {
    /// Content hash of the settings combined with an extra id
    pub fn digest(&self, extra_id: &str) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hasher.update([0u8]);
        hasher.update(extra_id.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Process-wide root logging context
pub fn static_logging_context() -> &'static Arc<LoggingContext> {
    static CONTEXT: OnceLock<Arc<LoggingContext>> = OnceLock::new();
    CONTEXT.get_or_init(|| Arc::new(LoggingContext::new()))
}

fn applied_settings() -> &'static Mutex<BTreeSet<String>> {
    static APPLIED: OnceLock<Mutex<BTreeSet<String>>> = OnceLock::new();
    APPLIED.get_or_init(|| Mutex::new(BTreeSet::new()))
}

/// Apply settings to the static context once per content hash and extra id.
///
/// Returns whether the settings were applied.
pub fn configure_once(settings: &LoggingSettings, extra_id: &str) -> ContextResult<bool> {
    let digest = settings.digest(extra_id);
    let mut applied = applied_settings()
        .lock()
        .map_err(|_| ContextError::lock_poisoned())?;
    if applied.contains(&digest) {
        return Ok(false);
    }
    static_logging_context().apply_settings(settings)?;
    applied.insert(digest.clone());
    static_logging_context().event(Event::LoggingConfigured, &[("digest", &digest)]);
    Ok(true)
}
