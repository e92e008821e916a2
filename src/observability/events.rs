//! Observable lifecycle events
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events of contexts and their registries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Context lifecycle
    /// Context created
    ContextCreated,
    /// Context finalized explicitly
    ContextFinalized,
    /// Last view dropped without finalization
    ContextLeaked,

    // Configuration
    /// Config object appended and applied
    ConfigApplied,
    /// Config object failed to apply
    ConfigApplyFailed,
    /// Config set activated
    ConfigSetActivated,
    /// Updater replayed pending config objects
    UpdateReplayed,
    /// Logging settings applied
    LoggingConfigured,

    // Credentials
    /// Repository instance created
    RepositoryCreated,
    /// Consumer provider registered or replaced
    ConsumerProviderRegistered,
    /// Credentials resolved for a consumer
    CredentialsResolved,
    /// Backend state could not be read
    RepositoryReadFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ContextCreated => "CONTEXT_CREATED",
            Event::ContextFinalized => "CONTEXT_FINALIZED",
            Event::ContextLeaked => "CONTEXT_LEAKED",

            Event::ConfigApplied => "CONFIG_APPLIED",
            Event::ConfigApplyFailed => "CONFIG_APPLY_FAILED",
            Event::ConfigSetActivated => "CONFIG_SET_ACTIVATED",
            Event::UpdateReplayed => "UPDATE_REPLAYED",
            Event::LoggingConfigured => "LOGGING_CONFIGURED",

            Event::RepositoryCreated => "REPOSITORY_CREATED",
            Event::ConsumerProviderRegistered => "CONSUMER_PROVIDER_REGISTERED",
            Event::CredentialsResolved => "CREDENTIALS_RESOLVED",
            Event::RepositoryReadFailed => "REPOSITORY_READ_FAILED",
        }
    }

    /// Severity the event is logged with
    pub fn severity(&self) -> Severity {
        match self {
            Event::ContextLeaked | Event::ConfigApplyFailed => Severity::Warn,
            Event::RepositoryReadFailed => Severity::Error,
            Event::ContextCreated | Event::UpdateReplayed | Event::CredentialsResolved => {
                Severity::Trace
            }
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
