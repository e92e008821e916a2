//! Observability for context management
//!
//! - Structured logging (JSON lines)
//! - Logging contexts with realm rules, one per context
//! - Lifecycle events
//! - The `logging.config` config type
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. Logging never fails an operation
//! 3. No async or background threads
//! 4. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use ctxmgmt::observability::{Event, LoggingContext, Severity};
//!
//! let logging = LoggingContext::new();
//! logging.set_default_level(Severity::Info);
//! logging.event(Event::ConfigApplied, &[("config", "generic.config")]);
//! ```

mod context;
mod events;
mod logger;
pub mod config;

pub use config::LoggingConfig;
pub use context::{
    configure_once, static_logging_context, LoggingContext, LoggingSettings, RealmRuleSpec,
    DEFAULT_LEVEL, REALM,
};
pub use events::Event;
pub use logger::{LogSink, Logger, Severity};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_through_context() {
        let (sink, lines) = LogSink::memory();
        let logging = LoggingContext::new();
        logging.set_sink(sink);
        logging.set_default_level(Severity::Trace);
        logging.event(Event::ConfigApplied, &[("config", "generic.config")]);

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("CONFIG_APPLIED"));
        assert!(lines[0].contains("generic.config"));
    }
}
