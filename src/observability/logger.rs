//! Structured JSON log lines
//!
//! - Deterministic key ordering: event, severity, then fields sorted by key
//! - One log line = one event
//! - Synchronous, no buffering

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::errors::ContextError;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable
    Fatal = 4,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" | "debug" => Ok(Severity::Trace),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            "fatal" => Ok(Severity::Fatal),
            _ => Err(ContextError::invalid(format!("log level {:?}", s))),
        }
    }
}

/// Destination of log lines
#[derive(Debug, Clone)]
pub enum LogSink {
    /// stdout, or stderr for errors
    Console,
    /// Lines collected in memory
    Memory(Arc<Mutex<Vec<String>>>),
    /// Lines are dropped
    Discard,
}

impl LogSink {
    /// A memory sink and the buffer it writes to
    pub fn memory() -> (Self, Arc<Mutex<Vec<String>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        (LogSink::Memory(Arc::clone(&buffer)), buffer)
    }

    pub fn write(&self, severity: Severity, line: &str) {
        match self {
            LogSink::Console if severity >= Severity::Error => {
                write_line(&mut io::stderr(), line);
            }
            LogSink::Console => write_line(&mut io::stdout(), line),
            LogSink::Memory(buffer) => {
                if let Ok(mut b) = buffer.lock() {
                    b.push(line.trim_end().to_string());
                }
            }
            LogSink::Discard => {}
        }
    }
}

fn write_line<W: Write>(writer: &mut W, line: &str) {
    // one write per line
    let _ = writer.write_all(line.as_bytes());
    let _ = writer.flush();
}

/// Formatter for structured log lines
pub struct Logger;

impl Logger {
    /// Render one JSON log line, terminated by a newline.
    ///
    /// Fields are output in deterministic order (alphabetical by key).
    pub fn format(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut output = String::with_capacity(256);

        output.push('{');

        output.push_str("\"event\":\"");
        Self::escape_json_string(&mut output, event);
        output.push('"');

        output.push_str(",\"severity\":\"");
        output.push_str(severity.as_str());
        output.push('"');

        let mut sorted_fields: Vec<_> = fields.iter().collect();
        sorted_fields.sort_by_key(|(k, _)| *k);

        for (key, value) in sorted_fields {
            output.push_str(",\"");
            Self::escape_json_string(&mut output, key);
            output.push_str("\":\"");
            Self::escape_json_string(&mut output, value);
            output.push('"');
        }

        output.push('}');
        output.push('\n');
        output
    }

    fn escape_json_string(output: &mut String, s: &str) {
        for c in s.chars() {
            match c {
                '"' => output.push_str("\\\""),
                '\\' => output.push_str("\\\\"),
                '\n' => output.push_str("\\n"),
                '\r' => output.push_str("\\r"),
                '\t' => output.push_str("\\t"),
                c if c.is_control() => {
                    output.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => output.push(c),
            }
        }
    }
}
