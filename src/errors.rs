//! # Context Errors
//!
//! Error taxonomy shared by the scheme, credential and config subsystems.
//!
//! Classification:
//! - `UnknownType`: unregistered kind at decode/apply time (recoverable)
//! - `NotFound`: named credentials, repository, alias or config set absent
//! - `NotSupported`: write against a read-only backend
//! - `Invalid`: malformed specification
//! - `NoContext`: object applied to a target lacking the expected capability
//!
//! Aggregate operations collect member errors into an [`ErrorList`].

use std::fmt;
use std::io;

use thiserror::Error;

/// Kind used for unregistered object types in a scheme
pub const KIND_OBJECT_TYPE: &str = "object type";

/// Kind used for unregistered config types
pub const KIND_CONFIG_TYPE: &str = "config type";

/// Kind used for unknown config appliers
pub const KIND_CONFIG_APPLIER: &str = "config applier";

/// Kind used for unknown config sets
pub const KIND_CONFIG_SET: &str = "config set";

/// Kind used for unregistered repository types
pub const KIND_REPOSITORY_TYPE: &str = "repository type";

/// Kind used for missing credentials
pub const KIND_CREDENTIALS: &str = "credentials";

/// Kind used for missing repositories
pub const KIND_REPOSITORY: &str = "repository";

/// Kind used when no consumer binding matched
pub const KIND_CONSUMER: &str = "consumer";

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;

/// Errors raised by context management operations
#[derive(Debug, Error)]
pub enum ContextError {
    /// A type name is not registered (yet)
    #[error("{kind} {name:?} is unknown")]
    UnknownType { kind: String, name: String },

    /// A named element does not exist
    #[error("{kind} {name:?} not found{}", location_suffix(.location))]
    NotFound {
        kind: String,
        name: String,
        location: Option<String>,
    },

    /// Operation not supported by the backend
    #[error("{operation} not supported for {kind} by {backend}")]
    NotSupported {
        operation: String,
        kind: String,
        backend: String,
    },

    /// Malformed specification or argument
    #[error("invalid {0}")]
    Invalid(String),

    /// Target lacks the capability expected by a config object
    #[error("unknown context {0:?}")]
    NoContext(String),

    /// Backend I/O failure
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Serialization failure
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error annotated with the operation it occurred in
    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<ContextError>,
    },

    /// Errors collected by an aggregate operation
    #[error("{0}")]
    List(ErrorList),

    /// Internal failure (poisoned locks)
    #[error("internal error: {0}")]
    Internal(String),
}

fn location_suffix(location: &Option<String>) -> String {
    match location {
        Some(l) => format!(" in {}", l),
        None => String::new(),
    }
}

impl ContextError {
    pub fn unknown_type(kind: impl Into<String>, name: impl Into<String>) -> Self {
        ContextError::UnknownType {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        ContextError::NotFound {
            kind: kind.into(),
            name: name.into(),
            location: None,
        }
    }

    pub fn not_found_in(
        kind: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        ContextError::NotFound {
            kind: kind.into(),
            name: name.into(),
            location: Some(location.into()),
        }
    }

    pub fn not_supported(
        operation: impl Into<String>,
        kind: impl Into<String>,
        backend: impl Into<String>,
    ) -> Self {
        ContextError::NotSupported {
            operation: operation.into(),
            kind: kind.into(),
            backend: backend.into(),
        }
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        ContextError::Invalid(what.into())
    }

    pub fn no_context(name: impl Into<String>) -> Self {
        ContextError::NoContext(name.into())
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        ContextError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn lock_poisoned() -> Self {
        ContextError::Internal("Lock poisoned".to_string())
    }

    /// Annotate the error with a description of the failed operation
    pub fn wrap(self, context: impl Into<String>) -> Self {
        ContextError::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error below all wrappers
    pub fn root(&self) -> &ContextError {
        match self {
            ContextError::Wrapped { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this is an unknown-type error of the given kind
    pub fn is_unknown_kind(&self, kind: &str) -> bool {
        matches!(self.root(), ContextError::UnknownType { kind: k, .. } if k == kind)
    }

    /// Whether this is any unknown-type error
    pub fn is_unknown_type(&self) -> bool {
        matches!(self.root(), ContextError::UnknownType { .. })
    }

    /// Whether a named element is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), ContextError::NotFound { .. })
    }

    /// Whether a named element of the given kind is absent
    pub fn is_not_found_kind(&self, kind: &str) -> bool {
        matches!(self.root(), ContextError::NotFound { kind: k, .. } if k == kind)
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self.root(), ContextError::NotSupported { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.root(), ContextError::Invalid(_))
    }

    pub fn is_no_context(&self) -> bool {
        matches!(self.root(), ContextError::NoContext(_))
    }

    /// Whether the error only says that a config does not apply to a target.
    ///
    /// Aggregate appliers skip such entries instead of failing.
    pub fn is_config_not_applicable(&self) -> bool {
        self.is_unknown_kind(KIND_CONFIG_TYPE) || self.is_no_context()
    }
}

/// Extension for annotating results
pub trait ResultExt<T> {
    fn context(self, context: impl FnOnce() -> String) -> ContextResult<T>;
}

impl<T> ResultExt<T> for ContextResult<T> {
    fn context(self, context: impl FnOnce() -> String) -> ContextResult<T> {
        self.map_err(|e| e.wrap(context()))
    }
}

/// Collects the errors of an aggregate operation.
///
/// Every member error is kept, so one failing entry never hides another.
#[derive(Debug, Default)]
pub struct ErrorList {
    message: String,
    errors: Vec<ContextError>,
}

impl ErrorList {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// Record the error of a member result, if any
    pub fn add<T>(&mut self, result: ContextResult<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    pub fn push(&mut self, err: ContextError) {
        self.errors.push(err);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ContextError] {
        &self.errors
    }

    /// Ok if nothing was collected, otherwise the combined report
    pub fn result(self) -> ContextResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ContextError::List(self))
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        match self.errors.len() {
            0 => Ok(()),
            1 => write!(f, ": {}", self.errors[0]),
            _ => {
                write!(f, ": {{")?;
                for (i, e) in self.errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "}}")
            }
        }
    }
}
