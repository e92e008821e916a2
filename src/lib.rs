//! ctxmgmt - context management for typed configuration and credentials
//!
//! - `runtime`: versioned typed objects and the schemes decoding them
//! - `datacontext`: context lifecycle and attribute storage
//! - `config`: config objects, config contexts and lazy updates
//! - `credentials`: consumer identities resolved to credentials
//! - `observability`: structured logging

pub mod cli;
pub mod config;
pub mod credentials;
pub mod datacontext;
pub mod errors;
pub mod observability;
pub mod plugins;
pub mod runtime;

pub use errors::{ContextError, ContextResult};
