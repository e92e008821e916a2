//! # Repository Backends
//!
//! Standard repository types. Repository instances are cached per
//! attribute store, keyed by what identifies their backend.

pub mod aliases;
pub mod directcreds;
pub mod dockerconfig;
pub mod memory;
pub mod npm;
pub mod vault;

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::context::CredentialsContext;
use super::repository::{RepositoryCache, RepositoryTypeScheme};
use crate::errors::{ContextError, ContextResult};
use crate::observability::Event;

/// Cache of repositories of one type stored as attribute of the context
pub fn cache<R>(ctx: &CredentialsContext, attribute: &str) -> ContextResult<Arc<RepositoryCache<R>>>
where
    R: ?Sized + Send + Sync + 'static,
    RepositoryCache<R>: Any,
{
    ctx.attributes()
        .get_or_create(attribute, || Ok(RepositoryCache::<R>::new()))
}

pub(crate) fn log_created(ctx: &CredentialsContext, repository_type: &str, key: &str) {
    ctx.logging().event(
        Event::RepositoryCreated,
        &[("type", repository_type), ("key", key)],
    );
}

pub(crate) fn log_read_failed(ctx: &CredentialsContext, repository_type: &str, key: &str, err: &ContextError) {
    ctx.logging().event(
        Event::RepositoryReadFailed,
        &[("type", repository_type), ("key", key), ("error", &err.to_string())],
    );
}

/// Expand a leading `~/` to the home directory
pub fn resolve_path(path: &str) -> ContextResult<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var_os("HOME")
                .ok_or_else(|| ContextError::invalid(format!("path {:?}: no home directory", path)))?;
            Ok(PathBuf::from(home).join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read a backend file
pub(crate) fn read_file(path: &std::path::Path) -> ContextResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| ContextError::io(format!("reading {}", path.display()), e))
}

/// Hex SHA-256 of inline backend data, used as its cache key
pub(crate) fn data_key(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Register all standard repository types
pub fn register(scheme: &RepositoryTypeScheme) -> ContextResult<()> {
    memory::register(scheme)?;
    directcreds::register(scheme)?;
    aliases::register(scheme)?;
    dockerconfig::register(scheme)?;
    npm::register(scheme)?;
    vault::register(scheme)
}
