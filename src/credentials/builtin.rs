//! Credentials seeded from the process environment
//!
//! With `GITHUB_TOKEN` set, the default credentials context knows the
//! GitHub container registry (`GITHUB_HOST`, default `ghcr.io`) with the
//! token as identity token and `GITHUB_REPOSITORY_OWNER` (default `any`)
//! as user name. Existing bindings for that registry are kept.

use std::sync::Arc;

use super::consumers::oci::{self, ATTR_IDENTITY_TOKEN, ATTR_USERNAME, ID_HOSTNAME};
use super::context::CredentialsContext;
use super::identity::ConsumerIdentity;
use super::properties::Properties;
use super::source::DirectCredentials;
use crate::errors::{ContextResult, KIND_CONSUMER};

pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_GITHUB_HOST: &str = "GITHUB_HOST";
pub const ENV_GITHUB_OWNER: &str = "GITHUB_REPOSITORY_OWNER";

/// Default host of the GitHub container registry
pub const GHCR_HOST: &str = "ghcr.io";

const ANY_USER: &str = "any";

/// Seed `ctx` from the given variable lookup.
///
/// Returns the seeded identity, or `None` if there was nothing to do.
pub fn seed_github<F>(ctx: &CredentialsContext, var: F) -> ContextResult<Option<ConsumerIdentity>>
where
    F: Fn(&str) -> Option<String>,
{
    let token = match var(ENV_GITHUB_TOKEN).filter(|t| !t.is_empty()) {
        Some(t) => t,
        None => return Ok(None),
    };
    let host = var(ENV_GITHUB_HOST)
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| GHCR_HOST.to_string());
    let user = var(ENV_GITHUB_OWNER)
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| ANY_USER.to_string());

    let id = ConsumerIdentity::new(oci::CONSUMER_TYPE).with(ID_HOSTNAME, host);
    match ctx.get_credentials_for_consumer(&id, None) {
        Ok(_) => return Ok(None),
        Err(e) if e.is_not_found_kind(KIND_CONSUMER) => {}
        Err(e) => return Err(e),
    }

    let mut props = Properties::new();
    props.set(ATTR_IDENTITY_TOKEN, token);
    props.set(ATTR_USERNAME, user);
    ctx.set_credentials_for_consumer(id.clone(), Arc::new(DirectCredentials::new(props)))?;
    Ok(Some(id))
}

/// Seed `ctx` from the process environment
pub fn seed_from_env(ctx: &CredentialsContext) -> ContextResult<()> {
    seed_github(ctx, |name| std::env::var(name).ok()).map(|_| ())
}
