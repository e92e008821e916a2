//! # Credentials
//!
//! Consumer identities, credentials and the repositories holding them.
//! A [`CredentialsContext`] resolves the credentials of a consumer by
//! asking its consumer providers for the best matching identity.

pub mod builtin;
pub mod config;
pub mod consumers;
pub mod context;
pub mod identity;
pub mod matcher;
pub mod properties;
pub mod provider;
pub mod repositories;
pub mod repository;
pub mod source;

pub use config::CredentialsConfig;
pub use context::{
    default_credentials_context, CredentialsContext, CredentialsContextBuilder, CONTEXT_TYPE,
    EXPLICIT_PROVIDER,
};
pub use identity::{ConsumerIdentity, ID_TYPE};
pub use matcher::{complete_match, no_match, partial_match, IdentityMatcher, IdentityMatcherRegistry};
pub use properties::Properties;
pub use provider::{ConsumerProvider, ConsumerProviderRegistry};
pub use repository::{
    downcast_repository, CredentialsSpec, GenericRepositorySpec, Repository, RepositorySpec,
    RepositoryTypeScheme,
};
pub use source::{Credentials, CredentialsChain, CredentialsSource, DirectCredentials};
