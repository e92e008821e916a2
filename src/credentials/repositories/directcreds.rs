//! Credentials given directly as properties of the repository specification

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::credentials::context::CredentialsContext;
use crate::credentials::properties::Properties;
use crate::credentials::repository::{
    CredentialsSpec, Repository, RepositorySpec, RepositoryTypeScheme,
};
use crate::credentials::source::{Credentials, CredentialsSource, DirectCredentials};
use crate::errors::{ContextError, ContextResult, KIND_CREDENTIALS};
use crate::runtime::{ObjectType, VersionedTypedObject};

pub const REPOSITORY_TYPE: &str = "Credentials";
pub const REPOSITORY_TYPE_V1: &str = "Credentials/v1";

/// Repository holding exactly one credential set
#[derive(Debug)]
pub struct DirectRepository(DirectCredentials);

impl DirectRepository {
    pub fn new(props: Properties) -> Self {
        Self(DirectCredentials::new(props))
    }

    fn is_own_name(name: &str) -> bool {
        name.is_empty() || name == REPOSITORY_TYPE
    }
}

impl Repository for DirectRepository {
    fn exists_credentials(&self, name: &str) -> ContextResult<bool> {
        Ok(Self::is_own_name(name))
    }

    fn lookup_credentials(&self, name: &str) -> ContextResult<Arc<dyn Credentials>> {
        if !Self::is_own_name(name) {
            return Err(ContextError::not_found_in(
                KIND_CREDENTIALS,
                name,
                "direct credentials",
            ));
        }
        Ok(Arc::new(self.0.clone()))
    }

    fn write_credentials(
        &self,
        _name: &str,
        _creds: &dyn Credentials,
    ) -> ContextResult<Arc<dyn Credentials>> {
        Err(ContextError::not_supported("write", KIND_CREDENTIALS, REPOSITORY_TYPE))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectRepositorySpec {
    #[serde(rename = "type")]
    pub repository_type: String,
    #[serde(default)]
    pub properties: Properties,
}

impl DirectRepositorySpec {
    pub fn new(properties: Properties) -> Self {
        Self {
            repository_type: REPOSITORY_TYPE.to_string(),
            properties,
        }
    }
}

impl VersionedTypedObject for DirectRepositorySpec {
    fn get_type(&self) -> &str {
        &self.repository_type
    }
}

impl RepositorySpec for DirectRepositorySpec {
    fn repository(
        &self,
        _ctx: &CredentialsContext,
        _creds: Option<&dyn Credentials>,
    ) -> ContextResult<Arc<dyn Repository>> {
        Ok(Arc::new(DirectRepository::new(self.properties.clone())))
    }
}

impl CredentialsSource for DirectRepositorySpec {
    fn credentials(&self, _ctx: &CredentialsContext) -> ContextResult<Arc<dyn Credentials>> {
        Ok(Arc::new(DirectCredentials::new(self.properties.clone())))
    }
}

/// Credentials specification for the given properties
pub fn direct_credentials_spec(props: Properties) -> ContextResult<CredentialsSpec> {
    CredentialsSpec::new(REPOSITORY_TYPE, &DirectRepositorySpec::new(props))
}

pub fn register(scheme: &RepositoryTypeScheme) -> ContextResult<()> {
    scheme.register_type(
        ObjectType::new(REPOSITORY_TYPE, |s: DirectRepositorySpec| {
            Arc::new(s) as Arc<dyn RepositorySpec>
        })
        .with_description(
            "Credentials given directly by the specification.\n\
             Fields: properties (credential properties).",
        ),
        &[REPOSITORY_TYPE_V1],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Encoding;

    #[test]
    fn test_credentials_spec_resolves_properties() {
        let ctx = CredentialsContext::builder().build().unwrap();
        let spec = direct_credentials_spec(Properties::from([("user", "u")])).unwrap();
        let creds = ctx.credentials_for_spec(&spec).unwrap();
        assert_eq!(creds.get_property("user").as_deref(), Some("u"));
    }

    #[test]
    fn test_decoded_from_wire_format() {
        let ctx = CredentialsContext::builder().build().unwrap();
        let creds = ctx
            .credentials_for_config(
                br#"{"type":"Credentials/v1","credentialsName":"Credentials","properties":{"token":"t"}}"#,
                Encoding::Json,
            )
            .unwrap();
        assert_eq!(creds.get_property("token").as_deref(), Some("t"));
    }

    #[test]
    fn test_read_only() {
        let repo = DirectRepository::new(Properties::new());
        assert!(repo.exists_credentials("").unwrap());
        assert!(!repo.exists_credentials("other").unwrap());
        assert!(repo
            .lookup_credentials("other")
            .unwrap_err()
            .is_not_found_kind(KIND_CREDENTIALS));
        let err = repo
            .write_credentials("x", &DirectCredentials::simple("a", "b"))
            .unwrap_err();
        assert!(err.is_not_supported());
    }
}
