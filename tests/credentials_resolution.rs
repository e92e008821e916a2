//! Credential Resolution Tests
//!
//! End-to-end resolution of consumer credentials:
//! - Repository aliases and credential specifications
//! - Consumer bindings declared through config objects
//! - Identity matching and credential chains
//! - File backed repositories propagating consumer identities
//! - Vault repositories behind a registered client

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use tempfile::TempDir;

use ctxmgmt::credentials::consumers::{npm, oci, vault as vault_consumer};
use ctxmgmt::credentials::repositories::aliases::AliasRepositorySpec;
use ctxmgmt::credentials::repositories::dockerconfig::DockerConfigRepositorySpec;
use ctxmgmt::credentials::repositories::memory::MemoryRepositorySpec;
use ctxmgmt::credentials::repositories::npm::NpmConfigRepositorySpec;
use ctxmgmt::credentials::repositories::vault::{register_client, InMemoryVaultServer, VaultSecret};
use ctxmgmt::credentials::{
    complete_match, partial_match, ConsumerIdentity, Credentials, CredentialsChain,
    CredentialsContext, CredentialsSource, CredentialsSpec, DirectCredentials, Properties,
};
use ctxmgmt::runtime::Encoding;

fn context() -> Arc<CredentialsContext> {
    CredentialsContext::builder().build().unwrap()
}

fn props(pairs: &[(&str, &str)]) -> Properties {
    pairs.iter().copied().collect()
}

fn bind(ctx: &CredentialsContext, id: &ConsumerIdentity, pairs: &[(&str, &str)]) {
    ctx.set_credentials_for_consumer(id.clone(), Arc::new(DirectCredentials::new(props(pairs))))
        .unwrap();
}

// =============================================================================
// Repositories and Aliases
// =============================================================================

/// Credentials written to a memory repository resolve through an alias.
#[test]
fn test_alias_to_memory_repository() {
    let ctx = context();
    let repo = ctx
        .repository_for_spec(&MemoryRepositorySpec::new("default"), None)
        .unwrap();
    repo.write_credentials(
        "direct",
        &DirectCredentials::new(props(&[("user", "USER"), ("password", "PASSWORD")])),
    )
    .unwrap();

    ctx.set_alias("alias", &MemoryRepositorySpec::new("default"), None)
        .unwrap();
    let spec = CredentialsSpec::new("direct", &AliasRepositorySpec::new("alias")).unwrap();
    let creds = ctx.credentials_for_spec(&spec).unwrap();

    assert_eq!(
        creds.properties(),
        props(&[("user", "USER"), ("password", "PASSWORD")])
    );
}

/// A credentials specification decodes from its JSON envelope.
#[test]
fn test_credentials_for_config() {
    let ctx = context();
    let repo = ctx
        .repository_for_spec(&MemoryRepositorySpec::new("envelope"), None)
        .unwrap();
    repo.write_credentials("c", &DirectCredentials::new(props(&[("token", "t")])))
        .unwrap();

    let creds = ctx
        .credentials_for_config(
            br#"{"type":"Memory/v1","repoName":"envelope","credentialsName":"c"}"#,
            Encoding::Json,
        )
        .unwrap();
    assert_eq!(creds.get_property("token").as_deref(), Some("t"));
}

/// Memory repositories are live: later writes are visible to earlier lookups.
#[test]
fn test_memory_credentials_are_live() {
    let ctx = context();
    let repo = ctx
        .repository_for_spec(&MemoryRepositorySpec::new("live"), None)
        .unwrap();
    repo.write_credentials("c", &DirectCredentials::new(props(&[("token", "old")])))
        .unwrap();
    let creds = repo.lookup_credentials("c").unwrap();

    repo.write_credentials("c", &DirectCredentials::new(props(&[("token", "new")])))
        .unwrap();
    assert_eq!(creds.get_property("token").as_deref(), Some("new"));
}

// =============================================================================
// Consumer Bindings through Config
// =============================================================================

/// Consumers nested in a generic config list reach the credentials context.
#[test]
fn test_generic_list_declares_consumers() {
    let ctx = context();
    let data = json!({
        "type": "generic/v1",
        "configurations": [{
            "type": "credentials.config/v1",
            "consumers": [{
                "identity": {"type": "mytype", "host": "localhost"},
                "credentials": [{"type": "Credentials", "properties": {"token": "t"}}]
            }]
        }]
    });
    ctx.config_context()
        .apply_data(data.to_string().as_bytes(), Encoding::Json, "generic")
        .unwrap();

    let id = ConsumerIdentity::new("mytype").with("host", "localhost");
    let creds = ctx.required_credentials_for_consumer(&id, None).unwrap();
    assert_eq!(creds.get_property("token").as_deref(), Some("t"));
}

/// Unknown consumers give no credentials; the required variant fails.
#[test]
fn test_unknown_consumer() {
    let ctx = context();
    let id = ConsumerIdentity::new("mytype").with("host", "nowhere");
    assert!(ctx.credentials_for_consumer(&id, None).unwrap().is_none());
    assert!(ctx
        .required_credentials_for_consumer(&id, None)
        .unwrap_err()
        .is_not_found());
}

/// Several credential specs of one consumer are merged in order.
#[test]
fn test_consumer_with_several_specs() {
    let ctx = context();
    let data = json!({
        "type": "credentials.config",
        "consumers": [{
            "identity": {"type": "mytype", "host": "merged"},
            "credentials": [
                {"type": "Credentials", "properties": {"user": "x", "scope": "read"}},
                {"type": "Credentials", "properties": {"user": "y", "password": "z"}}
            ]
        }]
    });
    ctx.config_context()
        .apply_data(data.to_string().as_bytes(), Encoding::Json, "merged")
        .unwrap();

    let id = ConsumerIdentity::new("mytype").with("host", "merged");
    let creds = ctx.required_credentials_for_consumer(&id, None).unwrap();
    assert_eq!(
        creds.properties(),
        props(&[("user", "y"), ("password", "z"), ("scope", "read")])
    );
}

// =============================================================================
// Matching and Chains
// =============================================================================

/// Complete matching ignores a more specific superset candidate.
#[test]
fn test_complete_match_prefers_exact_identity() {
    let ctx = context();
    let exact = ConsumerIdentity::new("t").with("host", "h");
    let superset = exact.clone().with("port", "1");
    bind(&ctx, &exact, &[("which", "exact")]);
    bind(&ctx, &superset, &[("which", "superset")]);

    let creds = ctx
        .required_credentials_for_consumer(&exact, Some(&complete_match))
        .unwrap();
    assert_eq!(creds.get_property("which").as_deref(), Some("exact"));
}

/// Partial matching prefers the most specific candidate.
#[test]
fn test_partial_match_prefers_most_attributes() {
    let ctx = context();
    let generic = ConsumerIdentity::new("t").with("host", "h");
    let specific = generic.clone().with("port", "1");
    bind(&ctx, &specific, &[("which", "specific")]);
    bind(&ctx, &generic, &[("which", "generic")]);

    let creds = ctx
        .required_credentials_for_consumer(&specific.clone().with("path", "p"), Some(&partial_match))
        .unwrap();
    assert_eq!(creds.get_property("which").as_deref(), Some("specific"));
}

/// Equally specific candidates: the later registration wins.
#[test]
fn test_partial_match_tie_goes_to_later_registration() {
    let ctx = context();
    let a = ConsumerIdentity::new("t").with("host", "h").with("a", "1");
    let b = ConsumerIdentity::new("t").with("host", "h").with("b", "2");
    bind(&ctx, &a, &[("which", "a")]);
    bind(&ctx, &b, &[("which", "b")]);

    let requested = ConsumerIdentity::new("t")
        .with("host", "h")
        .with("a", "1")
        .with("b", "2");
    let creds = ctx
        .required_credentials_for_consumer(&requested, Some(&partial_match))
        .unwrap();
    assert_eq!(creds.get_property("which").as_deref(), Some("b"));
}

/// Later sources of a chain override earlier ones.
#[test]
fn test_chain_later_source_overrides() {
    let ctx = context();
    let chain = CredentialsChain::new(vec![
        Arc::new(DirectCredentials::new(props(&[("user", "x")]))) as Arc<dyn CredentialsSource>,
        Arc::new(DirectCredentials::new(props(&[("user", "y"), ("pass", "z")]))),
    ]);
    let creds = chain.credentials(&ctx).unwrap();
    assert_eq!(creds.properties(), props(&[("user", "y"), ("pass", "z")]));
}

/// OCI identities match registered path prefixes segment-wise.
#[test]
fn test_oci_path_prefix_matching() {
    let ctx = context();
    bind(&ctx, &oci::consumer_id("ghcr.io", ""), &[("which", "host")]);
    bind(&ctx, &oci::consumer_id("ghcr.io", "acme"), &[("which", "acme")]);

    let creds = ctx
        .required_credentials_for_consumer(&oci::consumer_id("ghcr.io", "acme/app"), None)
        .unwrap();
    assert_eq!(creds.get_property("which").as_deref(), Some("acme"));

    let creds = ctx
        .required_credentials_for_consumer(&oci::consumer_id("ghcr.io", "acmeother/app"), None)
        .unwrap();
    assert_eq!(creds.get_property("which").as_deref(), Some("host"));
}

// =============================================================================
// File Backed Repositories
// =============================================================================

/// Docker config registries become OCI registry consumers.
#[test]
fn test_docker_config_propagates_registries() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    let config = json!({"auths": {"https://ghcr.io/v2/": {"auth": STANDARD.encode("me:secret")}}});
    fs::write(&path, config.to_string()).unwrap();

    let ctx = context();
    let spec = DockerConfigRepositorySpec::new(path.display().to_string());
    let repo = ctx.repository_for_spec(&spec, None).unwrap();
    assert!(repo.exists_credentials("https://ghcr.io/v2/").unwrap());

    let creds = ctx
        .required_credentials_for_consumer(&oci::consumer_id("ghcr.io", "acme/app"), None)
        .unwrap();
    assert_eq!(creds.get_property("username").as_deref(), Some("me"));
    assert_eq!(creds.get_property("password").as_deref(), Some("secret"));
}

/// Without propagation the docker config only serves as repository.
#[test]
fn test_docker_config_without_propagation() {
    let ctx = context();
    let spec = DockerConfigRepositorySpec::for_config(
        json!({"auths": {"quay.io": {"username": "u", "password": "p"}}}),
    )
    .with_consumer_propagation(false);
    let repo = ctx.repository_for_spec(&spec, None).unwrap();
    assert!(repo.exists_credentials("quay.io").unwrap());

    let found = ctx
        .credentials_for_consumer(&oci::consumer_id("quay.io", ""), None)
        .unwrap();
    assert!(found.is_none());
}

/// npmrc auth tokens serve NPM consumers of the registry.
#[test]
fn test_npmrc_propagates_registries() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(".npmrc");
    fs::write(
        &path,
        "# tokens\n//registry.npmjs.org/:_authToken=npm-token\n",
    )
    .unwrap();

    let ctx = context();
    let data = json!({
        "type": "credentials.config",
        "repositories": [{"repository": {"type": "NPMConfig", "npmrcFile": path.display().to_string()}}]
    });
    ctx.config_context()
        .apply_data(data.to_string().as_bytes(), Encoding::Json, "npmrc")
        .unwrap();

    let id = npm::consumer_id("https://registry.npmjs.org/", "lodash").unwrap();
    let creds = ctx.required_credentials_for_consumer(&id, None).unwrap();
    assert_eq!(creds.get_property("token").as_deref(), Some("npm-token"));
}

/// Read-only backends reject writes.
#[test]
fn test_file_repositories_are_read_only() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(".npmrc");
    fs::write(&path, "//registry.acme.com/:_authToken=t\n").unwrap();

    let ctx = context();
    let repo = ctx
        .repository_for_spec(&NpmConfigRepositorySpec::new(path.display().to_string()), None)
        .unwrap();
    let err = repo
        .write_credentials("x", &DirectCredentials::new(props(&[("token", "t")])))
        .unwrap_err();
    assert!(err.is_not_supported());
}

/// A missing npmrc file is reported as I/O failure.
#[test]
fn test_missing_npmrc_file() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = context();
    let spec = NpmConfigRepositorySpec::new(temp_dir.path().join("none").display().to_string());
    assert!(ctx.repository_for_spec(&spec, None).is_err());
}

// =============================================================================
// Vault
// =============================================================================

const VAULT: &str = "https://vault.acme.com";

/// Access credentials are declared before the vault repository that
/// needs them; secrets with a consumer id serve that consumer.
#[test]
fn test_vault_repository_from_config() {
    let server = InMemoryVaultServer::new();
    server.add_token("root-token");
    server.set_secret(
        "",
        "secret",
        "apps/registry",
        VaultSecret {
            data: props(&[("username", "bot"), ("password", "pw")]),
            metadata: BTreeMap::from([("consumerId".to_string(), r#"{"type":"OCIRegistry","hostname":"registry.acme.com"}"#.to_string())]),
        },
    );

    let ctx = context();
    register_client(&ctx, VAULT, Arc::new(server)).unwrap();

    let access = vault_consumer::consumer_id(VAULT, "", "secret", "").unwrap();
    let consumers = json!({
        "type": "credentials.config",
        "consumers": [{
            "identity": access,
            "credentials": [{"type": "Credentials", "properties": {"token": "root-token"}}]
        }]
    });
    let repositories = json!({
        "type": "credentials.config",
        "repositories": [{
            "repository": {"type": "HashiCorpVault", "serverURL": VAULT, "mountPath": "secret", "path": "apps"}
        }]
    });
    for (data, desc) in [(consumers, "vault access"), (repositories, "vault")] {
        ctx.config_context()
            .apply_data(data.to_string().as_bytes(), Encoding::Json, desc)
            .unwrap();
    }

    let creds = ctx
        .required_credentials_for_consumer(&oci::consumer_id("registry.acme.com", "team/app"), None)
        .unwrap();
    assert_eq!(creds.get_property("username").as_deref(), Some("bot"));
}
