//! CLI command implementations
//!
//! Every command works on a new credentials context built in extended
//! mode, so the standard types are known and nothing leaks into the
//! process defaults. Commands return their report as JSON; `run_command`
//! writes it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::credentials::{ConsumerIdentity, CredentialsContext};
use crate::datacontext::{BuilderMode, Context, ContextView};
use crate::observability::{static_logging_context, Severity, REALM};
use crate::plugins;
use crate::runtime::{Encoding, TypedObjectDecoder};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    if let Some(level) = &cli.log_level {
        let level: Severity = level
            .parse()
            .map_err(|e: crate::errors::ContextError| CliError::invalid_argument(e.to_string()))?;
        static_logging_context().set_rule(REALM, level);
    }
    match run_command(cli.command) {
        Ok(()) => Ok(()),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

/// Run a command and write its report
pub fn run_command(cmd: Command) -> CliResult<()> {
    let report = match cmd {
        Command::Types => types(),
        Command::Apply { config } => apply(&config)?,
        Command::Resolve {
            config,
            consumer,
            show_values,
        } => resolve(&config, &consumer, show_values)?,
    };
    write_response(report)
}

fn descriptions<T: ?Sized>(types: BTreeMap<String, Arc<dyn TypedObjectDecoder<T>>>) -> Value {
    let mut out = Map::new();
    for (name, decoder) in types {
        out.insert(name, Value::String(decoder.description().to_string()));
    }
    Value::Object(out)
}

/// Known config types, repository types and consumer identity types
pub fn types() -> Value {
    let defaults = plugins::defaults();
    let matchers: Map<String, Value> = defaults
        .matchers
        .list()
        .into_iter()
        .map(|(name, description)| (name, Value::String(description)))
        .collect();
    json!({
        "configTypes": descriptions(defaults.config_types.known_types()),
        "repositoryTypes": descriptions(defaults.repository_types.known_types()),
        "consumerTypes": matchers,
    })
}

/// Credentials context with the config file applied
fn load(config_path: &Path) -> CliResult<ContextView<CredentialsContext>> {
    let data = fs::read(config_path).map_err(|e| {
        CliError::config_error(format!("Failed to read config {:?}: {}", config_path, e))
    })?;
    let ctx = CredentialsContext::builder()
        .with_mode(BuilderMode::Extended)
        .build()?;
    let description = config_path.display().to_string();
    ctx.config_context()
        .apply_data(&data, Encoding::Json, &description)?;
    ctx.update()?;
    Ok(ContextView::new(ctx))
}

fn close(ctx: &ContextView<CredentialsContext>) -> CliResult<()> {
    ctx.finalize()?;
    ctx.attributes_context().finalize()?;
    Ok(())
}

/// Apply a config file and report the resulting config log
pub fn apply(config_path: &Path) -> CliResult<Value> {
    let ctx = load(config_path)?;
    let log: Vec<Value> = ctx
        .config_context()
        .log_entries()
        .into_iter()
        .map(|(config_type, description)| json!({"type": config_type, "description": description}))
        .collect();
    let report = json!({
        "context": ctx.id().to_string(),
        "log": log,
        "consumers": ctx.explicit_consumers(),
        "providers": ctx.consumer_providers(),
    });
    close(&ctx)?;
    Ok(report)
}

/// Resolve the credentials of a consumer.
///
/// Property values are redacted unless `show_values` is set.
pub fn resolve(config_path: &Path, consumer: &str, show_values: bool) -> CliResult<Value> {
    let id = ConsumerIdentity::parse(consumer)?;
    let ctx = load(config_path)?;
    let creds = ctx
        .credentials_for_consumer(&id, None)?
        .ok_or_else(|| CliError::not_found(format!("no credentials for consumer {}", id)))?;

    let mut properties = Map::new();
    for (name, value) in creds.properties().iter() {
        let value = if show_values { value.clone() } else { "***".to_string() };
        properties.insert(name.clone(), Value::String(value));
    }
    close(&ctx)?;
    Ok(json!({
        "consumer": id,
        "properties": properties,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use tempfile::TempDir;

    fn write_config(temp_dir: &TempDir, config: Value) -> std::path::PathBuf {
        let path = temp_dir.path().join("config.json");
        fs::write(&path, config.to_string()).unwrap();
        path
    }

    fn credentials_config() -> Value {
        json!({
            "type": "credentials.config",
            "consumers": [{
                "identity": {"type": "OCIRegistry", "hostname": "ghcr.io"},
                "credentials": [{"type": "Credentials", "properties": {"username": "me", "password": "secret"}}]
            }]
        })
    }

    #[test]
    fn test_types_lists_standard_types() {
        let report = types();
        assert!(report["configTypes"]["credentials.config"].is_string());
        assert!(report["repositoryTypes"]["DockerConfig"].is_string());
        assert!(report["consumerTypes"]["OCIRegistry"].is_string());
    }

    #[test]
    fn test_apply_reports_log() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, credentials_config());

        let report = apply(&path).unwrap();
        assert_eq!(report["log"][0]["type"], "credentials.config");
        assert_eq!(report["consumers"][0]["hostname"], "ghcr.io");
    }

    #[test]
    fn test_resolve_redacts_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, credentials_config());

        let report = resolve(&path, "type=OCIRegistry,hostname=ghcr.io", false).unwrap();
        assert_eq!(report["properties"]["password"], "***");

        let report = resolve(&path, "type=OCIRegistry,hostname=ghcr.io", true).unwrap();
        assert_eq!(report["properties"]["password"], "secret");
    }

    #[test]
    fn test_resolve_unknown_consumer() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, credentials_config());

        let err = resolve(&path, "type=OCIRegistry,hostname=quay.io", false).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::NotFound);
    }

    #[test]
    fn test_missing_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = apply(&temp_dir.path().join("none.json")).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }
}
