//! # Credentials Context
//!
//! Resolves consumer identities to credentials. The context owns the
//! repository type scheme, the identity matchers and the consumer provider
//! registry. Bindings declared through `credentials.config` objects reach
//! the context lazily: every read first replays pending config.

use std::sync::{Arc, OnceLock};

use super::builtin;
use super::identity::ConsumerIdentity;
use super::matcher::{IdentityMatcher, IdentityMatcherRegistry};
use super::provider::{ConsumerProvider, ConsumerProviderRegistry, ExplicitConsumers};
use super::repositories::aliases::{self, AliasEntry};
use super::repository::{
    new_repository_type_scheme, CredentialsSpec, Repository, RepositorySpec, RepositoryTypeScheme,
};
use super::source::{Credentials, CredentialsChain, CredentialsSource};
use crate::config::{default_config_context, Config, ConfigContext, ConfigContextBuilder, Updater};
use crate::datacontext::{Attributes, AttributesContext, BuilderMode, Context, ContextBase};
use crate::errors::{ContextError, ContextResult, ResultExt, KIND_CONSUMER};
use crate::observability::{Event, LoggingContext};
use crate::plugins;
use crate::runtime::Encoding;

/// Type name of credentials contexts
pub const CONTEXT_TYPE: &str = "credentials.context";

/// Provider key of the bindings set directly on the context
pub const EXPLICIT_PROVIDER: &str = "explicit";

pub struct CredentialsContext {
    base: ContextBase,
    config: Arc<ConfigContext>,
    repository_types: Arc<RepositoryTypeScheme>,
    matchers: Arc<IdentityMatcherRegistry>,
    providers: ConsumerProviderRegistry,
    explicit: Arc<ExplicitConsumers>,
    updater: Updater,
}

impl CredentialsContext {
    pub fn builder() -> CredentialsContextBuilder {
        CredentialsContextBuilder::default()
    }

    fn new(
        config: Arc<ConfigContext>,
        repository_types: Arc<RepositoryTypeScheme>,
        matchers: Arc<IdentityMatcherRegistry>,
    ) -> ContextResult<Arc<Self>> {
        let base = ContextBase::sharing(
            CONTEXT_TYPE,
            Arc::clone(config.attributes_context().attributes()),
            LoggingContext::child(config.logging()),
        );
        let explicit = Arc::new(ExplicitConsumers::new());
        let providers = ConsumerProviderRegistry::new();
        providers.register(
            EXPLICIT_PROVIDER,
            Arc::clone(&explicit) as Arc<dyn ConsumerProvider>,
        )?;
        let updater = Updater::new(&config);
        Ok(Arc::new(Self {
            base,
            config,
            repository_types,
            matchers,
            providers,
            explicit,
            updater,
        }))
    }

    pub fn config_context(&self) -> &Arc<ConfigContext> {
        &self.config
    }

    pub fn attributes_context(&self) -> &Arc<AttributesContext> {
        self.config.attributes_context()
    }

    /// Attribute store shared with the config and attributes contexts
    pub fn attributes(&self) -> &Arc<Attributes> {
        self.base.attributes()
    }

    pub fn logging(&self) -> &Arc<LoggingContext> {
        self.base.logging()
    }

    pub fn repository_types(&self) -> &Arc<RepositoryTypeScheme> {
        &self.repository_types
    }

    pub fn matchers(&self) -> &Arc<IdentityMatcherRegistry> {
        &self.matchers
    }

    /// Replay config applied since the last update
    pub fn update(&self) -> ContextResult<()> {
        self.updater.update(self)
    }

    /// Apply a config object through the config context
    pub fn apply_config(&self, config: Arc<dyn Config>, description: &str) -> ContextResult<()> {
        self.config.apply_config(config, description)
    }

    pub fn repository_spec_for_config(
        &self,
        data: &[u8],
        encoding: Encoding,
    ) -> ContextResult<Arc<dyn RepositorySpec>> {
        self.repository_types.decode(data, encoding)
    }

    /// Get the repository described by a specification
    pub fn repository_for_spec(
        &self,
        spec: &dyn RepositorySpec,
        creds: Option<&dyn Credentials>,
    ) -> ContextResult<Arc<dyn Repository>> {
        self.update()?;
        spec.repository(self, creds)
            .context(|| format!("repository {:?}", spec.get_type()))
    }

    /// Like [`Self::repository_for_spec`], accessing the backend with the
    /// merged credentials of `sources`
    pub fn repository_for_spec_with(
        &self,
        spec: &dyn RepositorySpec,
        sources: Vec<Arc<dyn CredentialsSource>>,
    ) -> ContextResult<Arc<dyn Repository>> {
        if sources.is_empty() {
            return self.repository_for_spec(spec, None);
        }
        let creds = CredentialsChain::new(sources).credentials(self)?;
        self.repository_for_spec(spec, Some(&*creds))
    }

    pub fn repository_for_config(
        &self,
        data: &[u8],
        encoding: Encoding,
        creds: Option<&dyn Credentials>,
    ) -> ContextResult<Arc<dyn Repository>> {
        let spec = self.repository_spec_for_config(data, encoding)?;
        self.repository_for_spec(&*spec, creds)
    }

    pub fn credentials_for_spec(&self, spec: &CredentialsSpec) -> ContextResult<Arc<dyn Credentials>> {
        self.update()?;
        spec.resolve(self)
    }

    /// Decode a credentials specification and resolve it
    pub fn credentials_for_config(
        &self,
        data: &[u8],
        encoding: Encoding,
    ) -> ContextResult<Arc<dyn Credentials>> {
        let spec: CredentialsSpec = encoding.unmarshal(data)?;
        self.credentials_for_spec(&spec)
    }

    /// Register or replace a consumer provider
    pub fn register_consumer_provider(
        &self,
        key: &str,
        provider: Arc<dyn ConsumerProvider>,
    ) -> ContextResult<()> {
        self.providers.register(key, provider)?;
        self.logging()
            .event(Event::ConsumerProviderRegistered, &[("provider", key)]);
        Ok(())
    }

    /// Keys of all registered consumer providers in scan order
    pub fn consumer_providers(&self) -> Vec<String> {
        self.providers.keys()
    }

    /// Bind credentials to a consumer identity
    pub fn set_credentials_for_consumer(
        &self,
        id: ConsumerIdentity,
        source: Arc<dyn CredentialsSource>,
    ) -> ContextResult<()> {
        self.update()?;
        self.explicit.set(id, source)
    }

    /// Identities bound directly on this context
    pub fn explicit_consumers(&self) -> Vec<ConsumerIdentity> {
        self.explicit.identities()
    }

    /// Best credential source for a consumer.
    ///
    /// Without an explicit matcher the matcher registered for the consumer
    /// type is used. Fails with a not-found error if nothing matched.
    pub fn get_credentials_for_consumer(
        &self,
        id: &ConsumerIdentity,
        matcher: Option<&dyn IdentityMatcher>,
    ) -> ContextResult<Arc<dyn CredentialsSource>> {
        self.update()?;
        let found = match matcher {
            Some(m) => self.providers.best_match(id, m)?,
            None => {
                let m = self.matchers.matcher_for(id);
                self.providers.best_match(id, &*m)?
            }
        };
        found
            .map(|(source, _)| source)
            .ok_or_else(|| ContextError::not_found(KIND_CONSUMER, id.to_string()))
    }

    /// Credentials for a consumer; `None` if no binding matched
    pub fn credentials_for_consumer(
        &self,
        id: &ConsumerIdentity,
        matcher: Option<&dyn IdentityMatcher>,
    ) -> ContextResult<Option<Arc<dyn Credentials>>> {
        let source = match self.get_credentials_for_consumer(id, matcher) {
            Ok(s) => s,
            Err(e) if e.is_not_found_kind(KIND_CONSUMER) => return Ok(None),
            Err(e) => return Err(e.wrap(format!("lookup credentials failed for {}", id))),
        };
        let creds = source
            .credentials(self)
            .context(|| format!("lookup credentials failed for {}", id))?;
        self.logging().event(
            Event::CredentialsResolved,
            &[("consumer", &id.to_string()), ("properties", &creds.properties().to_string())],
        );
        Ok(Some(creds))
    }

    /// Like [`Self::credentials_for_consumer`], but a missing binding is an error
    pub fn required_credentials_for_consumer(
        &self,
        id: &ConsumerIdentity,
        matcher: Option<&dyn IdentityMatcher>,
    ) -> ContextResult<Arc<dyn Credentials>> {
        self.credentials_for_consumer(id, matcher)?
            .ok_or_else(|| ContextError::not_found(KIND_CONSUMER, id.to_string()))
    }

    /// Declare a repository alias; `creds` are used to access its backend
    pub fn set_alias(
        &self,
        name: &str,
        spec: &dyn RepositorySpec,
        creds: Option<Arc<dyn CredentialsSource>>,
    ) -> ContextResult<()> {
        aliases::set_alias(self, name, spec, creds)
    }

    pub fn get_alias(&self, name: &str) -> ContextResult<Option<Arc<AliasEntry>>> {
        self.update()?;
        aliases::get_alias(self, name)
    }
}

impl Context for CredentialsContext {
    fn base(&self) -> &ContextBase {
        &self.base
    }
}

/// Builder for [`CredentialsContext`]s
#[derive(Default)]
pub struct CredentialsContextBuilder {
    mode: BuilderMode,
    config: Option<Arc<ConfigContext>>,
    repository_types: Option<Arc<RepositoryTypeScheme>>,
    matchers: Option<Arc<IdentityMatcherRegistry>>,
}

impl CredentialsContextBuilder {
    pub fn with_mode(mut self, mode: BuilderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_config(mut self, config: Arc<ConfigContext>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_repository_types(mut self, scheme: Arc<RepositoryTypeScheme>) -> Self {
        self.repository_types = Some(scheme);
        self
    }

    pub fn with_matchers(mut self, matchers: Arc<IdentityMatcherRegistry>) -> Self {
        self.matchers = Some(matchers);
        self
    }

    pub fn build(self) -> ContextResult<Arc<CredentialsContext>> {
        if self.mode == BuilderMode::Shared
            && self.config.is_none()
            && self.repository_types.is_none()
            && self.matchers.is_none()
        {
            return default_credentials_context().map(Arc::clone);
        }

        let defaults = plugins::defaults();
        let mode = self.mode;
        let config = self.config.unwrap_or_else(|| match mode {
            BuilderMode::Shared => Arc::clone(default_config_context()),
            _ => ConfigContextBuilder::new(mode).build(),
        });
        let repository_types = self.repository_types.unwrap_or_else(|| {
            mode.registry(
                &defaults.repository_types,
                |d| d.derive(),
                |d| d.snapshot(),
                new_repository_type_scheme,
            )
        });
        let matchers = self.matchers.unwrap_or_else(|| {
            mode.registry(
                &defaults.matchers,
                |d| d.derive(),
                |d| d.snapshot(),
                IdentityMatcherRegistry::new,
            )
        });
        CredentialsContext::new(config, repository_types, matchers)
    }
}

/// Process-wide default credentials context on the default config context.
///
/// It is seeded from the environment on first use, see [`builtin`].
pub fn default_credentials_context() -> ContextResult<&'static Arc<CredentialsContext>> {
    static DEFAULT: OnceLock<Arc<CredentialsContext>> = OnceLock::new();
    if let Some(ctx) = DEFAULT.get() {
        return Ok(ctx);
    }
    let ctx = CredentialsContext::builder()
        .with_mode(BuilderMode::Defaulted)
        .with_config(Arc::clone(default_config_context()))
        .build()?;
    builtin::seed_from_env(&ctx)?;
    Ok(DEFAULT.get_or_init(|| ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::matcher::complete_match;
    use crate::credentials::properties::Properties;
    use crate::credentials::source::DirectCredentials;

    #[test]
    fn test_explicit_binding() {
        let ctx = CredentialsContext::builder().build().unwrap();
        let id = ConsumerIdentity::new("mytype").with("host", "localhost");
        ctx.set_credentials_for_consumer(
            id.clone(),
            Arc::new(DirectCredentials::new(Properties::from([("token", "t")]))),
        )
        .unwrap();

        let creds = ctx
            .credentials_for_consumer(&id, Some(&complete_match))
            .unwrap()
            .unwrap();
        assert_eq!(creds.get_property("token").as_deref(), Some("t"));
        assert_eq!(ctx.explicit_consumers(), vec![id]);
    }

    #[test]
    fn test_missing_binding() {
        let ctx = CredentialsContext::builder().build().unwrap();
        let id = ConsumerIdentity::new("unknown");
        assert!(ctx.credentials_for_consumer(&id, None).unwrap().is_none());
        let err = ctx.required_credentials_for_consumer(&id, None).unwrap_err();
        assert!(err.is_not_found_kind(KIND_CONSUMER));
    }

    #[test]
    fn test_shared_mode_reuses_default() {
        let a = CredentialsContext::builder()
            .with_mode(BuilderMode::Shared)
            .build()
            .unwrap();
        let b = default_credentials_context().unwrap();
        assert!(a.is_identical_to(&**b));
    }

    #[test]
    fn test_explicit_provider_registered_first() {
        let ctx = CredentialsContext::builder().build().unwrap();
        assert_eq!(ctx.consumer_providers(), vec![EXPLICIT_PROVIDER]);
    }
}
