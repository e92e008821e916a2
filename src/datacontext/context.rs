//! # Data Contexts
//!
//! Common base of all contexts: identity, type, attribute store and
//! logging context. The root of a context hierarchy is an
//! [`AttributesContext`].

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use uuid::Uuid;

use super::attributes::Attributes;
use crate::errors::ContextResult;
use crate::observability::{static_logging_context, Event, LoggingContext};

/// Type name of attributes contexts
pub const CONTEXT_TYPE: &str = "attributes.context";

/// Lazily replays configuration onto a target object
pub trait ContextUpdater: Send + Sync {
    fn update(&self, target: &dyn Any) -> ContextResult<()>;
}

/// Access to the common context base
pub trait Context: Any + Send + Sync {
    fn base(&self) -> &ContextBase;

    fn id(&self) -> &str {
        self.base().id()
    }

    fn context_type(&self) -> &str {
        self.base().context_type()
    }

    /// Whether both handles refer to the same context
    fn is_identical_to(&self, other: &dyn Context) -> bool {
        self.id() == other.id()
    }

    /// Release all resources owned by the context
    fn finalize(&self) -> ContextResult<()> {
        self.base().finalize()
    }
}

/// Identity and shared state of a context
pub struct ContextBase {
    id: String,
    context_type: String,
    attributes: Arc<Attributes>,
    owns_attributes: bool,
    logging: Arc<LoggingContext>,
    finalized: AtomicBool,
}

impl ContextBase {
    /// Base owning its attribute store
    pub fn new(
        context_type: impl Into<String>,
        attributes: Arc<Attributes>,
        logging: Arc<LoggingContext>,
    ) -> Self {
        Self::create(context_type.into(), attributes, true, logging)
    }

    /// Base sharing the attribute store of another context
    pub fn sharing(
        context_type: impl Into<String>,
        attributes: Arc<Attributes>,
        logging: Arc<LoggingContext>,
    ) -> Self {
        Self::create(context_type.into(), attributes, false, logging)
    }

    fn create(
        context_type: String,
        attributes: Arc<Attributes>,
        owns_attributes: bool,
        logging: Arc<LoggingContext>,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        logging.event(
            Event::ContextCreated,
            &[("context", &context_type), ("id", &id)],
        );
        Self {
            id,
            context_type,
            attributes,
            owns_attributes,
            logging,
            finalized: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context_type(&self) -> &str {
        &self.context_type
    }

    pub fn attributes(&self) -> &Arc<Attributes> {
        &self.attributes
    }

    pub fn logging(&self) -> &Arc<LoggingContext> {
        &self.logging
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    /// Finalize owned attributes; later calls are no-ops
    pub fn finalize(&self) -> ContextResult<()> {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.logging.event(
            Event::ContextFinalized,
            &[("context", &self.context_type), ("id", &self.id)],
        );
        if self.owns_attributes {
            self.attributes.finalize()
        } else {
            Ok(())
        }
    }
}

/// Root context holding the shared attributes of a context hierarchy
pub struct AttributesContext {
    base: ContextBase,
    parent: Option<Arc<AttributesContext>>,
    updater: OnceLock<Arc<dyn ContextUpdater>>,
}

impl AttributesContext {
    /// New root context; attribute and logging lookups fall back to `parent`
    pub fn new(parent: Option<&Arc<AttributesContext>>) -> Arc<Self> {
        let (attributes, logging) = match parent {
            Some(p) => (
                Attributes::new(Some(Arc::clone(p.base.attributes()))),
                LoggingContext::child(p.base.logging()),
            ),
            None => (
                Attributes::new(None),
                LoggingContext::child(static_logging_context()),
            ),
        };
        Arc::new(Self {
            base: ContextBase::new(CONTEXT_TYPE, Arc::new(attributes), logging),
            parent: parent.map(Arc::clone),
            updater: OnceLock::new(),
        })
    }

    pub fn parent(&self) -> Option<&Arc<AttributesContext>> {
        self.parent.as_ref()
    }

    pub fn attributes(&self) -> &Arc<Attributes> {
        self.base.attributes()
    }

    pub fn logging_context(&self) -> &Arc<LoggingContext> {
        self.base.logging()
    }

    /// Install the updater for this context unless one is already present
    pub fn assure_updater<F>(&self, create: F) -> Arc<dyn ContextUpdater>
    where
        F: FnOnce() -> Arc<dyn ContextUpdater>,
    {
        Arc::clone(self.updater.get_or_init(create))
    }

    pub fn has_updater(&self) -> bool {
        self.updater.get().is_some()
    }

    /// Replay pending configuration onto this context
    pub fn update(&self) -> ContextResult<()> {
        match self.updater.get() {
            Some(u) => u.update(self),
            None => Ok(()),
        }
    }

    /// Typed attribute after applying pending configuration
    pub fn get_attribute<T: Any + Send + Sync>(&self, name: &str) -> ContextResult<Option<Arc<T>>> {
        self.update()?;
        Ok(self.attributes().get(name))
    }

    pub fn set_attribute<T: Any + Send + Sync>(&self, name: &str, value: T) -> ContextResult<()> {
        self.attributes().set(name, value)
    }
}

impl Context for AttributesContext {
    fn base(&self) -> &ContextBase {
        &self.base
    }
}

/// Process-wide default attributes context, created on first use
pub fn default_attributes_context() -> &'static Arc<AttributesContext> {
    static DEFAULT: OnceLock<Arc<AttributesContext>> = OnceLock::new();
    DEFAULT.get_or_init(|| AttributesContext::new(None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingUpdater(AtomicUsize);

    impl ContextUpdater for CountingUpdater {
        fn update(&self, target: &dyn Any) -> ContextResult<()> {
            assert!(target.downcast_ref::<AttributesContext>().is_some());
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_identity() {
        let a = AttributesContext::new(None);
        let b = AttributesContext::new(None);
        assert!(a.is_identical_to(&*a));
        assert!(!a.is_identical_to(&*b));
        assert_eq!(a.context_type(), CONTEXT_TYPE);
    }

    #[test]
    fn test_assure_updater_installs_once() {
        let ctx = AttributesContext::new(None);
        let first = Arc::new(CountingUpdater(AtomicUsize::new(0)));
        let installed = ctx.assure_updater(|| first.clone() as Arc<dyn ContextUpdater>);
        let again = ctx.assure_updater(|| {
            Arc::new(CountingUpdater(AtomicUsize::new(0))) as Arc<dyn ContextUpdater>
        });
        assert!(Arc::ptr_eq(&installed, &again));

        ctx.set_attribute("x", 1i32).unwrap();
        assert_eq!(*ctx.get_attribute::<i32>("x").unwrap().unwrap(), 1);
        assert_eq!(first.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_child_sees_parent_attributes() {
        let parent = AttributesContext::new(None);
        parent.set_attribute("shared", "v".to_string()).unwrap();
        let child = AttributesContext::new(Some(&parent));
        assert_eq!(
            child.get_attribute::<String>("shared").unwrap().unwrap().as_str(),
            "v"
        );
        assert!(child.parent().is_some());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let ctx = AttributesContext::new(None);
        ctx.finalize().unwrap();
        assert!(ctx.base().is_finalized());
        ctx.finalize().unwrap();
    }
}
