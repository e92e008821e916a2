//! # Attribute Stores
//!
//! Typed values stored by name, with lookup delegation to a parent store.
//! Values implementing [`Finalizable`] are finalized when they are replaced,
//! removed or when the store is finalized.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::errors::{ContextError, ContextResult, ErrorList, ResultExt};

/// Resource released by an explicit finalize call
pub trait Finalizable: Send + Sync {
    fn finalize(&self) -> ContextResult<()>;
}

type AttributeValue = Arc<dyn Any + Send + Sync>;

struct Entry {
    value: AttributeValue,
    finalizer: Option<Arc<dyn Finalizable>>,
}

impl Entry {
    fn plain<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            finalizer: None,
        }
    }

    fn closeable<T: Finalizable + Any>(value: Arc<T>) -> Self {
        let finalizer: Arc<dyn Finalizable> = value.clone();
        Self {
            value,
            finalizer: Some(finalizer),
        }
    }
}

/// Named, typed attribute values
#[derive(Default)]
pub struct Attributes {
    parent: Option<Arc<Attributes>>,
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl Attributes {
    pub fn new(parent: Option<Arc<Attributes>>) -> Self {
        Self {
            parent,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn parent(&self) -> Option<&Arc<Attributes>> {
        self.parent.as_ref()
    }

    fn lookup_local(&self, name: &str) -> ContextResult<Option<AttributeValue>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ContextError::lock_poisoned())?;
        Ok(entries.get(name).map(|e| Arc::clone(&e.value)))
    }

    /// Untyped value, locally first, then in the parent chain
    pub fn get_value(&self, name: &str) -> Option<AttributeValue> {
        match self.lookup_local(name) {
            Ok(Some(v)) => Some(v),
            _ => self.parent.as_ref().and_then(|p| p.get_value(name)),
        }
    }

    /// Typed value; `None` if absent or of another type
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get_value(name).and_then(|v| v.downcast::<T>().ok())
    }

    pub fn set<T: Any + Send + Sync>(&self, name: &str, value: T) -> ContextResult<()> {
        self.insert(name, Entry::plain(Arc::new(value)))
    }

    /// Store a value finalized together with the store
    pub fn set_closeable<T: Finalizable + Any>(&self, name: &str, value: Arc<T>) -> ContextResult<()> {
        self.insert(name, Entry::closeable(value))
    }

    fn insert(&self, name: &str, entry: Entry) -> ContextResult<()> {
        let old = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| ContextError::lock_poisoned())?;
            entries.insert(name.to_string(), entry)
        };
        match old.and_then(|e| e.finalizer) {
            Some(f) => f
                .finalize()
                .context(|| format!("finalizing replaced attribute {:?}", name)),
            None => Ok(()),
        }
    }

    /// Get a value or create it under the store lock.
    ///
    /// `create` must not access this store.
    pub fn get_or_create<T, F>(&self, name: &str, create: F) -> ContextResult<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> ContextResult<T>,
    {
        self.get_or_insert(name, || create().map(|v| Entry::plain(Arc::new(v))))
    }

    /// Like [`Attributes::get_or_create`] for finalizable values
    pub fn get_or_create_closeable<T, F>(&self, name: &str, create: F) -> ContextResult<Arc<T>>
    where
        T: Finalizable + Any,
        F: FnOnce() -> ContextResult<T>,
    {
        self.get_or_insert(name, || create().map(|v| Entry::closeable(Arc::new(v))))
    }

    fn get_or_insert<T, F>(&self, name: &str, create: F) -> ContextResult<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> ContextResult<Entry>,
    {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ContextError::lock_poisoned())?;
        let value = match entries.get(name) {
            Some(e) => Arc::clone(&e.value),
            None => match self.parent.as_ref().and_then(|p| p.get_value(name)) {
                Some(v) => v,
                None => {
                    let entry = create()?;
                    let value = Arc::clone(&entry.value);
                    entries.insert(name.to_string(), entry);
                    value
                }
            },
        };
        value
            .downcast::<T>()
            .map_err(|_| ContextError::invalid(format!("attribute {:?}: unexpected type", name)))
    }

    /// Remove a local value, finalizing it
    pub fn remove(&self, name: &str) -> ContextResult<bool> {
        let old = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| ContextError::lock_poisoned())?;
            entries.remove(name)
        };
        match old {
            Some(e) => {
                if let Some(f) = e.finalizer {
                    f.finalize()
                        .context(|| format!("finalizing attribute {:?}", name))?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Names of local values
    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Finalize and drop all local values.
    ///
    /// Every value is finalized; all failures are reported together.
    pub fn finalize(&self) -> ContextResult<()> {
        let entries = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| ContextError::lock_poisoned())?;
            std::mem::take(&mut *entries)
        };
        let mut list = ErrorList::new("finalizing attributes");
        for (name, entry) in entries {
            if let Some(f) = entry.finalizer {
                list.add(f.finalize().context(|| format!("attribute {:?}", name)));
            }
        }
        list.result()
    }
}
