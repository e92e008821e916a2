//! # Context Views
//!
//! Thin external handles to a context. All clones of a view share one
//! guard; when the last of them is dropped without an explicit
//! [`ContextView::finalize`], the context is finalized and the leak is
//! logged. Explicit finalization is the release path, the guard only
//! reports and cleans up leaks.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::context::Context;
use crate::errors::ContextResult;
use crate::observability::Event;

struct LeakGuard<C: Context> {
    context: Arc<C>,
}

impl<C: Context> Drop for LeakGuard<C> {
    fn drop(&mut self) {
        let base = self.context.base();
        if base.is_finalized() {
            return;
        }
        base.logging().event(
            Event::ContextLeaked,
            &[("context", base.context_type()), ("id", base.id())],
        );
        if let Err(e) = self.context.finalize() {
            base.logging().event(
                Event::ContextLeaked,
                &[("id", base.id()), ("error", &e.to_string())],
            );
        }
    }
}

/// External handle of a context
pub struct ContextView<C: Context> {
    guard: Arc<LeakGuard<C>>,
}

impl<C: Context> ContextView<C> {
    pub fn new(context: Arc<C>) -> Self {
        Self {
            guard: Arc::new(LeakGuard { context }),
        }
    }

    pub fn context(&self) -> &Arc<C> {
        &self.guard.context
    }

    /// Whether both views refer to the same context
    pub fn is_identical_to(&self, other: &ContextView<C>) -> bool {
        self.guard.context.id() == other.guard.context.id()
    }

    pub fn finalize(&self) -> ContextResult<()> {
        self.guard.context.finalize()
    }
}

impl<C: Context> Clone for ContextView<C> {
    fn clone(&self) -> Self {
        Self {
            guard: Arc::clone(&self.guard),
        }
    }
}

impl<C: Context> Deref for ContextView<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.guard.context
    }
}

impl<C: Context> fmt::Debug for ContextView<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContextView({} {})",
            self.guard.context.context_type(),
            self.guard.context.id()
        )
    }
}
