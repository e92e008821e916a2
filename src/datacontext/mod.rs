//! # Data Context Lifecycle
//!
//! Context identity, attribute storage, the root attributes context that
//! hosts the lazy config updater, builder modes and external views with
//! a leak backstop.

pub mod attributes;
pub mod context;
pub mod mode;
pub mod view;

pub use attributes::{Attributes, Finalizable};
pub use context::{
    default_attributes_context, AttributesContext, Context, ContextBase, ContextUpdater,
    CONTEXT_TYPE,
};
pub use mode::BuilderMode;
pub use view::ContextView;
