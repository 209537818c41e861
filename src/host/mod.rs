//! Host - The backend that realizes nodes in an actual tree.
//!
//! The reconciler only decides *what* changes; a [`HostConfig`] applies them.
//! Every method takes `&self` so hosts use interior mutability, matching how
//! the reconciler holds them behind `Rc<dyn HostConfig>`.
//!
//! Host calls happen at two points:
//! - render phase: `create_instance`, `create_text_instance` and `append_child`
//!   to assemble a detached subtree for newly mounted nodes
//! - commit phase: everything else, always synchronously and to completion
//!
//! [`MemoryHost`] is an in-memory implementation with an operation log.

mod memory;

pub use memory::{HostOp, MemoryHost};

use crate::types::{HostHandle, Props};

/// Operations the reconciler needs from a host tree.
pub trait HostConfig {
    /// Create a detached element node.
    fn create_instance(&self, tag: &str, props: &Props) -> HostHandle;

    /// Create a detached text node.
    fn create_text_instance(&self, text: &str) -> HostHandle;

    /// Append `child` as the last child of `parent`, moving it if attached elsewhere.
    fn append_child(&self, parent: HostHandle, child: HostHandle);

    /// Insert `child` into `parent` right before `before`.
    fn insert_before(&self, parent: HostHandle, child: HostHandle, before: HostHandle);

    /// Detach `child` from `parent`.
    fn remove_child(&self, parent: HostHandle, child: HostHandle);

    /// Apply a property change to an element.
    fn commit_update(&self, handle: HostHandle, old_props: &Props, new_props: &Props);

    /// Replace the content of a text node.
    fn commit_text_update(&self, handle: HostHandle, text: &str);

    /// Hide or show a node kept alive behind a suspense fallback.
    fn set_visible(&self, handle: HostHandle, visible: bool);

    /// Run `task` after the current synchronous turn.
    fn schedule_microtask(&self, task: Box<dyn FnOnce()>);
}
