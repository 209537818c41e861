//! Root API - Creating, rendering and unmounting trees.
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use spark_reconciler::{host, text, MemoryHost, ManualScheduler, Reconciler};
//!
//! let memory = Rc::new(MemoryHost::new());
//! let scheduler = Rc::new(ManualScheduler::new());
//! let reconciler = Reconciler::new(memory.clone(), scheduler.clone());
//!
//! let root = reconciler.create_root(memory.create_container());
//! root.render(host("row").child(text("hello")).build());
//!
//! // Sync work is flushed from a host microtask.
//! memory.run_microtasks();
//! assert_eq!(memory.to_markup(root.container()), "<row>hello</row>");
//! ```

use std::rc::Rc;

use crate::commit::{flush_passive_effects, CommitSummary};
use crate::config::ReconcilerConfig;
use crate::error::ReconcileError;
use crate::host::HostConfig;
use crate::lanes::{Lanes, RootLanes};
use crate::scheduler::Scheduler;
use crate::types::{HostHandle, Node};
use crate::update_queue::{enqueue_update, Update};
use crate::work_loop::{RootExitStatus, RootShared};

// =============================================================================
// Reconciler
// =============================================================================

/// Factory for roots sharing one host and one scheduler.
pub struct Reconciler {
    host: Rc<dyn HostConfig>,
    scheduler: Rc<dyn Scheduler>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(host: Rc<dyn HostConfig>, scheduler: Rc<dyn Scheduler>) -> Self {
        Self { host, scheduler, config: ReconcilerConfig::default() }
    }

    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Create an empty root rendering into `container`.
    pub fn create_root(&self, container: HostHandle) -> Root {
        tracing::debug!(?container, "created root");
        Root {
            shared: RootShared::new(self.host.clone(), self.scheduler.clone(), self.config.clone(), container),
            container,
        }
    }
}

// =============================================================================
// Root
// =============================================================================

/// Handle to one mounted tree. Clones refer to the same tree.
#[derive(Clone)]
pub struct Root {
    shared: Rc<RootShared>,
    container: HostHandle,
}

impl Root {
    /// Schedule a synchronous render of `node`.
    ///
    /// The work runs from the next host microtask (or [`Root::flush_sync_work`]).
    pub fn render(&self, node: impl Into<Node>) {
        enqueue_update(&self.shared.root_queue, Update::new(node.into(), Lanes::SYNC));
        self.shared.schedule_update_on_fiber(self.shared.host_root_fiber, Lanes::SYNC);
    }

    /// Render nothing, removing every host node and running every teardown.
    pub fn unmount(&self) {
        self.render(Node::Empty);
        self.flush_sync_work();
        self.flush_passive_effects();
    }

    pub fn container(&self) -> HostHandle {
        self.container
    }

    /// Run queued synchronous renders now. Returns how many ran.
    pub fn flush_sync_work(&self) -> usize {
        self.shared.sync_queue.flush()
    }

    /// Run deferred effects of the last commit now. Returns false when there
    /// were none.
    pub fn flush_passive_effects(&self) -> bool {
        flush_passive_effects(&self.shared)
    }

    /// How the most recent render ended.
    pub fn exit_status(&self) -> RootExitStatus {
        self.shared.with_engine(|cx| cx.root.exit_status).unwrap_or(RootExitStatus::InProgress)
    }

    /// Summary of the most recent commit.
    pub fn last_commit(&self) -> Option<CommitSummary> {
        self.shared.with_engine(|cx| cx.root.last_commit.clone()).flatten()
    }

    /// Failures that ended renders with no boundary to catch them.
    pub fn take_errors(&self) -> Vec<ReconcileError> {
        self.shared.with_engine(|cx| std::mem::take(&mut cx.root.errors)).unwrap_or_default()
    }

    pub fn pending_lanes(&self) -> Lanes {
        self.lanes().pending
    }

    /// Pending, suspended and pinged lanes.
    pub fn lanes(&self) -> RootLanes {
        self.shared.with_engine(|cx| cx.root.lanes).unwrap_or_default()
    }

    /// Nodes held by the arena, both buffers included.
    pub fn node_count(&self) -> usize {
        self.shared.with_engine(|cx| cx.arena.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::scheduler::ManualScheduler;
    use crate::types::{host, text};

    fn setup() -> (Rc<MemoryHost>, Rc<ManualScheduler>, Root) {
        let memory = Rc::new(MemoryHost::new());
        let scheduler = Rc::new(ManualScheduler::new());
        let reconciler = Reconciler::new(memory.clone(), scheduler.clone());
        let root = reconciler.create_root(memory.create_container());
        (memory, scheduler, root)
    }

    #[test]
    fn test_render_is_flushed_from_microtask() {
        let (memory, _scheduler, root) = setup();
        root.render(host("row").child(text("hi")).build());

        assert_eq!(memory.to_markup(root.container()), "");
        assert_eq!(root.pending_lanes(), Lanes::SYNC);

        memory.run_microtasks();

        assert_eq!(memory.to_markup(root.container()), "<row>hi</row>");
        assert_eq!(root.exit_status(), RootExitStatus::Completed);
        assert!(root.pending_lanes().is_empty());
    }

    #[test]
    fn test_unmount_clears_container() {
        let (memory, _scheduler, root) = setup();
        root.render(host("row").child(text("hi")).build());
        root.flush_sync_work();
        assert_eq!(memory.children(root.container()).len(), 1);

        root.unmount();

        assert!(memory.children(root.container()).is_empty());
        assert_eq!(root.last_commit().map(|c| c.deleted), Some(1));
    }

    #[test]
    fn test_rendered_twice_before_flush_commits_latest() {
        let (memory, _scheduler, root) = setup();
        root.render(text("first"));
        root.render(text("second"));
        root.flush_sync_work();
        assert_eq!(memory.to_markup(root.container()), "second");
    }
}
