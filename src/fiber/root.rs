//! FiberRoot - Per-mount bookkeeping shared by both buffers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::NodeId;
use crate::commit::CommitSummary;
use crate::error::ReconcileError;
use crate::hooks::Effect;
use crate::lanes::{Lane, Lanes, RootLanes, NO_LANE};
use crate::scheduler::CallbackToken;
use crate::types::HostHandle;
use crate::work_loop::RootExitStatus;

/// Deferred effects queued by commits and not yet flushed.
#[derive(Default)]
pub struct PendingPassiveEffects {
    /// Effects of deleted nodes: teardown only.
    pub unmount: Vec<Rc<Effect>>,
    /// Effects of updated nodes: teardown then setup when `HAS_EFFECT` is set.
    pub update: Vec<Rc<Effect>>,
}

impl PendingPassiveEffects {
    pub fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.update.is_empty()
    }
}

/// Listener registrations for one awaitable.
pub struct PingEntry {
    /// Lanes that already have a listener attached.
    pub lanes: Lanes,
    /// Boundaries that showed a fallback for this awaitable.
    pub boundaries: Rc<RefCell<Vec<NodeId>>>,
}

/// One mounted tree.
pub struct FiberRoot {
    pub container: HostHandle,
    /// Host root node of the committed buffer.
    pub current: NodeId,
    /// Completed work-in-progress host root waiting to be committed.
    pub finished_work: Option<NodeId>,
    pub finished_lane: Lane,
    pub lanes: RootLanes,

    /// Scheduler callback servicing the root, if one is queued.
    pub callback_node: Option<CallbackToken>,
    /// Lane the queued callback (or sync flush) was scheduled for.
    pub callback_priority: Lane,

    pub pending_passive: PendingPassiveEffects,
    pub has_scheduled_passive: bool,

    /// Awaitable id to listener bookkeeping.
    pub ping_cache: HashMap<usize, PingEntry>,

    pub errors: Vec<ReconcileError>,
    pub last_commit: Option<CommitSummary>,
    pub exit_status: RootExitStatus,
    /// Consecutive commits that left sync work behind.
    pub nested_sync_commits: usize,
}

impl FiberRoot {
    pub fn new(container: HostHandle, current: NodeId) -> Self {
        Self {
            container,
            current,
            finished_work: None,
            finished_lane: NO_LANE,
            lanes: RootLanes::default(),
            callback_node: None,
            callback_priority: NO_LANE,
            pending_passive: PendingPassiveEffects::default(),
            has_scheduled_passive: false,
            ping_cache: HashMap::new(),
            errors: Vec::new(),
            last_commit: None,
            exit_status: RootExitStatus::Idle,
            nested_sync_commits: 0,
        }
    }
}
