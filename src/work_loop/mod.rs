//! Work Loop - Driving renders and commits for one root.
//!
//! All mutable state of a root lives in an [`Engine`] behind a `RefCell`.
//! Entry points (scheduler tasks, sync flushes, dispatchers, pings) take the
//! engine lock through [`RootShared::with_engine`]. Anything that arrives
//! while the lock is held (a state update dispatched from a reference
//! callback during commit, a ping from an already-settled awaitable) is
//! parked in a mailbox and applied as soon as the lock is released.
//!
//! Scheduling follows the lane model:
//! - the sync lane is flushed from a host microtask through the [`SyncQueue`]
//! - every other lane gets a scheduler callback at the mapped priority and
//!   renders with time slicing, yielding when the scheduler asks
//! - a higher-priority update cancels the queued callback; the half-built
//!   render is discarded and rebuilt for the new lane

mod render;
mod session;
mod sync_queue;

pub use session::RootExitStatus;

pub(crate) use session::RenderSession;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use render::render_root;
use sync_queue::SyncQueue;

use crate::commit::{commit_root, flush_passive_effects};
use crate::config::ReconcilerConfig;
use crate::error::ReconcileError;
use crate::fiber::{create_host_root_fiber, mark_update_lane_from_fiber_to_root, FiberArena, FiberRoot, FiberState, NodeId};
use crate::host::HostConfig;
use crate::lanes::{
    get_next_lane, include_some_lanes, lanes_to_scheduler_priority, mark_root_suspended, mark_root_updated,
    merge_lanes, remove_lanes, scheduler_priority_to_lane, Lane, Lanes, NO_LANE,
};
use crate::scheduler::{Scheduler, SchedulerTask};
use crate::suspense::throw::ping_suspended_root;
use crate::types::{HostHandle, Node};
use crate::update_queue::{QueueState, SharedQueueRef};

// =============================================================================
// Transitions
// =============================================================================

thread_local! {
    static IN_TRANSITION: Cell<bool> = const { Cell::new(false) };
}

/// Restores the enclosing transition flag on drop, unwinding included.
struct TransitionScope {
    previous: bool,
}

impl Drop for TransitionScope {
    fn drop(&mut self) {
        IN_TRANSITION.set(self.previous);
    }
}

/// Run `f` with every update it dispatches tagged with the transition lane.
pub fn start_transition<R>(f: impl FnOnce() -> R) -> R {
    let _scope = TransitionScope { previous: IN_TRANSITION.replace(true) };
    f()
}

// =============================================================================
// Root State
// =============================================================================

/// Everything mutated by render and commit.
pub(crate) struct Engine {
    pub arena: FiberArena,
    pub root: FiberRoot,
    pub session: RenderSession,
}

/// Work that arrived while the engine was locked.
pub(crate) enum Deferred {
    Update { fiber: NodeId, lane: Lane },
    Ping { id: usize, lane: Lane, boundaries: Rc<RefCell<Vec<NodeId>>> },
}

/// Borrowed view of a locked engine.
pub(crate) struct WorkCx<'a> {
    pub shared: &'a RootShared,
    pub arena: &'a mut FiberArena,
    pub root: &'a mut FiberRoot,
    pub session: &'a mut RenderSession,
}

/// One mounted root: the engine plus its collaborators.
pub(crate) struct RootShared {
    this: Weak<RootShared>,
    engine: RefCell<Engine>,
    mailbox: RefCell<Vec<Deferred>>,
    pub sync_queue: SyncQueue,
    pub host: Rc<dyn HostConfig>,
    pub scheduler: Rc<dyn Scheduler>,
    pub config: ReconcilerConfig,
    /// Update queue of the host root; its state is the intent tree.
    pub root_queue: SharedQueueRef<Node, Node>,
    pub host_root_fiber: NodeId,
}

impl RootShared {
    pub fn new(
        host: Rc<dyn HostConfig>,
        scheduler: Rc<dyn Scheduler>,
        config: ReconcilerConfig,
        container: HostHandle,
    ) -> Rc<Self> {
        let mut arena = FiberArena::new();
        let host_root_fiber = arena.insert(create_host_root_fiber());
        let queue = QueueState::new(Node::Empty);
        let root_queue = queue.shared.clone();
        arena[host_root_fiber].memoized_state = FiberState::Root(queue);
        let root = FiberRoot::new(container, host_root_fiber);

        Rc::new_cyclic(|this| RootShared {
            this: this.clone(),
            engine: RefCell::new(Engine { arena, root, session: RenderSession::default() }),
            mailbox: RefCell::new(Vec::new()),
            sync_queue: SyncQueue::default(),
            host,
            scheduler,
            config,
            root_queue,
            host_root_fiber,
        })
    }

    pub fn weak(&self) -> Weak<RootShared> {
        self.this.clone()
    }

    /// Lock the engine and run `f`. Returns `None` if the engine is already locked.
    ///
    /// Deferred work is applied after the lock is released.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut WorkCx<'_>) -> R) -> Option<R> {
        let result = {
            let Ok(mut guard) = self.engine.try_borrow_mut() else {
                return None;
            };
            let Engine { arena, root, session } = &mut *guard;
            let mut cx = WorkCx { shared: self, arena, root, session };
            f(&mut cx)
        };
        self.drain_mailbox();
        Some(result)
    }

    fn drain_mailbox(&self) {
        loop {
            let batch = std::mem::take(&mut *self.mailbox.borrow_mut());
            if batch.is_empty() {
                return;
            }
            let Ok(mut guard) = self.engine.try_borrow_mut() else {
                let mut mailbox = self.mailbox.borrow_mut();
                let later = std::mem::replace(&mut *mailbox, batch);
                mailbox.extend(later);
                return;
            };
            let Engine { arena, root, session } = &mut *guard;
            let mut cx = WorkCx { shared: self, arena, root, session };
            for deferred in batch {
                match deferred {
                    Deferred::Update { fiber, lane } => schedule_update_locked(&mut cx, fiber, lane),
                    Deferred::Ping { id, lane, boundaries } => ping_suspended_root(&mut cx, id, lane, &boundaries),
                }
            }
        }
    }

    /// Lane for an update dispatched right now.
    pub fn request_update_lane(&self) -> Lane {
        if IN_TRANSITION.get() {
            return Lanes::TRANSITION;
        }
        scheduler_priority_to_lane(self.scheduler.current_priority())
    }

    /// True when neither buffer of `fiber` has pending work.
    ///
    /// Answers false while the engine is locked.
    pub fn fiber_is_idle(&self, fiber: NodeId) -> bool {
        let Ok(engine) = self.engine.try_borrow() else {
            return false;
        };
        let Some(node) = engine.arena.get(fiber) else {
            return false;
        };
        node.lanes.is_empty()
            && node.alternate.and_then(|alt| engine.arena.get(alt)).is_none_or(|alt| alt.lanes.is_empty())
    }

    pub fn schedule_update_on_fiber(&self, fiber: NodeId, lane: Lane) {
        if self.with_engine(|cx| schedule_update_locked(cx, fiber, lane)).is_none() {
            tracing::trace!(?fiber, ?lane, "engine busy, update deferred");
            self.mailbox.borrow_mut().push(Deferred::Update { fiber, lane });
        }
    }

    /// An awaitable that suspended a render at `lane` settled.
    pub fn ping(&self, id: usize, lane: Lane, boundaries: Rc<RefCell<Vec<NodeId>>>) {
        let list = boundaries.clone();
        if self.with_engine(|cx| ping_suspended_root(cx, id, lane, &list)).is_none() {
            self.mailbox.borrow_mut().push(Deferred::Ping { id, lane, boundaries });
        }
    }
}

fn schedule_update_locked(cx: &mut WorkCx<'_>, fiber: NodeId, lane: Lane) {
    if mark_update_lane_from_fiber_to_root(cx.arena, fiber, lane).is_none() {
        if cx.shared.config.warn_on_unmounted_update {
            tracing::warn!(?fiber, ?lane, "update on an unmounted node ignored");
        }
        return;
    }
    mark_root_updated(&mut cx.root.lanes, lane);
    if cx.session.wip_root.is_some() {
        cx.session.interleaved_lanes = merge_lanes(cx.session.interleaved_lanes, lane);
    }
    ensure_root_scheduled(cx);
}

// =============================================================================
// Scheduling
// =============================================================================

/// Make sure exactly one callback services the root's most urgent lane.
pub(crate) fn ensure_root_scheduled(cx: &mut WorkCx<'_>) {
    let lane = get_next_lane(&cx.root.lanes);
    let existing = cx.root.callback_node;

    if lane == NO_LANE {
        if let Some(token) = existing {
            cx.shared.scheduler.cancel_callback(token);
        }
        cx.root.callback_node = None;
        cx.root.callback_priority = NO_LANE;
        return;
    }
    if lane == cx.root.callback_priority {
        return;
    }
    if let Some(token) = existing {
        tracing::debug!(?token, ?lane, "cancelling callback for a more urgent lane");
        cx.shared.scheduler.cancel_callback(token);
    }
    cx.root.callback_node = None;

    if lane == Lanes::SYNC {
        let weak = cx.shared.weak();
        cx.shared.sync_queue.push(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                perform_sync_work_on_root(&shared);
            }
        }));
        let weak = cx.shared.weak();
        cx.shared.host.schedule_microtask(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.sync_queue.flush();
            }
        }));
    } else {
        let priority = lanes_to_scheduler_priority(lane);
        let token = cx.shared.scheduler.schedule_callback(priority, concurrent_task(cx.shared.weak()));
        tracing::trace!(?lane, ?priority, ?token, "scheduled render");
        cx.root.callback_node = Some(token);
    }
    cx.root.callback_priority = lane;
}

fn concurrent_task(root: Weak<RootShared>) -> SchedulerTask {
    SchedulerTask::new(move |did_timeout| {
        let shared = root.upgrade()?;
        perform_concurrent_work_on_root(&shared, did_timeout)
    })
}

/// Scheduler entry point for non-sync lanes.
///
/// Returns a continuation while the render is unfinished and this task is
/// still the root's callback.
fn perform_concurrent_work_on_root(shared: &RootShared, did_timeout: bool) -> Option<SchedulerTask> {
    let original = shared.with_engine(|cx| cx.root.callback_node)??;

    if flush_passive_effects(shared) {
        // Effects may have scheduled more urgent work.
        let now = shared.with_engine(|cx| cx.root.callback_node)?;
        if now != Some(original) {
            return None;
        }
    }

    let status = shared.with_engine(|cx| {
        let lane = get_next_lane(&cx.root.lanes);
        if lane == NO_LANE {
            ensure_root_scheduled(cx);
            return None;
        }
        let time_slice = cx.shared.config.time_slicing && !did_timeout && lane != Lanes::SYNC;
        let status = render_root(cx, lane, time_slice);
        finish_render(cx, lane, status);
        Some(status)
    })??;

    let now = shared.with_engine(|cx| cx.root.callback_node)?;
    (status == RootExitStatus::Incomplete && now == Some(original)).then(|| concurrent_task(shared.weak()))
}

/// Sync queue entry point.
fn perform_sync_work_on_root(shared: &RootShared) {
    flush_passive_effects(shared);

    let committed = shared
        .with_engine(|cx| {
            let lane = get_next_lane(&cx.root.lanes);
            if lane != Lanes::SYNC {
                ensure_root_scheduled(cx);
                return false;
            }
            let status = render_root(cx, Lanes::SYNC, false);
            finish_render(cx, Lanes::SYNC, status);
            status == RootExitStatus::Completed
        })
        .unwrap_or(false);

    if committed {
        shared.with_engine(check_nested_sync_updates);
    }
}

/// Break runaway loops of sync commits that each schedule another sync update.
fn check_nested_sync_updates(cx: &mut WorkCx<'_>) {
    if !include_some_lanes(cx.root.lanes.pending, Lanes::SYNC) {
        cx.root.nested_sync_commits = 0;
        return;
    }
    cx.root.nested_sync_commits += 1;
    let limit = cx.shared.config.max_render_retries;
    if cx.root.nested_sync_commits <= limit {
        return;
    }

    let error = ReconcileError::NestedUpdateLimit(limit);
    tracing::error!(%error, "dropping pending synchronous updates");
    cx.root.lanes.pending = remove_lanes(cx.root.lanes.pending, Lanes::SYNC);
    cx.shared.root_queue.borrow_mut().pending.retain(|update| update.lane != Lanes::SYNC);
    cx.root.errors.push(error);
    cx.root.nested_sync_commits = 0;
    ensure_root_scheduled(cx);
}

/// Act on how a render ended.
fn finish_render(cx: &mut WorkCx<'_>, lane: Lane, status: RootExitStatus) {
    cx.root.exit_status = status;
    match status {
        RootExitStatus::Completed => commit_root(cx),
        RootExitStatus::DidNotComplete => {
            tracing::debug!(?lane, reason = ?cx.session.suspended_reason, "render suspended with no boundary");
            mark_root_suspended(&mut cx.root.lanes, lane);
            discard_render(cx);
        }
        RootExitStatus::Errored => {
            let error = cx
                .session
                .fatal_error
                .take()
                .unwrap_or_else(|| ReconcileError::Component(String::from("render aborted")));
            tracing::error!(%error, ?lane, "render failed with no error boundary");
            cx.root.lanes.pending = remove_lanes(cx.root.lanes.pending, lane);
            cx.root.errors.push(error);
            discard_render(cx);
        }
        RootExitStatus::Idle | RootExitStatus::InProgress | RootExitStatus::Incomplete => {}
    }
}

fn discard_render(cx: &mut WorkCx<'_>) {
    cx.session.reset();
    cx.root.finished_work = None;
    cx.root.callback_node = None;
    cx.root.callback_priority = NO_LANE;
    ensure_root_scheduled(cx);
}
