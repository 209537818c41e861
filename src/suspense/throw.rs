//! Throwing, unwinding and pinging.

use std::cell::RefCell;
use std::rc::Rc;

use super::{Awaitable, SuspendedReason, Suspension};
use crate::error::Interrupt;
use crate::fiber::{mark_update_lane_from_fiber_to_root, FiberState, Flags, NodeId, PingEntry, WorkTag, HOST_EFFECT_MASK};
use crate::lanes::{include_some_lanes, mark_root_pinged, mark_root_updated, merge_lanes, Lane, NO_LANES};
use crate::work_loop::{ensure_root_scheduled, RootExitStatus, WorkCx};

/// Route an interrupt raised while beginning `unit`.
///
/// Returns true when a boundary was marked and the caller should unwind to
/// it. Otherwise the render is over: errored for unhandled failures, or,
/// for suspensions with no boundary, did-not-complete after the unwind.
pub(crate) fn throw_exception(cx: &mut WorkCx<'_>, unit: NodeId, interrupt: Interrupt) -> bool {
    match interrupt {
        Interrupt::Suspended(Suspension { awaitable, reason }) => {
            cx.session.suspended_reason = Some(reason);
            let boundary = cx.session.suspense_handlers.last().copied();
            tracing::debug!(
                fiber = %cx.arena[unit].display_name(),
                ?reason,
                awaitable = awaitable.id(),
                has_boundary = boundary.is_some(),
                "render suspended"
            );
            if let Some(boundary) = boundary {
                cx.arena[boundary].flags |= Flags::SHOULD_CAPTURE;
            }
            let lane = cx.session.render_lane;
            attach_ping_listener(cx, &awaitable, lane, boundary);
            true
        }
        Interrupt::Failed(error) => {
            cx.session.suspended_reason = Some(SuspendedReason::Error);
            let boundary = if error.is_fatal() { None } else { cx.session.error_boundaries.last().copied() };
            match boundary {
                Some(boundary) => {
                    tracing::warn!(%error, fiber = %cx.arena[unit].display_name(), "render failed, showing error fallback");
                    let node = &mut cx.arena[boundary];
                    node.flags |= Flags::SHOULD_CAPTURE;
                    node.memoized_state = FiberState::Captured(error);
                    true
                }
                None => {
                    cx.session.fatal_error = Some(error);
                    cx.session.exit_status = RootExitStatus::Errored;
                    cx.session.work_in_progress = None;
                    false
                }
            }
        }
    }
}

/// Listen for `awaitable` settling, once per (awaitable, lane).
fn attach_ping_listener(cx: &mut WorkCx<'_>, awaitable: &Awaitable, lane: Lane, boundary: Option<NodeId>) {
    let id = awaitable.id();
    let entry = cx
        .root
        .ping_cache
        .entry(id)
        .or_insert_with(|| PingEntry { lanes: NO_LANES, boundaries: Rc::default() });
    if let Some(boundary) = boundary {
        let mut boundaries = entry.boundaries.borrow_mut();
        if !boundaries.contains(&boundary) {
            boundaries.push(boundary);
        }
    }
    if include_some_lanes(entry.lanes, lane) {
        return;
    }
    entry.lanes = merge_lanes(entry.lanes, lane);

    let boundaries = entry.boundaries.clone();
    let on_error_boundaries = boundaries.clone();
    let weak = cx.shared.weak();
    let on_error_weak = weak.clone();
    tracing::trace!(awaitable = id, ?lane, "attached ping listener");
    awaitable.then(
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.ping(id, lane, boundaries);
            }
        }),
        Box::new(move |reason| {
            // The retry re-reads the awaitable and surfaces the rejection.
            tracing::debug!(awaitable = id, %reason, "awaitable rejected");
            if let Some(shared) = on_error_weak.upgrade() {
                shared.ping(id, lane, on_error_boundaries);
            }
        }),
    );
}

/// Handle a settled awaitable: retry the boundaries that showed a fallback
/// for it and unblock the suspended lane.
pub(crate) fn ping_suspended_root(cx: &mut WorkCx<'_>, id: usize, lane: Lane, boundaries: &Rc<RefCell<Vec<NodeId>>>) {
    cx.root.ping_cache.remove(&id);
    let boundaries: Vec<NodeId> = boundaries.borrow().clone();
    let mut retried = 0;
    for boundary in &boundaries {
        if mark_update_lane_from_fiber_to_root(cx.arena, *boundary, lane).is_some() {
            retried += 1;
        }
    }
    tracing::debug!(awaitable = id, ?lane, retried, "ping");
    mark_root_pinged(&mut cx.root.lanes, lane);
    if retried > 0 {
        mark_root_updated(&mut cx.root.lanes, lane);
    }
    ensure_root_scheduled(cx);
}

/// Undo the context a node pushed in `begin_work`. Returns true when the
/// node is the boundary that captured the interrupt.
fn unwind_work(cx: &mut WorkCx<'_>, id: NodeId) -> bool {
    let tag = cx.arena[id].tag;
    match tag {
        WorkTag::SuspenseComponent | WorkTag::ErrorBoundary => {
            if tag == WorkTag::SuspenseComponent {
                cx.session.pop_suspense_handler(id);
            } else {
                cx.session.pop_error_boundary(id);
            }
            let node = &mut cx.arena[id];
            if !node.flags.contains(Flags::SHOULD_CAPTURE) {
                return false;
            }
            node.flags.remove(Flags::SHOULD_CAPTURE);
            node.flags |= Flags::DID_CAPTURE;
            if tag == WorkTag::SuspenseComponent {
                cx.session.showed_fallback = true;
            }
            true
        }
        WorkTag::ContextProvider => {
            cx.session.providers.pop(id);
            false
        }
        _ => false,
    }
}

/// Walk up from `unit` to the capturing boundary and restart work there.
pub(crate) fn unwind_unit_of_work(cx: &mut WorkCx<'_>, unit: NodeId) {
    let mut cursor = Some(unit);
    while let Some(id) = cursor {
        if unwind_work(cx, id) {
            let node = &mut cx.arena[id];
            node.flags &= HOST_EFFECT_MASK;
            node.subtree_flags = Flags::empty();
            cx.session.work_in_progress = Some(id);
            return;
        }
        let parent = cx.arena[id].parent;
        if let Some(parent) = parent {
            let node = &mut cx.arena[parent];
            node.subtree_flags = Flags::empty();
            node.deletions.clear();
        }
        cursor = parent;
    }
    cx.session.exit_status = RootExitStatus::DidNotComplete;
    cx.session.work_in_progress = None;
}
