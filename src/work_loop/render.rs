//! The render phase: a depth-first walk over work-in-progress nodes.
//!
//! Each unit of work is one `begin_work` call. A node without further child
//! work is completed, then the walk moves to its sibling or back up to its
//! parent. Interrupts raised by `begin_work` divert the walk to the nearest
//! boundary (see `suspense::throw`).

use super::{RootExitStatus, WorkCx};
use crate::error::Interrupt;
use crate::fiber::{create_work_in_progress, NodeId};
use crate::lanes::Lane;
use crate::reconcile::{begin_work, complete_work};
use crate::suspense::throw::{throw_exception, unwind_unit_of_work};

/// Render the root at `lane`, resuming the in-progress render when it is for
/// the same lane.
///
/// With `time_slice` the loop checks `should_yield` before every unit and
/// returns [`RootExitStatus::Incomplete`] when asked to yield.
pub(crate) fn render_root(cx: &mut WorkCx<'_>, lane: Lane, time_slice: bool) -> RootExitStatus {
    if cx.session.wip_root.is_none() || cx.session.render_lane != lane {
        prepare_fresh_stack(cx, lane);
    }
    cx.session.exit_status = RootExitStatus::InProgress;

    while let Some(unit) = cx.session.work_in_progress {
        if time_slice && cx.shared.scheduler.should_yield() {
            tracing::trace!(?lane, "yielding to the scheduler");
            cx.session.exit_status = RootExitStatus::Incomplete;
            return RootExitStatus::Incomplete;
        }
        perform_unit_of_work(cx, unit);
    }

    match cx.session.exit_status {
        status @ (RootExitStatus::DidNotComplete | RootExitStatus::Errored) => status,
        _ => {
            cx.session.exit_status = RootExitStatus::Completed;
            cx.root.finished_work = cx.session.wip_root;
            cx.root.finished_lane = lane;
            RootExitStatus::Completed
        }
    }
}

/// Throw away any half-built tree and start over from `current`.
fn prepare_fresh_stack(cx: &mut WorkCx<'_>, lane: Lane) {
    if cx.session.wip_root.is_some() {
        tracing::debug!(from = ?cx.session.render_lane, to = ?lane, "restarting render");
    }
    cx.root.finished_work = None;
    cx.session.reset();
    cx.session.render_lane = lane;

    let current = cx.root.current;
    let props = cx.arena[current].pending_props.clone();
    let wip = create_work_in_progress(cx.arena, current, props);
    cx.arena[wip].parent = None;
    cx.session.wip_root = Some(wip);
    cx.session.work_in_progress = Some(wip);
}

fn perform_unit_of_work(cx: &mut WorkCx<'_>, unit: NodeId) {
    let current = cx.arena[unit].alternate;
    match begin_work(cx, current, unit) {
        Ok(next) => {
            let node = &mut cx.arena[unit];
            node.memoized_props = node.pending_props.clone();
            match next {
                Some(child) => cx.session.work_in_progress = Some(child),
                None => complete_unit_of_work(cx, unit),
            }
        }
        Err(interrupt) => handle_interrupt(cx, unit, interrupt),
    }
}

fn complete_unit_of_work(cx: &mut WorkCx<'_>, unit: NodeId) {
    let mut node = unit;
    loop {
        let current = cx.arena[node].alternate;
        complete_work(cx, current, node);

        if Some(node) == cx.session.wip_root {
            cx.session.work_in_progress = None;
            return;
        }
        if let Some(sibling) = cx.arena[node].sibling {
            cx.session.work_in_progress = Some(sibling);
            return;
        }
        match cx.arena[node].parent {
            Some(parent) => node = parent,
            None => {
                cx.session.work_in_progress = None;
                return;
            }
        }
    }
}

fn handle_interrupt(cx: &mut WorkCx<'_>, unit: NodeId, interrupt: Interrupt) {
    if throw_exception(cx, unit, interrupt) {
        unwind_unit_of_work(cx, unit);
    }
}
