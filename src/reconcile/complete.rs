//! Complete phase: create host instances and bubble flags and lanes.

use std::rc::Rc;

use crate::fiber::{FiberArena, FiberState, Flags, NodeId, WorkTag};
use crate::lanes::{merge_lanes, NO_LANES};
use crate::types::{ElementType, HostHandle};
use crate::work_loop::WorkCx;

/// Finish `wip` once all of its children are complete.
pub(crate) fn complete_work(cx: &mut WorkCx<'_>, current: Option<NodeId>, wip: NodeId) {
    match cx.arena[wip].tag {
        WorkTag::HostComponent => complete_host_component(cx, current, wip),
        WorkTag::HostText => complete_host_text(cx, current, wip),
        WorkTag::ContextProvider => cx.session.providers.pop(wip),
        WorkTag::SuspenseComponent => {
            cx.session.pop_suspense_handler(wip);
            complete_suspense(cx, current, wip);
        }
        WorkTag::ErrorBoundary => cx.session.pop_error_boundary(wip),
        WorkTag::HostRoot
        | WorkTag::FunctionComponent
        | WorkTag::Fragment
        | WorkTag::OffscreenComponent
        | WorkTag::LazyComponent
        | WorkTag::MemoComponent => {}
    }
    bubble_properties(cx.arena, wip);
}

fn complete_host_component(cx: &mut WorkCx<'_>, current: Option<NodeId>, wip: NodeId) {
    let existing = current.and_then(|cur| cx.arena[cur].state_node);
    if let (Some(cur), Some(_)) = (current, existing) {
        let old = cx.arena[cur].memoized_props.element();
        let new = cx.arena[wip].pending_props.element();
        let changed = match (old, new) {
            (Some(old), Some(new)) => !Rc::ptr_eq(old, new) && old.attrs != new.attrs,
            _ => false,
        };
        if changed {
            cx.arena[wip].flags |= Flags::UPDATE;
        }
        return;
    }

    let tag = match &cx.arena[wip].element_type {
        Some(ElementType::Host(tag)) => tag.clone(),
        _ => return,
    };
    let Some(props) = cx.arena[wip].pending_props.element().cloned() else {
        return;
    };
    let handle = cx.shared.host.create_instance(&tag, &props);
    append_all_children(cx, handle, wip);
    cx.arena[wip].state_node = Some(handle);
    tracing::trace!(%tag, ?handle, "created host instance");
}

fn complete_host_text(cx: &mut WorkCx<'_>, current: Option<NodeId>, wip: NodeId) {
    let Some(text) = cx.arena[wip].pending_props.text().cloned() else {
        return;
    };
    match current.filter(|cur| cx.arena[*cur].state_node.is_some()) {
        Some(cur) => {
            if cx.arena[cur].memoized_props.text() != Some(&text) {
                cx.arena[wip].flags |= Flags::UPDATE;
            }
        }
        None => {
            let handle = cx.shared.host.create_text_instance(&text);
            cx.arena[wip].state_node = Some(handle);
        }
    }
}

/// Attach the nearest host descendants of `wip` to its fresh instance.
/// The subtree is new, so no placement is needed for them later.
fn append_all_children(cx: &mut WorkCx<'_>, parent: HostHandle, wip: NodeId) {
    let mut stack: Vec<NodeId> = cx.arena.children(wip).into_iter().rev().collect();
    while let Some(id) = stack.pop() {
        let node = &cx.arena[id];
        match (node.tag.is_host(), node.state_node) {
            (true, Some(handle)) => cx.shared.host.append_child(parent, handle),
            (true, None) => {}
            (false, _) => stack.extend(cx.arena.children(id).into_iter().rev()),
        }
    }
}

/// Flag the offscreen wrapper when the boundary switches between its
/// primary children and its fallback.
fn complete_suspense(cx: &mut WorkCx<'_>, current: Option<NodeId>, wip: NodeId) {
    let Some(cur) = current else {
        return;
    };
    let was_fallback = matches!(cx.arena[cur].memoized_state, FiberState::SuspenseFallback);
    let is_fallback = matches!(cx.arena[wip].memoized_state, FiberState::SuspenseFallback);
    if was_fallback == is_fallback {
        return;
    }
    if let Some(offscreen) = cx.arena[wip].child {
        tracing::debug!(showing_fallback = is_fallback, "suspense boundary toggled");
        cx.arena[offscreen].flags |= Flags::VISIBILITY;
        bubble_properties(cx.arena, offscreen);
    }
}

/// Fold children's lanes and flags into `wip`.
///
/// When `wip` bailed out its children are the committed ones: only their
/// lanes carry over, their flags belong to the last commit.
pub(crate) fn bubble_properties(arena: &mut FiberArena, wip: NodeId) {
    let first_child = arena[wip].child;
    let did_bailout = first_child.is_some()
        && arena[wip].alternate.and_then(|alt| arena.get(alt)).is_some_and(|alt| alt.child == first_child);

    let mut child_lanes = NO_LANES;
    let mut subtree_flags = Flags::empty();
    let mut child = first_child;
    while let Some(id) = child {
        let node = &arena[id];
        child_lanes = merge_lanes(child_lanes, merge_lanes(node.lanes, node.child_lanes));
        if !did_bailout {
            subtree_flags |= node.subtree_flags | node.flags;
        }
        child = node.sibling;
        if !did_bailout {
            arena[id].parent = Some(wip);
        }
    }

    let node = &mut arena[wip];
    node.child_lanes = child_lanes;
    node.subtree_flags |= subtree_flags;
}
