//! Begin phase: render one node and reconcile its children.

use super::child::{delete_remaining_children, reconcile_child_fibers};
use crate::context::{propagate_context_change, provided_value};
use crate::error::Outcome;
use crate::fiber::{
    create_fiber_from_fragment, create_fiber_from_offscreen, create_work_in_progress, FiberProps, FiberState, Flags,
    NodeId, OffscreenMode, WorkTag,
};
use crate::hooks::{bailout_hooks, render_with_hooks};
use crate::lanes::{include_some_lanes, NO_LANES};
use crate::types::{Component, ElementType, ErrorFallback, MemoComponent, Node, NodeRef, PropValue, Props, PropsData};
use crate::work_loop::WorkCx;

/// Begin work on `wip`. Returns the next child to work on, or `None` when
/// the node has no child work and can be completed.
pub(crate) fn begin_work(cx: &mut WorkCx<'_>, current: Option<NodeId>, wip: NodeId) -> Outcome<Option<NodeId>> {
    let lane = cx.session.render_lane;

    if let Some(cur) = current {
        let (c, w) = (&cx.arena[cur], &cx.arena[wip]);
        let props_same = w.pending_props.same(&c.memoized_props);
        let type_same = w.element_type == c.element_type;
        let has_update = include_some_lanes(c.lanes, lane);
        let retry_fallback = w.tag == WorkTag::SuspenseComponent
            && matches!(c.memoized_state, FiberState::SuspenseFallback)
            && include_some_lanes(c.child_lanes, lane);

        if props_same && type_same && !has_update && !retry_fallback && !w.flags.contains(Flags::DID_CAPTURE) {
            cx.session.did_receive_update = false;
            push_bailout_context(cx, wip);
            return Ok(bailout_on_already_finished_work(cx, wip));
        }
        cx.session.did_receive_update = !props_same;
    } else {
        cx.session.did_receive_update = false;
    }

    cx.arena[wip].lanes = NO_LANES;

    match cx.arena[wip].tag {
        WorkTag::HostRoot => update_host_root(cx, current, wip),
        WorkTag::HostComponent => Ok(update_host_component(cx, current, wip)),
        WorkTag::HostText => Ok(None),
        WorkTag::FunctionComponent => {
            let (component, props) = match (&cx.arena[wip].element_type, cx.arena[wip].pending_props.element()) {
                (Some(ElementType::Component(c)), Some(props)) => (c.clone(), props.clone()),
                _ => return Ok(None),
            };
            update_function_component(cx, current, wip, &component, &props)
        }
        WorkTag::MemoComponent => {
            let memo = match &cx.arena[wip].element_type {
                Some(ElementType::Memo(memo)) => memo.clone(),
                _ => return Ok(None),
            };
            update_memo_component(cx, current, wip, &memo)
        }
        WorkTag::LazyComponent => {
            let (lazy, props) = match (&cx.arena[wip].element_type, cx.arena[wip].pending_props.element()) {
                (Some(ElementType::Lazy(lazy)), Some(props)) => (lazy.clone(), props.clone()),
                _ => return Ok(None),
            };
            let component = lazy.resolve()?;
            update_function_component(cx, current, wip, &component, &props)
        }
        WorkTag::Fragment | WorkTag::OffscreenComponent => {
            let children = cx.arena[wip].pending_props.children();
            reconcile_children(cx, current, wip, &children);
            Ok(cx.arena[wip].child)
        }
        WorkTag::ContextProvider => Ok(update_context_provider(cx, current, wip)),
        WorkTag::SuspenseComponent => Ok(update_suspense_component(cx, current, wip)),
        WorkTag::ErrorBoundary => Ok(update_error_boundary(cx, current, wip)),
    }
}

// =============================================================================
// Bailout
// =============================================================================

/// Skip a node whose input and state did not change.
///
/// Returns `None` when nothing below needs work at the render lane;
/// otherwise clones the committed children so the walk can reach the
/// descendants that do.
pub(crate) fn bailout_on_already_finished_work(cx: &mut WorkCx<'_>, wip: NodeId) -> Option<NodeId> {
    if !include_some_lanes(cx.arena[wip].child_lanes, cx.session.render_lane) {
        tracing::trace!(fiber = %cx.arena[wip].display_name(), "bailed out of subtree");
        return None;
    }
    clone_child_fibers(cx, wip);
    cx.arena[wip].child
}

/// Replace `wip`'s children (still the committed ones) with their twins.
pub(crate) fn clone_child_fibers(cx: &mut WorkCx<'_>, wip: NodeId) {
    let mut current_child = cx.arena[wip].child;
    let mut previous: Option<NodeId> = None;
    while let Some(cc) = current_child {
        let props = cx.arena[cc].pending_props.clone();
        let clone = create_work_in_progress(cx.arena, cc, props);
        cx.arena[clone].parent = Some(wip);
        cx.arena[clone].sibling = None;
        match previous {
            Some(prev) => cx.arena[prev].sibling = Some(clone),
            None => cx.arena[wip].child = Some(clone),
        }
        previous = Some(clone);
        current_child = cx.arena[cc].sibling;
    }
}

/// Keep the context stacks balanced for a node that bails out: its
/// descendants may still be rendered.
fn push_bailout_context(cx: &mut WorkCx<'_>, wip: NodeId) {
    let node = &cx.arena[wip];
    match node.tag {
        WorkTag::ContextProvider => {
            if let (Some(ElementType::Provider(handle)), Some(props)) = (&node.element_type, node.memoized_props.element()) {
                let value = provided_value(handle, props.get("value"));
                let id = handle.id();
                cx.session.providers.push(wip, id, value);
            }
        }
        WorkTag::SuspenseComponent if !matches!(node.memoized_state, FiberState::SuspenseFallback) => {
            cx.session.push_suspense_handler(wip);
        }
        WorkTag::ErrorBoundary if !matches!(node.memoized_state, FiberState::Captured(_)) => {
            cx.session.push_error_boundary(wip);
        }
        _ => {}
    }
}

fn reconcile_children(cx: &mut WorkCx<'_>, current: Option<NodeId>, wip: NodeId, children: &Node) {
    let lanes = cx.session.render_lane;
    match current {
        None => {
            reconcile_child_fibers(cx.arena, wip, None, children, lanes, false);
        }
        Some(cur) => {
            let current_first = cx.arena[cur].child;
            reconcile_child_fibers(cx.arena, wip, current_first, children, lanes, true);
        }
    }
}

// =============================================================================
// Host Nodes
// =============================================================================

fn update_host_root(cx: &mut WorkCx<'_>, current: Option<NodeId>, wip: NodeId) -> Outcome<Option<NodeId>> {
    let Some(cur) = current else {
        return Ok(None);
    };
    let queue = match &mut cx.arena[cur].memoized_state {
        FiberState::Root(queue) => {
            // Land pending updates on the committed buffer so a discarded render keeps them.
            crate::update_queue::merge_pending_into_base(queue);
            queue.clone()
        }
        _ => return Ok(None),
    };

    let lane = cx.session.render_lane;
    let mut skipped = NO_LANES;
    let processed = crate::update_queue::process_update_queue(
        queue.base_state.clone(),
        &queue.base_queue,
        lane,
        |_, next: &Node| next.clone(),
        |l| skipped |= l,
    );
    let previous = queue.memoized_state.clone();
    let next = processed.memoized_state.clone();

    let node = &mut cx.arena[wip];
    node.lanes |= skipped;
    node.memoized_state = FiberState::Root(crate::update_queue::QueueState {
        memoized_state: processed.memoized_state,
        base_state: processed.base_state,
        base_queue: processed.base_queue,
        shared: queue.shared,
    });

    if next.same(&previous) {
        return Ok(bailout_on_already_finished_work(cx, wip));
    }
    reconcile_children(cx, current, wip, &next);
    Ok(cx.arena[wip].child)
}

fn update_host_component(cx: &mut WorkCx<'_>, current: Option<NodeId>, wip: NodeId) -> Option<NodeId> {
    let children = cx.arena[wip].pending_props.children();
    mark_ref(cx, current, wip);
    reconcile_children(cx, current, wip, &children);
    cx.arena[wip].child
}

fn mark_ref(cx: &mut WorkCx<'_>, current: Option<NodeId>, wip: NodeId) {
    let next = &cx.arena[wip].node_ref;
    let changed = match current {
        None => next.is_some(),
        Some(cur) => !NodeRef::same_opt(&cx.arena[cur].node_ref, next),
    };
    if changed {
        cx.arena[wip].flags |= Flags::REF;
    }
}

// =============================================================================
// Components
// =============================================================================

fn update_function_component(
    cx: &mut WorkCx<'_>,
    current: Option<NodeId>,
    wip: NodeId,
    component: &Component,
    props: &Props,
) -> Outcome<Option<NodeId>> {
    let children = render_with_hooks(cx, current, wip, component, props)?;
    if let Some(cur) = current {
        if !cx.session.did_receive_update {
            bailout_hooks(cx, cur, wip);
            return Ok(bailout_on_already_finished_work(cx, wip));
        }
    }
    reconcile_children(cx, current, wip, &children);
    Ok(cx.arena[wip].child)
}

fn update_memo_component(
    cx: &mut WorkCx<'_>,
    current: Option<NodeId>,
    wip: NodeId,
    memo: &MemoComponent,
) -> Outcome<Option<NodeId>> {
    let Some(next) = cx.arena[wip].pending_props.element().cloned() else {
        return Ok(None);
    };
    if let Some(cur) = current {
        let c = &cx.arena[cur];
        let w = &cx.arena[wip];
        let unchanged = !include_some_lanes(c.lanes, cx.session.render_lane)
            && NodeRef::same_opt(&c.node_ref, &w.node_ref)
            && c.memoized_props.element().is_some_and(|prev| memo.props_equal(prev, &next));
        if unchanged {
            let memoized = c.memoized_props.clone();
            cx.arena[wip].pending_props = memoized;
            cx.session.did_receive_update = false;
            tracing::trace!(component = memo.inner().name(), "memo props equal, skipping render");
            return Ok(bailout_on_already_finished_work(cx, wip));
        }
    }
    let component = memo.inner().clone();
    update_function_component(cx, current, wip, &component, &next)
}

fn update_context_provider(cx: &mut WorkCx<'_>, current: Option<NodeId>, wip: NodeId) -> Option<NodeId> {
    let (handle, props) = match (&cx.arena[wip].element_type, cx.arena[wip].pending_props.element()) {
        (Some(ElementType::Provider(handle)), Some(props)) => (handle.clone(), props.clone()),
        _ => return None,
    };
    let value = provided_value(&handle, props.get("value"));
    cx.session.providers.push(wip, handle.id(), value.clone());

    if let Some(old_props) = current.and_then(|cur| cx.arena[cur].memoized_props.element().cloned()) {
        let old_value = provided_value(&handle, old_props.get("value"));
        if handle.values_equal(&old_value, &value) {
            if old_props.children.same(&props.children) {
                return bailout_on_already_finished_work(cx, wip);
            }
        } else {
            tracing::debug!(context = handle.name(), "context value changed");
            propagate_context_change(cx.arena, wip, handle.id(), cx.session.render_lane);
        }
    }
    reconcile_children(cx, current, wip, &props.children);
    cx.arena[wip].child
}

// =============================================================================
// Suspense
// =============================================================================

fn suspense_fallback(props: &PropsData) -> Node {
    match props.get("fallback") {
        Some(PropValue::Node(node)) => node.clone(),
        _ => Node::Empty,
    }
}

/// Suspense keeps its primary children under an offscreen node so their
/// state survives while the fallback is shown:
///
/// ```text
/// Suspense -> Offscreen(primary) -> Fragment(fallback)   [fallback mode]
/// Suspense -> Offscreen(primary)                        [primary mode]
/// ```
///
/// In fallback mode the offscreen node is not rendered; it keeps the
/// committed children and is hidden at commit.
fn update_suspense_component(cx: &mut WorkCx<'_>, current: Option<NodeId>, wip: NodeId) -> Option<NodeId> {
    let Some(props) = cx.arena[wip].pending_props.element().cloned() else {
        return None;
    };
    let primary = props.children.clone();
    let show_fallback = cx.arena[wip].flags.contains(Flags::DID_CAPTURE);
    if show_fallback {
        cx.arena[wip].flags.remove(Flags::DID_CAPTURE);
    } else {
        cx.session.push_suspense_handler(wip);
    }

    let current_offscreen = current.and_then(|cur| cx.arena[cur].child);
    let next = match (current_offscreen, show_fallback) {
        (None, false) => mount_suspense_primary(cx, wip, primary),
        (None, true) => mount_suspense_fallback(cx, wip, primary, suspense_fallback(&props)),
        (Some(offscreen), false) => update_suspense_primary(cx, wip, offscreen, primary),
        (Some(offscreen), true) => update_suspense_fallback(cx, wip, offscreen, primary, suspense_fallback(&props)),
    };
    cx.arena[wip].memoized_state = if show_fallback { FiberState::SuspenseFallback } else { FiberState::None };
    Some(next)
}

fn link_suspense_children(cx: &mut WorkCx<'_>, wip: NodeId, offscreen: NodeId, fallback: Option<NodeId>) {
    cx.arena[wip].child = Some(offscreen);
    let node = &mut cx.arena[offscreen];
    node.parent = Some(wip);
    node.sibling = fallback;
    node.index = 0;
    if let Some(fallback) = fallback {
        let node = &mut cx.arena[fallback];
        node.parent = Some(wip);
        node.sibling = None;
        node.index = 1;
    }
}

fn mount_suspense_primary(cx: &mut WorkCx<'_>, wip: NodeId, primary: Node) -> NodeId {
    let offscreen = cx.arena.insert(create_fiber_from_offscreen(OffscreenMode::Visible, primary, NO_LANES));
    link_suspense_children(cx, wip, offscreen, None);
    offscreen
}

fn mount_suspense_fallback(cx: &mut WorkCx<'_>, wip: NodeId, primary: Node, fallback: Node) -> NodeId {
    let offscreen = cx.arena.insert(create_fiber_from_offscreen(OffscreenMode::Hidden, primary, NO_LANES));
    let node = &mut cx.arena[offscreen];
    node.memoized_props = node.pending_props.clone();
    let fragment = cx.arena.insert(create_fiber_from_fragment(fallback, None, NO_LANES));
    link_suspense_children(cx, wip, offscreen, Some(fragment));
    fragment
}

fn update_suspense_primary(cx: &mut WorkCx<'_>, wip: NodeId, current_offscreen: NodeId, primary: Node) -> NodeId {
    let current_fallback = cx.arena[current_offscreen].sibling;
    let offscreen = create_work_in_progress(
        cx.arena,
        current_offscreen,
        FiberProps::Offscreen { mode: OffscreenMode::Visible, children: primary },
    );
    if let Some(fallback) = current_fallback {
        let node = &mut cx.arena[wip];
        node.deletions.push(fallback);
        node.flags |= Flags::CHILD_DELETION;
    }
    link_suspense_children(cx, wip, offscreen, None);
    offscreen
}

fn update_suspense_fallback(
    cx: &mut WorkCx<'_>,
    wip: NodeId,
    current_offscreen: NodeId,
    primary: Node,
    fallback: Node,
) -> NodeId {
    let current_fallback = cx.arena[current_offscreen].sibling;
    let offscreen = create_work_in_progress(
        cx.arena,
        current_offscreen,
        FiberProps::Offscreen { mode: OffscreenMode::Hidden, children: primary },
    );
    let node = &mut cx.arena[offscreen];
    node.memoized_props = node.pending_props.clone();

    let fragment = match current_fallback {
        Some(current_fallback) => {
            create_work_in_progress(cx.arena, current_fallback, FiberProps::Children(fallback))
        }
        None => {
            let mut fiber = create_fiber_from_fragment(fallback, None, NO_LANES);
            fiber.flags |= Flags::PLACEMENT;
            cx.arena.insert(fiber)
        }
    };
    link_suspense_children(cx, wip, offscreen, Some(fragment));
    fragment
}

// =============================================================================
// Error Boundaries
// =============================================================================

fn update_error_boundary(cx: &mut WorkCx<'_>, current: Option<NodeId>, wip: NodeId) -> Option<NodeId> {
    let Some(props) = cx.arena[wip].pending_props.element().cloned() else {
        return None;
    };
    let fallback = match props.get("fallback") {
        Some(PropValue::Any(value)) => value.clone().downcast::<ErrorFallback>().ok(),
        _ => None,
    };
    let render_fallback = |error: &crate::error::ReconcileError| match &fallback {
        Some(fallback) => (fallback.0)(error),
        None => Node::Empty,
    };

    let captured = match &cx.arena[wip].memoized_state {
        FiberState::Captured(error) => Some(error.clone()),
        _ => None,
    };

    if cx.arena[wip].flags.contains(Flags::DID_CAPTURE) {
        cx.arena[wip].flags.remove(Flags::DID_CAPTURE);
        let children = captured.as_ref().map(render_fallback).unwrap_or_default();
        // Whatever the failed attempt built is dropped: remove the committed
        // children and mount the fallback fresh.
        let lanes = cx.session.render_lane;
        match current {
            Some(cur) => {
                let current_first = cx.arena[cur].child;
                delete_remaining_children(cx.arena, wip, current_first);
                reconcile_child_fibers(cx.arena, wip, None, &children, lanes, true);
            }
            None => {
                reconcile_child_fibers(cx.arena, wip, None, &children, lanes, false);
            }
        }
        return cx.arena[wip].child;
    }

    match captured {
        Some(error) => {
            let children = render_fallback(&error);
            reconcile_children(cx, current, wip, &children);
        }
        None => {
            cx.session.push_error_boundary(wip);
            reconcile_children(cx, current, wip, &props.children);
        }
    }
    cx.arena[wip].child
}

