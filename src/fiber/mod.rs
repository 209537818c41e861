//! Fiber - The dual-buffer node tree.
//!
//! Each tree position exists as up to two [`FiberNode`]s linked through
//! `alternate`: the *current* node (last commit) and the *work-in-progress*
//! node (render being computed). Nodes live in a [`FiberArena`] and refer to
//! each other by [`NodeId`].
//!
//! - Node constructors from intent-tree elements, text and fragments
//! - [`create_work_in_progress`] to clone (or recycle) a current node's alternate
//! - [`mark_update_lane_from_fiber_to_root`] to bubble a lane to the root

pub mod arena;
pub mod flags;
pub mod node;
pub mod root;

pub use arena::{FiberArena, NodeId};
pub use flags::{Flags, HookFlags, HOST_EFFECT_MASK, LAYOUT_MASK, MUTATION_MASK, PASSIVE_MASK};
pub use node::{FiberNode, FiberProps, FiberState, OffscreenMode, WorkTag};
pub use root::{FiberRoot, PendingPassiveEffects, PingEntry};

use std::rc::Rc;

use crate::lanes::{merge_lanes, Lane, Lanes};
use crate::types::{Element, ElementType, Key, Node};

// =============================================================================
// Constructors
// =============================================================================

pub fn create_host_root_fiber() -> FiberNode {
    FiberNode::new(WorkTag::HostRoot, FiberProps::Empty, None)
}

/// Node for an element of any type.
pub fn create_fiber_from_element(element: &Element, lanes: Lanes) -> FiberNode {
    let props = FiberProps::Element(element.props.clone());
    let (tag, props) = match &element.ty {
        ElementType::Host(_) => (WorkTag::HostComponent, props),
        ElementType::Component(_) => (WorkTag::FunctionComponent, props),
        ElementType::Fragment => (WorkTag::Fragment, FiberProps::Children(element.props.children.clone())),
        ElementType::Provider(_) => (WorkTag::ContextProvider, props),
        ElementType::Suspense => (WorkTag::SuspenseComponent, props),
        ElementType::Memo(_) => (WorkTag::MemoComponent, props),
        ElementType::Lazy(_) => (WorkTag::LazyComponent, props),
        ElementType::ErrorBoundary => (WorkTag::ErrorBoundary, props),
    };
    let mut fiber = FiberNode::new(tag, props, element.key.clone());
    fiber.element_type = Some(element.ty.clone());
    fiber.node_ref = element.node_ref.clone();
    fiber.lanes = lanes;
    fiber
}

pub fn create_fiber_from_text(text: Rc<str>, lanes: Lanes) -> FiberNode {
    let mut fiber = FiberNode::new(WorkTag::HostText, FiberProps::Text(text), None);
    fiber.lanes = lanes;
    fiber
}

/// Fragment node for a nested list or a keyed fragment element.
pub fn create_fiber_from_fragment(children: Node, key: Option<Key>, lanes: Lanes) -> FiberNode {
    let mut fiber = FiberNode::new(WorkTag::Fragment, FiberProps::Children(children), key);
    fiber.element_type = Some(ElementType::Fragment);
    fiber.lanes = lanes;
    fiber
}

pub fn create_fiber_from_offscreen(mode: OffscreenMode, children: Node, lanes: Lanes) -> FiberNode {
    let mut fiber = FiberNode::new(WorkTag::OffscreenComponent, FiberProps::Offscreen { mode, children }, None);
    fiber.lanes = lanes;
    fiber
}

// =============================================================================
// Work In Progress
// =============================================================================

/// Get the work-in-progress twin of `current`, creating it on first use.
///
/// The twin gets `pending_props`, cleared effect flags and deletions, and
/// a copy of everything else the current node memoized.
pub fn create_work_in_progress(arena: &mut FiberArena, current: NodeId, pending_props: FiberProps) -> NodeId {
    let existing = arena[current].alternate.filter(|id| arena.contains(*id));
    let wip = match existing {
        Some(wip) => {
            let node = &mut arena[wip];
            node.pending_props = pending_props;
            node.flags = Flags::empty();
            node.subtree_flags = Flags::empty();
            node.deletions.clear();
            wip
        }
        None => {
            let source = &arena[current];
            let mut node = FiberNode::new(source.tag, pending_props, source.key.clone());
            node.alternate = Some(current);
            let wip = arena.insert(node);
            arena[current].alternate = Some(wip);
            wip
        }
    };

    let source = &arena[current];
    let element_type = source.element_type.clone();
    let state_node = source.state_node;
    let (child, sibling, index) = (source.child, source.sibling, source.index);
    let memoized_props = source.memoized_props.clone();
    let memoized_state = source.memoized_state.clone();
    let node_ref = source.node_ref.clone();
    let (lanes, child_lanes) = (source.lanes, source.child_lanes);
    let dependencies = source.dependencies.clone();
    let effects = source.effects.clone();

    let node = &mut arena[wip];
    node.element_type = element_type;
    node.state_node = state_node;
    node.child = child;
    node.sibling = sibling;
    node.index = index;
    node.memoized_props = memoized_props;
    node.memoized_state = memoized_state;
    node.node_ref = node_ref;
    node.lanes = lanes;
    node.child_lanes = child_lanes;
    node.dependencies = dependencies;
    node.effects = effects;
    wip
}

/// Record `lane` on `fiber` (both buffers) and on every ancestor's child lanes.
///
/// Returns the host root reached, or `None` when the node is detached
/// (unmounted, or its id went stale).
pub fn mark_update_lane_from_fiber_to_root(arena: &mut FiberArena, fiber: NodeId, lane: Lane) -> Option<NodeId> {
    let node = arena.get_mut(fiber)?;
    node.lanes = merge_lanes(node.lanes, lane);
    let alternate = node.alternate;
    if let Some(alt) = alternate.and_then(|id| arena.get_mut(id)) {
        alt.lanes = merge_lanes(alt.lanes, lane);
    }

    let mut node = fiber;
    let mut parent = arena[fiber].parent;
    while let Some(id) = parent {
        let Some(p) = arena.get_mut(id) else {
            return None;
        };
        p.child_lanes = merge_lanes(p.child_lanes, lane);
        let (alternate, next) = (p.alternate, p.parent);
        if let Some(alt) = alternate.and_then(|id| arena.get_mut(id)) {
            alt.child_lanes = merge_lanes(alt.child_lanes, lane);
        }
        node = id;
        parent = next;
    }

    (arena[node].tag == WorkTag::HostRoot).then_some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::host;

    #[test]
    fn test_create_work_in_progress_recycles_alternate() {
        let mut arena = FiberArena::new();
        let current = arena.insert(create_fiber_from_text("a".into(), Lanes::empty()));
        arena[current].flags = Flags::UPDATE;

        let wip = create_work_in_progress(&mut arena, current, FiberProps::Text("b".into()));
        assert_eq!(arena[wip].alternate, Some(current));
        assert_eq!(arena[current].alternate, Some(wip));
        assert!(arena[wip].flags.is_empty());

        arena[wip].flags = Flags::PLACEMENT;
        let again = create_work_in_progress(&mut arena, current, FiberProps::Text("c".into()));
        assert_eq!(again, wip);
        assert!(arena[again].flags.is_empty());
        assert_eq!(arena[again].pending_props.text().map(|t| &**t), Some("c"));
    }

    #[test]
    fn test_mark_lane_bubbles_to_root() {
        let mut arena = FiberArena::new();
        let root = arena.insert(create_host_root_fiber());
        let Node::Element(el) = host("div").build() else { unreachable!() };
        let div = arena.insert(create_fiber_from_element(&el, Lanes::empty()));
        let text = arena.insert(create_fiber_from_text("t".into(), Lanes::empty()));
        arena[div].parent = Some(root);
        arena[text].parent = Some(div);

        assert_eq!(mark_update_lane_from_fiber_to_root(&mut arena, text, Lanes::DEFAULT), Some(root));
        assert_eq!(arena[text].lanes, Lanes::DEFAULT);
        assert_eq!(arena[div].child_lanes, Lanes::DEFAULT);
        assert_eq!(arena[root].child_lanes, Lanes::DEFAULT);
    }

    #[test]
    fn test_mark_lane_on_detached_node() {
        let mut arena = FiberArena::new();
        let orphan = arena.insert(create_fiber_from_text("t".into(), Lanes::empty()));
        assert_eq!(mark_update_lane_from_fiber_to_root(&mut arena, orphan, Lanes::SYNC), None);
    }
}
