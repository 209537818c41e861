//! Commit - Applying a finished render to the host.
//!
//! Commit always runs synchronously to completion:
//! 1. mutation pass: placements, updates, deletions, visibility toggles,
//!    stale reference detachment, queuing of deferred effects
//! 2. tree swap: the finished work-in-progress becomes `current`
//! 3. reference-binding pass: attach references to realized handles
//! 4. reclaim unreachable nodes and schedule the deferred-effect flush
//!
//! Both passes share [`traverse_effects`], which only descends into a child
//! run when the parent's subtree flags intersect the pass mask.

mod mutation;
mod passive;

pub(crate) use passive::flush_passive_effects;

use crate::fiber::{FiberArena, Flags, NodeId, WorkTag, LAYOUT_MASK, MUTATION_MASK, PASSIVE_MASK};
use crate::lanes::{include_some_lanes, mark_root_finished, mark_root_suspended, merge_lanes, Lane, NO_LANE};
use crate::types::Key;
use crate::work_loop::{ensure_root_scheduled, WorkCx};

/// What the last commit did. Returned by `Root::last_commit`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Lane the committed render serviced.
    pub lane: Lane,
    /// Keys of newly created nodes flagged for placement, in commit order.
    pub inserted: Vec<Option<Key>>,
    /// Keys of reused nodes flagged for placement (moves).
    pub moved: Vec<Option<Key>>,
    /// Host nodes whose props or text were updated.
    pub updated: usize,
    /// Subtrees removed.
    pub deleted: usize,
    /// Host nodes hidden or shown.
    pub visibility_toggled: usize,
    /// Nodes that carried any mutation flag.
    pub mutated_nodes: usize,
}

/// Depth-first walk of the finished tree in post-order.
///
/// A node's children are only visited when its subtree flags intersect
/// `mask`. `visit` receives the strict ancestors of the node, outermost first.
pub(crate) fn traverse_effects(
    arena: &mut FiberArena,
    root: NodeId,
    mask: Flags,
    mut visit: impl FnMut(&mut FiberArena, NodeId, &[NodeId]),
) {
    if !arena.contains(root) {
        tracing::warn!(?root, "effect traversal from a reclaimed node skipped");
        return;
    }
    let mut ancestors: Vec<NodeId> = Vec::new();
    let mut next = Some(root);

    'descend: while let Some(id) = next {
        let node = &arena[id];
        if node.subtree_flags.intersects(mask) {
            if let Some(child) = live_link(arena, node.child) {
                ancestors.push(id);
                next = Some(child);
                continue;
            }
        }

        let mut cursor = id;
        loop {
            let sibling = live_link(arena, arena[cursor].sibling);
            visit(arena, cursor, &ancestors);
            if cursor == root {
                break 'descend;
            }
            if let Some(sibling) = sibling {
                next = Some(sibling);
                continue 'descend;
            }
            match ancestors.pop() {
                Some(parent) => cursor = parent,
                None => break 'descend,
            }
        }
    }
}

/// `link` if it still names a live node. A stale link ends that branch.
fn live_link(arena: &FiberArena, link: Option<NodeId>) -> Option<NodeId> {
    let id = link?;
    if arena.contains(id) {
        return Some(id);
    }
    tracing::warn!(?id, "effect traversal skipped a reclaimed node");
    None
}

/// Commit `root.finished_work`.
pub(crate) fn commit_root(cx: &mut WorkCx<'_>) {
    let Some(finished) = cx.root.finished_work.take() else {
        return;
    };
    if !cx.arena.contains(finished) {
        tracing::warn!(?finished, "finished tree was reclaimed before commit");
        cx.session.reset();
        ensure_root_scheduled(cx);
        return;
    }
    let lane = std::mem::replace(&mut cx.root.finished_lane, NO_LANE);
    cx.root.callback_node = None;
    cx.root.callback_priority = NO_LANE;

    let remaining = merge_lanes(cx.arena[finished].lanes, cx.arena[finished].child_lanes);
    let remaining = merge_lanes(remaining, cx.session.interleaved_lanes);
    mark_root_finished(&mut cx.root.lanes, remaining);
    if cx.session.showed_fallback && include_some_lanes(remaining, lane) {
        // The hidden subtree still needs this lane; wait for its ping.
        mark_root_suspended(&mut cx.root.lanes, lane);
    }

    let mut summary = CommitSummary { lane, ..CommitSummary::default() };
    let has_effects = {
        let node = &cx.arena[finished];
        (node.flags | node.subtree_flags).intersects(MUTATION_MASK | PASSIVE_MASK)
    };
    if has_effects {
        mutation::commit_mutation_effects(cx, finished, &mut summary);
    }

    cx.root.current = finished;
    commit_layout_effects(cx.arena, finished);

    if !cx.root.pending_passive.is_empty() {
        passive::schedule_passive_flush(cx);
    }

    let freed = cx.arena.retain_reachable(finished);
    tracing::debug!(
        ?lane,
        mutated = summary.mutated_nodes,
        inserted = summary.inserted.len(),
        moved = summary.moved.len(),
        deleted = summary.deleted,
        freed,
        "commit"
    );
    cx.root.last_commit = Some(summary);
    cx.session.reset();
    ensure_root_scheduled(cx);
}

/// Attach reference bindings flagged during render.
fn commit_layout_effects(arena: &mut FiberArena, root: NodeId) {
    traverse_effects(arena, root, LAYOUT_MASK, |arena, id, _| {
        let node = &mut arena[id];
        if !node.flags.contains(Flags::REF) {
            return;
        }
        node.flags.remove(Flags::REF);
        if node.tag != WorkTag::HostComponent {
            return;
        }
        if let (Some(node_ref), Some(handle)) = (node.node_ref.clone(), node.state_node) {
            node_ref.attach(handle);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::{FiberNode, FiberProps};

    fn node(arena: &mut FiberArena, flags: Flags) -> NodeId {
        let mut fiber = FiberNode::new(WorkTag::Fragment, FiberProps::Empty, None);
        fiber.flags = flags;
        arena.insert(fiber)
    }

    #[test]
    fn test_traversal_skips_clean_subtrees_and_visits_post_order() {
        let mut arena = FiberArena::new();
        let root = node(&mut arena, Flags::empty());
        let a = node(&mut arena, Flags::UPDATE);
        let a1 = node(&mut arena, Flags::PLACEMENT);
        let b = node(&mut arena, Flags::empty());
        let b1 = node(&mut arena, Flags::UPDATE);
        arena[root].child = Some(a);
        arena[a].sibling = Some(b);
        arena[a].child = Some(a1);
        arena[b].child = Some(b1);
        arena[a].subtree_flags = Flags::PLACEMENT;
        arena[root].subtree_flags = Flags::UPDATE | Flags::PLACEMENT;

        let mut order = Vec::new();
        traverse_effects(&mut arena, root, MUTATION_MASK, |_, id, ancestors| {
            order.push((id, ancestors.len()));
        });
        // b's subtree flags are clean, so b1 is never visited.
        assert_eq!(order, vec![(a1, 2), (a, 1), (b, 1), (root, 0)]);
    }

    #[test]
    fn test_traversal_skips_reclaimed_nodes() {
        let mut arena = FiberArena::new();
        let root = node(&mut arena, Flags::empty());
        let a = node(&mut arena, Flags::UPDATE);
        let gone = node(&mut arena, Flags::UPDATE);
        let stale_root = node(&mut arena, Flags::UPDATE);
        arena[root].child = Some(a);
        arena[root].subtree_flags = Flags::UPDATE;
        assert_eq!(arena.retain_reachable(root), 2);
        arena[a].sibling = Some(gone);

        let mut order = Vec::new();
        traverse_effects(&mut arena, root, MUTATION_MASK, |_, id, _| order.push(id));
        assert_eq!(order, vec![a, root]);

        let mut visited = 0;
        traverse_effects(&mut arena, stale_root, MUTATION_MASK, |_, _, _| visited += 1);
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_traversal_of_leaf_root() {
        let mut arena = FiberArena::new();
        let root = node(&mut arena, Flags::REF);
        let mut visited = 0;
        traverse_effects(&mut arena, root, LAYOUT_MASK, |_, _, _| visited += 1);
        assert_eq!(visited, 1);
    }
}
