//! Mutation pass: everything that touches the host tree.

use super::{traverse_effects, CommitSummary};
use crate::error::ReconcileError;
use crate::fiber::{FiberArena, Flags, NodeId, OffscreenMode, PendingPassiveEffects, WorkTag, MUTATION_MASK, PASSIVE_MASK};
use crate::host::HostConfig;
use crate::types::HostHandle;
use crate::work_loop::WorkCx;

struct MutationCx<'a> {
    host: &'a dyn HostConfig,
    container: HostHandle,
    passive: &'a mut PendingPassiveEffects,
    errors: &'a mut Vec<ReconcileError>,
    summary: &'a mut CommitSummary,
}

pub(super) fn commit_mutation_effects(cx: &mut WorkCx<'_>, finished: NodeId, summary: &mut CommitSummary) {
    let mut m = MutationCx {
        host: &*cx.shared.host,
        container: cx.root.container,
        passive: &mut cx.root.pending_passive,
        errors: &mut cx.root.errors,
        summary,
    };
    traverse_effects(cx.arena, finished, MUTATION_MASK | PASSIVE_MASK, |arena, id, ancestors| {
        commit_mutation_on_fiber(&mut m, arena, id, ancestors);
    });
}

fn commit_mutation_on_fiber(m: &mut MutationCx<'_>, arena: &mut FiberArena, id: NodeId, ancestors: &[NodeId]) {
    let flags = arena[id].flags;
    let tag = arena[id].tag;
    if flags.intersects(MUTATION_MASK) {
        m.summary.mutated_nodes += 1;
    }

    if flags.contains(Flags::PLACEMENT) {
        commit_placement(m, arena, id, ancestors);
    }

    if flags.contains(Flags::UPDATE) {
        commit_update(m, arena, id);
    }

    if flags.contains(Flags::CHILD_DELETION) {
        let deletions = std::mem::take(&mut arena[id].deletions);
        let parent = match tag {
            WorkTag::HostComponent => arena[id].state_node,
            WorkTag::HostRoot => Some(m.container),
            _ => host_parent(arena, ancestors, m.container),
        };
        for deleted in deletions {
            commit_deletion(m, arena, parent, deleted);
        }
    }

    if flags.contains(Flags::PASSIVE) {
        m.passive.update.extend(arena[id].effects.iter().cloned());
    }

    if flags.contains(Flags::REF) && tag == WorkTag::HostComponent {
        let stale = arena[id].alternate.and_then(|alt| arena.get(alt)).and_then(|alt| alt.node_ref.clone());
        if let Some(stale) = stale {
            stale.detach();
        }
    }

    if flags.contains(Flags::VISIBILITY) && tag == WorkTag::OffscreenComponent {
        let hidden = arena[id].memoized_props.offscreen_mode() == Some(OffscreenMode::Hidden);
        hide_or_unhide_children(m, arena, id, hidden);
    }

    arena[id].flags.remove(Flags::PLACEMENT | Flags::UPDATE | Flags::CHILD_DELETION | Flags::PASSIVE | Flags::VISIBILITY);
}

// =============================================================================
// Placement
// =============================================================================

/// Closest host instance among the strict ancestors (the container for the root).
fn host_parent(arena: &FiberArena, ancestors: &[NodeId], container: HostHandle) -> Option<HostHandle> {
    ancestors.iter().rev().find_map(|&id| {
        let node = &arena[id];
        match node.tag {
            WorkTag::HostComponent => node.state_node,
            WorkTag::HostRoot => Some(container),
            _ => None,
        }
    })
}

/// First host handle after `fiber` in document order that is already in place.
///
/// Parent pointers are repaired while descending, since a reused subtree
/// still points at the other buffer.
fn get_host_sibling(arena: &mut FiberArena, fiber: NodeId) -> Option<HostHandle> {
    let mut node = fiber;
    'siblings: loop {
        while arena[node].sibling.is_none() {
            let parent = arena[node].parent?;
            if matches!(arena[parent].tag, WorkTag::HostComponent | WorkTag::HostRoot) {
                return None;
            }
            node = parent;
        }
        let sibling = arena[node].sibling?;
        arena[sibling].parent = arena[node].parent;
        node = sibling;

        while !arena[node].tag.is_host() {
            if arena[node].flags.contains(Flags::PLACEMENT) {
                continue 'siblings;
            }
            match arena[node].child {
                Some(child) => {
                    arena[child].parent = Some(node);
                    node = child;
                }
                None => continue 'siblings,
            }
        }

        if !arena[node].flags.contains(Flags::PLACEMENT) {
            return arena[node].state_node;
        }
    }
}

fn insert_or_append(host: &dyn HostConfig, arena: &FiberArena, id: NodeId, parent: HostHandle, before: Option<HostHandle>) {
    let node = &arena[id];
    if node.tag.is_host() {
        if let Some(handle) = node.state_node {
            match before {
                Some(before) => host.insert_before(parent, handle, before),
                None => host.append_child(parent, handle),
            }
        }
        return;
    }
    let mut child = node.child;
    while let Some(c) = child {
        insert_or_append(host, arena, c, parent, before);
        child = arena[c].sibling;
    }
}

fn commit_placement(m: &mut MutationCx<'_>, arena: &mut FiberArena, id: NodeId, ancestors: &[NodeId]) {
    let key = arena[id].key.clone();
    if arena[id].alternate.is_some() {
        m.summary.moved.push(key);
    } else {
        m.summary.inserted.push(key);
    }

    let Some(parent) = host_parent(arena, ancestors, m.container) else {
        let error = ReconcileError::MissingHostParent(arena[id].display_name());
        tracing::error!(%error, "placement skipped");
        m.errors.push(error);
        return;
    };
    let before = get_host_sibling(arena, id);
    insert_or_append(m.host, arena, id, parent, before);
}

// =============================================================================
// Update
// =============================================================================

fn commit_update(m: &mut MutationCx<'_>, arena: &FiberArena, id: NodeId) {
    let node = &arena[id];
    let Some(handle) = node.state_node else {
        return;
    };
    match node.tag {
        WorkTag::HostText => {
            if let Some(text) = node.memoized_props.text() {
                m.host.commit_text_update(handle, text);
                m.summary.updated += 1;
            }
        }
        WorkTag::HostComponent => {
            let old = node.alternate.and_then(|alt| arena.get(alt)).and_then(|alt| alt.memoized_props.element());
            if let (Some(old), Some(new)) = (old, node.memoized_props.element()) {
                m.host.commit_update(handle, old, new);
                m.summary.updated += 1;
            }
        }
        _ => {}
    }
}

// =============================================================================
// Deletion
// =============================================================================

/// Remove the subtree rooted at `deleted`.
///
/// Only the topmost host nodes are detached from the host tree; every
/// reference below is cleared and every deferred effect is queued for
/// teardown.
fn commit_deletion(m: &mut MutationCx<'_>, arena: &mut FiberArena, parent: Option<HostHandle>, deleted: NodeId) {
    let mut host_roots = Vec::new();
    let mut stack = vec![(deleted, false)];
    while let Some((id, inside_host)) = stack.pop() {
        let node = &arena[id];
        if node.tag == WorkTag::HostComponent {
            if let Some(node_ref) = &node.node_ref {
                node_ref.detach();
            }
        }
        if node.tag.is_host() && !inside_host {
            if let Some(handle) = node.state_node {
                host_roots.push(handle);
            }
        }
        m.passive.unmount.extend(node.effects.iter().cloned());

        let inside = inside_host || node.tag.is_host();
        for child in arena.children(id).into_iter().rev() {
            stack.push((child, inside));
        }
    }

    match parent {
        Some(parent) => {
            for handle in host_roots {
                m.host.remove_child(parent, handle);
            }
        }
        None if !host_roots.is_empty() => {
            let error = ReconcileError::MissingHostParent(arena[deleted].display_name());
            tracing::error!(%error, "deletion left host nodes attached");
            m.errors.push(error);
        }
        None => {}
    }

    let alternate = arena[deleted].alternate;
    for id in std::iter::once(deleted).chain(alternate) {
        if let Some(node) = arena.get_mut(id) {
            node.parent = None;
            node.child = None;
        }
    }
    m.summary.deleted += 1;
}

// =============================================================================
// Visibility
// =============================================================================

/// Hide or show the topmost host nodes under an offscreen node.
///
/// When showing, nested offscreen subtrees that are themselves hidden stay hidden.
fn hide_or_unhide_children(m: &mut MutationCx<'_>, arena: &FiberArena, offscreen: NodeId, hidden: bool) {
    let mut stack: Vec<NodeId> = arena.children(offscreen).into_iter().rev().collect();
    while let Some(id) = stack.pop() {
        let node = &arena[id];
        if node.tag.is_host() {
            if let Some(handle) = node.state_node {
                m.host.set_visible(handle, !hidden);
                m.summary.visibility_toggled += 1;
            }
            continue;
        }
        if !hidden
            && node.tag == WorkTag::OffscreenComponent
            && node.memoized_props.offscreen_mode() == Some(OffscreenMode::Hidden)
        {
            continue;
        }
        stack.extend(arena.children(id).into_iter().rev());
    }
}
