//! Child reconciliation: diff a node's committed children against new intent.
//!
//! Handles the three shapes an intent can take:
//! - a single element (matched by key, then by type)
//! - a single text leaf
//! - a list, using the keyed map plus `last_placed_index` algorithm: nodes
//!   whose old index falls behind the last placed one are moves, new nodes
//!   are insertions, unmatched old nodes are deletions
//!
//! On mount (`track == false`) no placement or deletion is recorded; the
//! parent's own placement inserts the whole subtree.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::fiber::{
    create_fiber_from_element, create_fiber_from_fragment, create_fiber_from_text, create_work_in_progress, FiberArena,
    FiberProps, Flags, NodeId, WorkTag,
};
use crate::lanes::Lanes;
use crate::types::{Element, ElementType, Key, Node};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MapKey {
    Key(Key),
    Index(usize),
}

struct ChildReconciler<'a> {
    arena: &'a mut FiberArena,
    parent: NodeId,
    lanes: Lanes,
    track: bool,
}

/// Reconcile the children of `parent` (whose committed first child is
/// `current_first`) against `new_child`, returning the new first child.
///
/// The result is also stored as `parent.child`.
pub(crate) fn reconcile_child_fibers(
    arena: &mut FiberArena,
    parent: NodeId,
    current_first: Option<NodeId>,
    new_child: &Node,
    lanes: Lanes,
    track: bool,
) -> Option<NodeId> {
    let mut reconciler = ChildReconciler { arena, parent, lanes, track };
    let first = reconciler.reconcile(current_first, new_child);
    reconciler.arena[parent].child = first;
    first
}

/// Mark every child from `first` on for deletion.
pub(crate) fn delete_remaining_children(arena: &mut FiberArena, parent: NodeId, first: Option<NodeId>) {
    let mut reconciler = ChildReconciler { arena, parent, lanes: Lanes::empty(), track: true };
    reconciler.delete_remaining(first);
}

fn is_unkeyed_fragment(element: &Element) -> bool {
    element.key.is_none() && element.ty == ElementType::Fragment
}

fn element_props(element: &Element) -> FiberProps {
    match element.ty {
        ElementType::Fragment => FiberProps::Children(element.props.children.clone()),
        _ => FiberProps::Element(element.props.clone()),
    }
}

impl ChildReconciler<'_> {
    fn reconcile(&mut self, current_first: Option<NodeId>, new_child: &Node) -> Option<NodeId> {
        let new_child = match new_child {
            Node::Element(element) if is_unkeyed_fragment(element) => &element.props.children,
            other => other,
        };
        match new_child {
            Node::Element(element) => {
                let fiber = self.reconcile_single_element(current_first, element);
                Some(self.place_single_child(fiber))
            }
            Node::Text(text) => {
                let fiber = self.reconcile_single_text(current_first, text.clone());
                Some(self.place_single_child(fiber))
            }
            Node::List(children) => self.reconcile_children_array(current_first, children),
            Node::Empty => {
                self.delete_remaining(current_first);
                None
            }
        }
    }

    // -------------------------------------------------------------------------
    // Deletion and placement
    // -------------------------------------------------------------------------

    fn delete_child(&mut self, child: NodeId) {
        if !self.track {
            return;
        }
        let parent = &mut self.arena[self.parent];
        parent.deletions.push(child);
        parent.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining(&mut self, first: Option<NodeId>) {
        if !self.track {
            return;
        }
        let mut child = first;
        while let Some(id) = child {
            self.delete_child(id);
            child = self.arena[id].sibling;
        }
    }

    fn place_single_child(&mut self, fiber: NodeId) -> NodeId {
        if self.track && self.arena[fiber].alternate.is_none() {
            self.arena[fiber].flags |= Flags::PLACEMENT;
        }
        fiber
    }

    /// Work-in-progress twin of `current` as an only child.
    fn use_fiber(&mut self, current: NodeId, props: FiberProps) -> NodeId {
        let clone = create_work_in_progress(self.arena, current, props);
        let node = &mut self.arena[clone];
        node.index = 0;
        node.sibling = None;
        node.parent = Some(self.parent);
        clone
    }

    fn create(&mut self, mut fiber: crate::fiber::FiberNode) -> NodeId {
        fiber.parent = Some(self.parent);
        self.arena.insert(fiber)
    }

    fn reuse_element(&mut self, current: NodeId, element: &Element) -> NodeId {
        let reused = self.use_fiber(current, element_props(element));
        self.arena[reused].node_ref = element.node_ref.clone();
        reused
    }

    // -------------------------------------------------------------------------
    // Single child
    // -------------------------------------------------------------------------

    fn reconcile_single_element(&mut self, current_first: Option<NodeId>, element: &Element) -> NodeId {
        let mut current = current_first;
        while let Some(id) = current {
            let sibling = self.arena[id].sibling;
            if self.arena[id].key != element.key {
                self.delete_child(id);
                current = sibling;
                continue;
            }
            if self.arena[id].element_type.as_ref() == Some(&element.ty) {
                let reused = self.reuse_element(id, element);
                self.delete_remaining(sibling);
                return reused;
            }
            // Same key, different type: nothing after it can match either.
            self.delete_remaining(Some(id));
            break;
        }
        let fiber = create_fiber_from_element(element, self.lanes);
        self.create(fiber)
    }

    fn reconcile_single_text(&mut self, current_first: Option<NodeId>, text: Rc<str>) -> NodeId {
        if let Some(id) = current_first.filter(|id| self.arena[*id].tag == WorkTag::HostText) {
            let sibling = self.arena[id].sibling;
            let reused = self.use_fiber(id, FiberProps::Text(text));
            self.delete_remaining(sibling);
            return reused;
        }
        self.delete_remaining(current_first);
        let fiber = create_fiber_from_text(text, self.lanes);
        self.create(fiber)
    }

    // -------------------------------------------------------------------------
    // Lists
    // -------------------------------------------------------------------------

    fn reconcile_children_array(&mut self, current_first: Option<NodeId>, children: &[Node]) -> Option<NodeId> {
        let mut existing: HashMap<MapKey, NodeId> = HashMap::new();
        let mut old_order = Vec::new();
        let mut cursor = current_first;
        while let Some(id) = cursor {
            let node = &self.arena[id];
            let key = match &node.key {
                Some(key) => MapKey::Key(key.clone()),
                None => MapKey::Index(node.index),
            };
            existing.insert(key, id);
            old_order.push(id);
            cursor = node.sibling;
        }

        let mut seen_keys: HashSet<Key> = HashSet::new();
        let mut claimed: HashSet<NodeId> = HashSet::with_capacity(old_order.len());
        let mut last_placed_index = 0;
        let mut first_new: Option<NodeId> = None;
        let mut last_new: Option<NodeId> = None;

        for (index, child) in children.iter().enumerate() {
            if let Node::Element(Element { key: Some(key), .. }) = child {
                if !seen_keys.insert(key.clone()) {
                    tracing::warn!(%key, "duplicate key among siblings; later ones are remounted");
                }
            }
            let Some(new) = self.update_from_map(&mut existing, index, child) else {
                continue;
            };
            if let Some(current) = self.arena[new].alternate {
                claimed.insert(current);
            }
            let node = &mut self.arena[new];
            node.index = index;
            node.parent = Some(self.parent);
            node.sibling = None;

            match last_new {
                Some(prev) => self.arena[prev].sibling = Some(new),
                None => first_new = Some(new),
            }
            last_new = Some(new);

            if !self.track {
                continue;
            }
            match self.arena[new].alternate {
                Some(current) => {
                    let old_index = self.arena[current].index;
                    if old_index < last_placed_index {
                        self.arena[new].flags |= Flags::PLACEMENT;
                    } else {
                        last_placed_index = old_index;
                    }
                }
                None => self.arena[new].flags |= Flags::PLACEMENT,
            }
        }

        // Old siblings sharing a key shadow each other in the map, so walk the
        // old order rather than what is left in it.
        for id in old_order.into_iter().filter(|id| !claimed.contains(id)) {
            self.delete_child(id);
        }
        first_new
    }

    /// Reuse the old child stored under the same key (or index) when its type
    /// matches, otherwise create a new node.
    fn update_from_map(&mut self, existing: &mut HashMap<MapKey, NodeId>, index: usize, child: &Node) -> Option<NodeId> {
        match child {
            Node::Empty => None,
            Node::Text(text) => {
                let key = MapKey::Index(index);
                match existing.get(&key).copied() {
                    Some(before) if self.arena[before].tag == WorkTag::HostText => {
                        existing.remove(&key);
                        Some(create_work_in_progress(self.arena, before, FiberProps::Text(text.clone())))
                    }
                    _ => {
                        let fiber = create_fiber_from_text(text.clone(), self.lanes);
                        Some(self.create(fiber))
                    }
                }
            }
            Node::Element(element) => {
                let key = match &element.key {
                    Some(key) => MapKey::Key(key.clone()),
                    None => MapKey::Index(index),
                };
                match existing.get(&key).copied() {
                    Some(before) if self.arena[before].element_type.as_ref() == Some(&element.ty) => {
                        existing.remove(&key);
                        let reused = create_work_in_progress(self.arena, before, element_props(element));
                        self.arena[reused].node_ref = element.node_ref.clone();
                        Some(reused)
                    }
                    _ => {
                        let fiber = create_fiber_from_element(element, self.lanes);
                        Some(self.create(fiber))
                    }
                }
            }
            Node::List(_) => {
                let key = MapKey::Index(index);
                match existing.get(&key).copied() {
                    Some(before)
                        if self.arena[before].tag == WorkTag::Fragment && self.arena[before].key.is_none() =>
                    {
                        existing.remove(&key);
                        Some(create_work_in_progress(self.arena, before, FiberProps::Children(child.clone())))
                    }
                    _ => {
                        let fiber = create_fiber_from_fragment(child.clone(), None, self.lanes);
                        Some(self.create(fiber))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::create_host_root_fiber;
    use crate::types::{fragment, host, keyed_fragment, text};

    fn keyed(keys: &[&str]) -> Node {
        fragment(keys.iter().map(|k| host("li").key(*k).build()))
    }

    /// Commit a reconciled child list the way the work loop would: the new
    /// nodes become current and every twin is promoted.
    fn commit(arena: &mut FiberArena, parent: NodeId) -> Vec<NodeId> {
        let children = arena.children(parent);
        for id in &children {
            let node = &mut arena[*id];
            node.memoized_props = node.pending_props.clone();
            node.flags = Flags::empty();
        }
        let node = &mut arena[parent];
        node.flags = Flags::empty();
        node.deletions.clear();
        children
    }

    fn keys(arena: &FiberArena, ids: &[NodeId], flag: Flags) -> Vec<String> {
        ids.iter()
            .filter(|id| arena[**id].flags.contains(flag))
            .filter_map(|id| arena[*id].key.as_ref().map(|k| k.to_string()))
            .collect()
    }

    fn setup(initial: &Node) -> (FiberArena, NodeId, NodeId) {
        let mut arena = FiberArena::new();
        let old_parent = arena.insert(create_host_root_fiber());
        reconcile_child_fibers(&mut arena, old_parent, None, initial, Lanes::empty(), false);
        commit(&mut arena, old_parent);
        let new_parent = create_work_in_progress(&mut arena, old_parent, FiberProps::Empty);
        (arena, old_parent, new_parent)
    }

    #[test]
    fn test_mount_records_no_placements() {
        let mut arena = FiberArena::new();
        let parent = arena.insert(create_host_root_fiber());
        let first = reconcile_child_fibers(&mut arena, parent, None, &keyed(&["a", "b"]), Lanes::empty(), false);
        assert!(first.is_some());
        let children = arena.children(parent);
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|id| arena[*id].flags.is_empty()));
        assert_eq!(arena[children[1]].index, 1);
    }

    #[test]
    fn test_rotation_moves_only_displaced_nodes() {
        let (mut arena, old_parent, parent) = setup(&keyed(&["a", "b", "c"]));
        let current_first = arena[old_parent].child;
        reconcile_child_fibers(&mut arena, parent, current_first, &keyed(&["c", "a", "b"]), Lanes::empty(), true);
        let children = arena.children(parent);
        assert_eq!(keys(&arena, &children, Flags::PLACEMENT), vec!["a", "b"]);
        assert!(arena[parent].deletions.is_empty());
        assert!(children.iter().all(|id| arena[*id].alternate.is_some()));
    }

    #[test]
    fn test_insert_and_delete() {
        let (mut arena, old_parent, parent) = setup(&keyed(&["a", "b", "c"]));
        let current_first = arena[old_parent].child;
        reconcile_child_fibers(&mut arena, parent, current_first, &keyed(&["a", "g", "c"]), Lanes::empty(), true);
        let children = arena.children(parent);
        assert_eq!(keys(&arena, &children, Flags::PLACEMENT), vec!["g"]);
        assert_eq!(arena[parent].deletions.len(), 1);
        let deleted = arena[parent].deletions[0];
        assert_eq!(arena[deleted].key.as_ref().map(Key::as_str), Some("b"));
        assert!(arena[parent].flags.contains(Flags::CHILD_DELETION));
    }

    #[test]
    fn test_shadowed_duplicate_keys_are_deleted() {
        let (mut arena, old_parent, parent) = setup(&keyed(&["a", "a"]));
        let current_first = arena[old_parent].child;
        reconcile_child_fibers(&mut arena, parent, current_first, &keyed(&["b", "c"]), Lanes::empty(), true);
        assert_eq!(arena[parent].deletions.len(), 2);
        assert_eq!(keys(&arena, &arena.children(parent), Flags::PLACEMENT), vec!["b", "c"]);
    }

    #[test]
    fn test_type_change_with_same_key_replaces() {
        let (mut arena, old_parent, parent) = setup(&host("div").key("x").build());
        let current_first = arena[old_parent].child;
        let first =
            reconcile_child_fibers(&mut arena, parent, current_first, &host("span").key("x").build(), Lanes::empty(), true);
        let first = first.expect("new child");
        assert!(arena[first].alternate.is_none());
        assert!(arena[first].flags.contains(Flags::PLACEMENT));
        assert_eq!(arena[parent].deletions.len(), 1);
    }

    #[test]
    fn test_text_reuses_text_node() {
        let (mut arena, old_parent, parent) = setup(&text("a"));
        let current_first = arena[old_parent].child;
        let first = reconcile_child_fibers(&mut arena, parent, current_first, &text("b"), Lanes::empty(), true);
        let first = first.expect("text child");
        assert_eq!(arena[first].alternate, current_first);
        assert!(arena[first].flags.is_empty());
    }

    #[test]
    fn test_unkeyed_fragment_is_unwrapped_and_nested_lists_become_fragments() {
        let mut arena = FiberArena::new();
        let parent = arena.insert(create_host_root_fiber());
        let nested = fragment([text("x"), fragment([text("y"), text("z")])]);
        reconcile_child_fibers(&mut arena, parent, None, &nested, Lanes::empty(), false);
        let children = arena.children(parent);
        assert_eq!(children.len(), 2);
        assert_eq!(arena[children[1]].tag, WorkTag::Fragment);

        let keyed_frag = keyed_fragment("k", [text("q")]);
        let mut arena = FiberArena::new();
        let parent = arena.insert(create_host_root_fiber());
        let first = reconcile_child_fibers(&mut arena, parent, None, &keyed_frag, Lanes::empty(), false);
        let first = first.expect("fragment child");
        assert_eq!(arena[first].tag, WorkTag::Fragment);
        assert_eq!(arena[first].key.as_ref().map(Key::as_str), Some("k"));
    }

    #[test]
    fn test_empty_deletes_everything() {
        let (mut arena, old_parent, parent) = setup(&keyed(&["a", "b"]));
        let current_first = arena[old_parent].child;
        let first = reconcile_child_fibers(&mut arena, parent, current_first, &Node::Empty, Lanes::empty(), true);
        assert!(first.is_none());
        assert_eq!(arena[parent].deletions.len(), 2);
    }
}
