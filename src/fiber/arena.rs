//! FiberArena - Generational storage for both node buffers.
//!
//! Every node of both buffers lives in one `SlotMap`. Links between nodes are
//! `NodeId`s, so the cyclic parent/child/sibling/alternate graph has no
//! ownership cycles. A stale id (its node reclaimed) simply fails lookup.

use std::collections::HashSet;
use std::ops::{Index, IndexMut};

use slotmap::SlotMap;

use super::node::FiberNode;

slotmap::new_key_type! {
    /// Stable handle of a node in the arena.
    pub struct NodeId;
}

#[derive(Default)]
pub struct FiberArena {
    nodes: SlotMap<NodeId, FiberNode>,
}

impl FiberArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: FiberNode) -> NodeId {
        self.nodes.insert(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&FiberNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut FiberNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Direct children of `id`, in sibling order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut next = self.get(id).and_then(|n| n.child);
        while let Some(child) = next {
            out.push(child);
            next = self.get(child).and_then(|n| n.sibling);
        }
        out
    }

    /// Reclaim every node that is neither in the tree rooted at `root` nor the
    /// alternate of such a node. Returns how many nodes were freed.
    ///
    /// Alternates are kept but not traversed: their child links may point at
    /// freed slots, which `create_work_in_progress` overwrites before use.
    pub fn retain_reachable(&mut self, root: NodeId) -> usize {
        let mut keep = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if !keep.insert(id) {
                continue;
            }
            if let Some(alternate) = node.alternate {
                keep.insert(alternate);
            }
            if let Some(child) = node.child {
                stack.push(child);
            }
            if id != root {
                if let Some(sibling) = node.sibling {
                    stack.push(sibling);
                }
            }
        }

        let before = self.nodes.len();
        self.nodes.retain(|id, _| keep.contains(&id));
        before - self.nodes.len()
    }
}

impl Index<NodeId> for FiberArena {
    type Output = FiberNode;

    fn index(&self, id: NodeId) -> &FiberNode {
        &self.nodes[id]
    }
}

impl IndexMut<NodeId> for FiberArena {
    fn index_mut(&mut self, id: NodeId) -> &mut FiberNode {
        &mut self.nodes[id]
    }
}
