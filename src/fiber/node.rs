//! FiberNode - One tree position in one buffer.

use std::rc::Rc;

use super::flags::Flags;
use super::NodeId;
use crate::context::ContextDependency;
use crate::error::ReconcileError;
use crate::hooks::{Effect, Hook};
use crate::lanes::{Lanes, NO_LANES};
use crate::types::{ElementType, HostHandle, Key, Node, NodeRef, Props};
use crate::update_queue::QueueState;

// =============================================================================
// Work Tags
// =============================================================================

/// Kind of a node. A node and its alternate always share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkTag {
    HostRoot,
    HostComponent,
    HostText,
    FunctionComponent,
    Fragment,
    ContextProvider,
    SuspenseComponent,
    OffscreenComponent,
    LazyComponent,
    MemoComponent,
    ErrorBoundary,
}

impl WorkTag {
    /// Nodes that own a host handle.
    pub fn is_host(self) -> bool {
        matches!(self, WorkTag::HostComponent | WorkTag::HostText)
    }
}

/// Whether an offscreen subtree is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffscreenMode {
    Visible,
    Hidden,
}

// =============================================================================
// Props and State
// =============================================================================

/// Input of a node, pending or memoized.
#[derive(Debug, Clone, Default)]
pub enum FiberProps {
    #[default]
    Empty,
    /// Props of the element the node was created from.
    Element(Props),
    Text(Rc<str>),
    /// Children of a fragment.
    Children(Node),
    Offscreen { mode: OffscreenMode, children: Node },
}

impl FiberProps {
    /// Reference identity, the cheap half of the bailout test.
    pub fn same(&self, other: &FiberProps) -> bool {
        match (self, other) {
            (FiberProps::Empty, FiberProps::Empty) => true,
            (FiberProps::Element(a), FiberProps::Element(b)) => Rc::ptr_eq(a, b),
            (FiberProps::Text(a), FiberProps::Text(b)) => a == b,
            (FiberProps::Children(a), FiberProps::Children(b)) => a.same(b),
            (
                FiberProps::Offscreen { mode: ma, children: ca },
                FiberProps::Offscreen { mode: mb, children: cb },
            ) => ma == mb && ca.same(cb),
            _ => false,
        }
    }

    /// Children these props describe.
    pub fn children(&self) -> Node {
        match self {
            FiberProps::Element(props) => props.children.clone(),
            FiberProps::Children(children) | FiberProps::Offscreen { children, .. } => children.clone(),
            FiberProps::Empty | FiberProps::Text(_) => Node::Empty,
        }
    }

    pub fn element(&self) -> Option<&Props> {
        match self {
            FiberProps::Element(props) => Some(props),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&Rc<str>> {
        match self {
            FiberProps::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn offscreen_mode(&self) -> Option<OffscreenMode> {
        match self {
            FiberProps::Offscreen { mode, .. } => Some(*mode),
            _ => None,
        }
    }
}

/// State memoized on a node between renders.
#[derive(Clone, Default)]
pub enum FiberState {
    #[default]
    None,
    /// Host root: the queue whose state is the rendered intent tree.
    Root(QueueState<Node, Node>),
    /// Hook list of a component, in call order.
    Hooks(Vec<Hook>),
    /// Suspense boundary currently showing its fallback.
    SuspenseFallback,
    /// Error boundary holding the failure it captured.
    Captured(ReconcileError),
}


impl std::fmt::Debug for FiberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FiberState::None => f.write_str("None"),
            FiberState::Root(queue) => write!(f, "Root({:?})", queue.memoized_state),
            FiberState::Hooks(hooks) => write!(f, "Hooks({})", hooks.len()),
            FiberState::SuspenseFallback => f.write_str("SuspenseFallback"),
            FiberState::Captured(error) => write!(f, "Captured({error})"),
        }
    }
}

// =============================================================================
// FiberNode
// =============================================================================

/// One position of the component tree in one buffer.
#[derive(Clone)]
pub struct FiberNode {
    pub tag: WorkTag,
    pub key: Option<Key>,
    /// Element type the node was created from. `None` for roots, text,
    /// fragments built from lists, and offscreen wrappers.
    pub element_type: Option<ElementType>,
    pub state_node: Option<HostHandle>,

    pub parent: Option<NodeId>,
    pub child: Option<NodeId>,
    pub sibling: Option<NodeId>,
    /// Position among siblings in the last reconcile.
    pub index: usize,

    pub node_ref: Option<NodeRef>,
    pub pending_props: FiberProps,
    pub memoized_props: FiberProps,
    pub memoized_state: FiberState,
    /// Deferred effects produced by the last render of a component.
    pub effects: Vec<Rc<Effect>>,
    /// Contexts read by the last render.
    pub dependencies: Vec<ContextDependency>,

    pub flags: Flags,
    pub subtree_flags: Flags,
    pub deletions: Vec<NodeId>,

    pub lanes: Lanes,
    pub child_lanes: Lanes,

    pub alternate: Option<NodeId>,
}

impl FiberNode {
    pub fn new(tag: WorkTag, pending_props: FiberProps, key: Option<Key>) -> Self {
        Self {
            tag,
            key,
            element_type: None,
            state_node: None,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            node_ref: None,
            pending_props,
            memoized_props: FiberProps::Empty,
            memoized_state: FiberState::None,
            effects: Vec::new(),
            dependencies: Vec::new(),
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: Vec::new(),
            lanes: NO_LANES,
            child_lanes: NO_LANES,
            alternate: None,
        }
    }

    /// Short name used in log events and error messages.
    pub fn display_name(&self) -> String {
        match &self.element_type {
            Some(ElementType::Host(tag)) => tag.to_string(),
            Some(ElementType::Component(c)) => c.name().to_string(),
            Some(ElementType::Memo(m)) => format!("Memo({})", m.inner().name()),
            Some(ElementType::Provider(ctx)) => format!("{}.Provider", ctx.name()),
            _ => format!("{:?}", self.tag),
        }
    }
}

impl std::fmt::Debug for FiberNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberNode")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("flags", &self.flags)
            .field("lanes", &self.lanes)
            .field("child_lanes", &self.child_lanes)
            .finish_non_exhaustive()
    }
}
