//! MemoryHost - In-memory host tree with an operation log.
//!
//! Nodes live in a `HashMap` keyed by handle. Microtasks queue up until
//! [`MemoryHost::run_microtasks`] drains them, which keeps tests in control
//! of when synchronous-lane work flushes.
//!
//! # Example
//!
//! ```ignore
//! let host = Rc::new(MemoryHost::new());
//! let container = host.create_container();
//! // ... render into a root bound to `container` ...
//! host.run_microtasks();
//! assert_eq!(host.to_markup(container), "<div>hello</div>");
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write as _;

use super::HostConfig;
use crate::types::{HostHandle, PropValue, Props};

// =============================================================================
// Nodes and Operations
// =============================================================================

#[derive(Debug, Clone)]
enum Content {
    Element { tag: String, attrs: BTreeMap<String, String> },
    Text(String),
}

#[derive(Debug, Clone)]
struct HostNode {
    content: Content,
    children: Vec<HostHandle>,
    parent: Option<HostHandle>,
    visible: bool,
}

/// One recorded host mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    CreateElement(HostHandle, String),
    CreateText(HostHandle, String),
    Append { parent: HostHandle, child: HostHandle },
    InsertBefore { parent: HostHandle, child: HostHandle, before: HostHandle },
    Remove { parent: HostHandle, child: HostHandle },
    Update(HostHandle),
    UpdateText(HostHandle, String),
    SetVisible(HostHandle, bool),
}

fn attr_string(value: &PropValue) -> Option<String> {
    match value {
        PropValue::Null => Some(String::new()),
        PropValue::Bool(b) => Some(b.to_string()),
        PropValue::Int(i) => Some(i.to_string()),
        PropValue::Float(f) => Some(f.to_string()),
        PropValue::Str(s) => Some(s.to_string()),
        PropValue::Node(_) | PropValue::Callback(_) | PropValue::Any(_) => None,
    }
}

fn attrs_of(props: &Props) -> BTreeMap<String, String> {
    props
        .attrs
        .iter()
        .filter_map(|(name, value)| attr_string(value).map(|v| (name.to_string(), v)))
        .collect()
}

// =============================================================================
// MemoryHost
// =============================================================================

/// Host tree held entirely in memory.
#[derive(Default)]
pub struct MemoryHost {
    nodes: RefCell<HashMap<HostHandle, HostNode>>,
    next_handle: Cell<u64>,
    ops: RefCell<Vec<HostOp>>,
    microtasks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self, content: Content) -> HostHandle {
        let handle = HostHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        self.nodes.borrow_mut().insert(
            handle,
            HostNode { content, children: Vec::new(), parent: None, visible: true },
        );
        handle
    }

    fn detach(nodes: &mut HashMap<HostHandle, HostNode>, child: HostHandle) {
        let parent = nodes.get(&child).and_then(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(p) = nodes.get_mut(&parent) {
                p.children.retain(|c| *c != child);
            }
        }
        if let Some(node) = nodes.get_mut(&child) {
            node.parent = None;
        }
    }

    /// Create a root container element.
    pub fn create_container(&self) -> HostHandle {
        self.allocate(Content::Element { tag: "#root".into(), attrs: BTreeMap::new() })
    }

    /// Run queued microtasks, including ones queued while running. Returns how many ran.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.microtasks.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Number of queued microtasks.
    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.borrow().len()
    }

    /// Drain the operation log.
    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut *self.ops.borrow_mut())
    }

    /// Children of `handle`, in order.
    pub fn children(&self, handle: HostHandle) -> Vec<HostHandle> {
        self.nodes.borrow().get(&handle).map(|n| n.children.clone()).unwrap_or_default()
    }

    pub fn parent(&self, handle: HostHandle) -> Option<HostHandle> {
        self.nodes.borrow().get(&handle).and_then(|n| n.parent)
    }

    pub fn is_visible(&self, handle: HostHandle) -> bool {
        self.nodes.borrow().get(&handle).is_some_and(|n| n.visible)
    }

    pub fn tag(&self, handle: HostHandle) -> Option<String> {
        match self.nodes.borrow().get(&handle).map(|n| &n.content) {
            Some(Content::Element { tag, .. }) => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn text(&self, handle: HostHandle) -> Option<String> {
        match self.nodes.borrow().get(&handle).map(|n| &n.content) {
            Some(Content::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn attr(&self, handle: HostHandle, name: &str) -> Option<String> {
        match self.nodes.borrow().get(&handle).map(|n| &n.content) {
            Some(Content::Element { attrs, .. }) => attrs.get(name).cloned(),
            _ => None,
        }
    }

    /// Markup of the visible children of `container`. Hidden subtrees are skipped.
    pub fn to_markup(&self, container: HostHandle) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        if let Some(node) = nodes.get(&container) {
            for child in &node.children {
                Self::write_markup(&nodes, *child, &mut out);
            }
        }
        out
    }

    fn write_markup(nodes: &HashMap<HostHandle, HostNode>, handle: HostHandle, out: &mut String) {
        let Some(node) = nodes.get(&handle) else {
            return;
        };
        if !node.visible {
            return;
        }
        match &node.content {
            Content::Text(text) => out.push_str(text),
            Content::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    let _ = write!(out, " {name}=\"{value}\"");
                }
                out.push('>');
                for child in &node.children {
                    Self::write_markup(nodes, *child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

impl HostConfig for MemoryHost {
    fn create_instance(&self, tag: &str, props: &Props) -> HostHandle {
        let handle = self.allocate(Content::Element { tag: tag.to_string(), attrs: attrs_of(props) });
        self.ops.borrow_mut().push(HostOp::CreateElement(handle, tag.to_string()));
        handle
    }

    fn create_text_instance(&self, text: &str) -> HostHandle {
        let handle = self.allocate(Content::Text(text.to_string()));
        self.ops.borrow_mut().push(HostOp::CreateText(handle, text.to_string()));
        handle
    }

    fn append_child(&self, parent: HostHandle, child: HostHandle) {
        let mut nodes = self.nodes.borrow_mut();
        Self::detach(&mut nodes, child);
        if let Some(p) = nodes.get_mut(&parent) {
            p.children.push(child);
        }
        if let Some(c) = nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
        self.ops.borrow_mut().push(HostOp::Append { parent, child });
    }

    fn insert_before(&self, parent: HostHandle, child: HostHandle, before: HostHandle) {
        let mut nodes = self.nodes.borrow_mut();
        Self::detach(&mut nodes, child);
        if let Some(p) = nodes.get_mut(&parent) {
            match p.children.iter().position(|c| *c == before) {
                Some(index) => p.children.insert(index, child),
                None => p.children.push(child),
            }
        }
        if let Some(c) = nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
        self.ops.borrow_mut().push(HostOp::InsertBefore { parent, child, before });
    }

    fn remove_child(&self, parent: HostHandle, child: HostHandle) {
        let mut nodes = self.nodes.borrow_mut();
        if nodes.get(&child).and_then(|n| n.parent) == Some(parent) {
            Self::detach(&mut nodes, child);
        } else {
            tracing::warn!(?parent, ?child, "remove_child: not a child of this parent");
        }
        self.ops.borrow_mut().push(HostOp::Remove { parent, child });
    }

    fn commit_update(&self, handle: HostHandle, _old_props: &Props, new_props: &Props) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(&handle) {
            if let Content::Element { attrs, .. } = &mut node.content {
                *attrs = attrs_of(new_props);
            }
        }
        self.ops.borrow_mut().push(HostOp::Update(handle));
    }

    fn commit_text_update(&self, handle: HostHandle, text: &str) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(&handle) {
            node.content = Content::Text(text.to_string());
        }
        self.ops.borrow_mut().push(HostOp::UpdateText(handle, text.to_string()));
    }

    fn set_visible(&self, handle: HostHandle, visible: bool) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(&handle) {
            node.visible = visible;
        }
        self.ops.borrow_mut().push(HostOp::SetVisible(handle, visible));
    }

    fn schedule_microtask(&self, task: Box<dyn FnOnce()>) {
        self.microtasks.borrow_mut().push_back(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropsData;
    use std::rc::Rc;

    fn props(id: &str) -> Props {
        let mut data = PropsData::default();
        data.attrs.insert("id".into(), PropValue::from(id));
        Rc::new(data)
    }

    #[test]
    fn test_append_insert_remove() {
        let host = MemoryHost::new();
        let root = host.create_container();
        let a = host.create_text_instance("a");
        let b = host.create_text_instance("b");
        let c = host.create_text_instance("c");
        host.append_child(root, a);
        host.append_child(root, c);
        host.insert_before(root, b, c);
        assert_eq!(host.to_markup(root), "abc");

        host.remove_child(root, b);
        assert_eq!(host.to_markup(root), "ac");
        assert_eq!(host.parent(b), None);
    }

    #[test]
    fn test_append_moves_attached_child() {
        let host = MemoryHost::new();
        let root = host.create_container();
        let a = host.create_text_instance("a");
        let b = host.create_text_instance("b");
        host.append_child(root, a);
        host.append_child(root, b);
        host.append_child(root, a);
        assert_eq!(host.to_markup(root), "ba");
    }

    #[test]
    fn test_markup_skips_hidden() {
        let host = MemoryHost::new();
        let root = host.create_container();
        let div = host.create_instance("div", &props("x"));
        let text = host.create_text_instance("hi");
        host.append_child(div, text);
        host.append_child(root, div);
        assert_eq!(host.to_markup(root), "<div id=\"x\">hi</div>");

        host.set_visible(div, false);
        assert_eq!(host.to_markup(root), "");
        assert!(!host.is_visible(div));
    }

    #[test]
    fn test_microtasks_run_in_order() {
        let host = MemoryHost::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            host.schedule_microtask(Box::new(move || log.borrow_mut().push(i)));
        }
        assert_eq!(host.run_microtasks(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }
}
