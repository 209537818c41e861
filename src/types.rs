//! Core types for spark-reconciler.
//!
//! These types describe the immutable "intent" tree a caller hands to
//! `Root::render`, and the small value types that flow from it into the node
//! tree and out to the host.
//!
//! - [`Node`] / [`Element`] - intent tree
//! - [`ElementType`] - what an element asks to be (host tag, component, boundary...)
//! - [`PropValue`] / [`PropsData`] - attributes with identity-style equality
//! - [`Component`] / [`MemoComponent`] - render functions
//! - [`NodeRef`] - binding to a realized host handle
//! - [`ElementBuilder`] and helpers ([`host`], [`text`], [`fragment`], ...)

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::context::ContextHandle;
use crate::error::{Outcome, ReconcileError};
use crate::hooks::RenderCx;
use crate::suspense::LazyComponent;

/// Opaque state value stored by hooks, context providers and queues.
pub type Value = Rc<dyn Any>;

// =============================================================================
// Handles and Keys
// =============================================================================

/// Handle to a node realized by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(pub u64);

/// Explicit identity of a child among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Rc<str>);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Self(value.to_string().into())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Prop Values
// =============================================================================

/// One attribute value.
///
/// Equality follows identity semantics: scalars compare by value (floats by
/// bit pattern, with every NaN equal to every NaN), callbacks and opaque
/// values by pointer, nodes with [`Node::same`].
#[derive(Clone)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Node(Node),
    Callback(Rc<dyn Fn()>),
    Any(Value),
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Null, PropValue::Null) => true,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Node(a), PropValue::Node(b)) => a.same(b),
            (PropValue::Callback(a), PropValue::Callback(b)) => Rc::ptr_eq(a, b),
            (PropValue::Any(a), PropValue::Any(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => f.write_str("Null"),
            PropValue::Bool(b) => write!(f, "Bool({b})"),
            PropValue::Int(i) => write!(f, "Int({i})"),
            PropValue::Float(x) => write!(f, "Float({x})"),
            PropValue::Str(s) => write!(f, "Str({s:?})"),
            PropValue::Node(n) => write!(f, "Node({n:?})"),
            PropValue::Callback(_) => f.write_str("Callback(..)"),
            PropValue::Any(_) => f.write_str("Any(..)"),
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(value.into())
    }
}

impl From<usize> for PropValue {
    fn from(value: usize) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.into())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value.into())
    }
}

impl From<Node> for PropValue {
    fn from(value: Node) -> Self {
        PropValue::Node(value)
    }
}

// =============================================================================
// Props
// =============================================================================

/// Attributes and children of one element.
#[derive(Clone, Default)]
pub struct PropsData {
    pub attrs: BTreeMap<Rc<str>, PropValue>,
    pub children: Node,
}

/// Shared, immutable props. Reference equality is `Rc::ptr_eq`.
pub type Props = Rc<PropsData>;

impl PropsData {
    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.attrs.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.attrs.get(name) {
            Some(PropValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.attrs.get(name) {
            Some(PropValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// One-level comparison: same attribute names with equal values, same children.
    pub fn shallow_eq(&self, other: &PropsData) -> bool {
        self.attrs == other.attrs && self.children.same(&other.children)
    }
}

impl fmt::Debug for PropsData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props").field("attrs", &self.attrs).field("children", &self.children).finish()
    }
}

// =============================================================================
// Intent Tree
// =============================================================================

/// A position in the intent tree.
#[derive(Clone, Default)]
pub enum Node {
    #[default]
    Empty,
    Text(Rc<str>),
    Element(Element),
    List(Rc<[Node]>),
}

impl Node {
    /// Identity comparison, the equivalent of comparing two intent objects by reference.
    pub fn same(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Empty, Node::Empty) => true,
            (Node::Text(a), Node::Text(b)) => a == b,
            (Node::Element(a), Node::Element(b)) => a.same(b),
            (Node::List(a), Node::List(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Empty => f.write_str("Empty"),
            Node::Text(text) => write!(f, "Text({text:?})"),
            Node::Element(el) => el.fmt(f),
            Node::List(items) => f.debug_list().entries(items.iter()).finish(),
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Text(value.into())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Text(value.into())
    }
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Node::Element(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Node::List(value.into())
    }
}

/// A request for one node of a given type.
#[derive(Clone)]
pub struct Element {
    pub ty: ElementType,
    pub key: Option<Key>,
    pub props: Props,
    pub node_ref: Option<NodeRef>,
}

impl Element {
    pub fn same(&self, other: &Element) -> bool {
        self.ty == other.ty
            && self.key == other.key
            && Rc::ptr_eq(&self.props, &other.props)
            && NodeRef::same_opt(&self.node_ref, &other.node_ref)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("ty", &self.ty)
            .field("key", &self.key)
            .field("props", &self.props)
            .finish()
    }
}

// =============================================================================
// Element Types
// =============================================================================

/// What an element asks to be.
#[derive(Clone)]
pub enum ElementType {
    /// Host element with a tag name.
    Host(Rc<str>),
    Component(Component),
    Fragment,
    /// Provides a value for one context to its subtree (`value` attribute).
    Provider(ContextHandle),
    /// Shows `fallback` while any descendant is suspended.
    Suspense,
    Memo(MemoComponent),
    Lazy(LazyComponent),
    /// Renders `fallback(error)` once a descendant fails.
    ErrorBoundary,
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ElementType::Host(a), ElementType::Host(b)) => a == b,
            (ElementType::Component(a), ElementType::Component(b)) => a == b,
            (ElementType::Fragment, ElementType::Fragment) => true,
            (ElementType::Provider(a), ElementType::Provider(b)) => a.id() == b.id(),
            (ElementType::Suspense, ElementType::Suspense) => true,
            (ElementType::Memo(a), ElementType::Memo(b)) => a == b,
            (ElementType::Lazy(a), ElementType::Lazy(b)) => a == b,
            (ElementType::ErrorBoundary, ElementType::ErrorBoundary) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Host(tag) => write!(f, "Host({tag})"),
            ElementType::Component(c) => write!(f, "Component({})", c.name()),
            ElementType::Fragment => f.write_str("Fragment"),
            ElementType::Provider(ctx) => write!(f, "Provider({})", ctx.name()),
            ElementType::Suspense => f.write_str("Suspense"),
            ElementType::Memo(m) => write!(f, "Memo({})", m.inner().name()),
            ElementType::Lazy(_) => f.write_str("Lazy"),
            ElementType::ErrorBoundary => f.write_str("ErrorBoundary"),
        }
    }
}

// =============================================================================
// Components
// =============================================================================

type RenderFn = dyn Fn(&mut RenderCx, &Props) -> Outcome<Node>;

struct ComponentDef {
    name: Rc<str>,
    render: Box<RenderFn>,
}

/// A render function with identity. Two components are the same type only if
/// they are clones of one `Component::new` call.
#[derive(Clone)]
pub struct Component(Rc<ComponentDef>);

impl Component {
    pub fn new(name: &str, render: impl Fn(&mut RenderCx, &Props) -> Outcome<Node> + 'static) -> Self {
        Self(Rc::new(ComponentDef { name: name.into(), render: Box::new(render) }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub(crate) fn name_rc(&self) -> Rc<str> {
        self.0.name.clone()
    }

    pub(crate) fn render(&self, cx: &mut RenderCx, props: &Props) -> Outcome<Node> {
        (self.0.render)(cx, props)
    }

    /// Start an element of this component.
    pub fn element(&self) -> ElementBuilder {
        ElementBuilder::new(ElementType::Component(self.clone()))
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

type CompareFn = dyn Fn(&PropsData, &PropsData) -> bool;

struct MemoDef {
    inner: Component,
    compare: Option<Box<CompareFn>>,
}

/// A component that skips re-rendering when its props compare equal.
#[derive(Clone)]
pub struct MemoComponent(Rc<MemoDef>);

impl MemoComponent {
    pub fn inner(&self) -> &Component {
        &self.0.inner
    }

    /// Whether `prev` and `next` count as equal for this memo.
    pub fn props_equal(&self, prev: &PropsData, next: &PropsData) -> bool {
        match &self.0.compare {
            Some(compare) => compare(prev, next),
            None => prev.shallow_eq(next),
        }
    }

    pub fn element(&self) -> ElementBuilder {
        ElementBuilder::new(ElementType::Memo(self.clone()))
    }
}

impl PartialEq for MemoComponent {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Wrap `component` with shallow props comparison.
pub fn memo(component: Component) -> MemoComponent {
    MemoComponent(Rc::new(MemoDef { inner: component, compare: None }))
}

/// Wrap `component` with a custom "props are equal" predicate.
pub fn memo_with(
    component: Component,
    compare: impl Fn(&PropsData, &PropsData) -> bool + 'static,
) -> MemoComponent {
    MemoComponent(Rc::new(MemoDef { inner: component, compare: Some(Box::new(compare)) }))
}

// =============================================================================
// Node References
// =============================================================================

/// Binding that receives the host handle of the element it is attached to.
#[derive(Clone)]
pub enum NodeRef {
    Object(Rc<RefCell<Option<HostHandle>>>),
    Callback(Rc<dyn Fn(Option<HostHandle>)>),
}

impl NodeRef {
    pub fn object() -> Self {
        NodeRef::Object(Rc::new(RefCell::new(None)))
    }

    pub fn callback(f: impl Fn(Option<HostHandle>) + 'static) -> Self {
        NodeRef::Callback(Rc::new(f))
    }

    /// Current handle of an object ref. Callback refs always report `None`.
    pub fn current(&self) -> Option<HostHandle> {
        match self {
            NodeRef::Object(cell) => *cell.borrow(),
            NodeRef::Callback(_) => None,
        }
    }

    pub(crate) fn attach(&self, handle: HostHandle) {
        match self {
            NodeRef::Object(cell) => *cell.borrow_mut() = Some(handle),
            NodeRef::Callback(f) => f(Some(handle)),
        }
    }

    pub(crate) fn detach(&self) {
        match self {
            NodeRef::Object(cell) => *cell.borrow_mut() = None,
            NodeRef::Callback(f) => f(None),
        }
    }

    pub fn same(&self, other: &NodeRef) -> bool {
        match (self, other) {
            (NodeRef::Object(a), NodeRef::Object(b)) => Rc::ptr_eq(a, b),
            (NodeRef::Callback(a), NodeRef::Callback(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn same_opt(a: &Option<NodeRef>, b: &Option<NodeRef>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same(b),
            _ => false,
        }
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Fallback renderer stored on an error boundary element.
#[derive(Clone)]
pub(crate) struct ErrorFallback(pub(crate) Rc<dyn Fn(&ReconcileError) -> Node>);

/// Incrementally assembles an [`Element`].
pub struct ElementBuilder {
    ty: ElementType,
    key: Option<Key>,
    attrs: BTreeMap<Rc<str>, PropValue>,
    children: Vec<Node>,
    node_ref: Option<NodeRef>,
}

impl ElementBuilder {
    pub fn new(ty: ElementType) -> Self {
        Self { ty, key: None, attrs: BTreeMap::new(), children: Vec::new(), node_ref: None }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    pub fn node_ref(mut self, node_ref: NodeRef) -> Self {
        self.node_ref = Some(node_ref);
        self
    }

    pub fn build(self) -> Node {
        Node::Element(self.into_element())
    }

    pub fn into_element(mut self) -> Element {
        let children = match self.children.len() {
            0 => Node::Empty,
            1 => self.children.pop().unwrap_or_default(),
            _ => Node::List(self.children.into()),
        };
        Element {
            ty: self.ty,
            key: self.key,
            props: Rc::new(PropsData { attrs: self.attrs, children }),
            node_ref: self.node_ref,
        }
    }
}

impl From<ElementBuilder> for Node {
    fn from(value: ElementBuilder) -> Self {
        value.build()
    }
}

/// Host element builder.
pub fn host(tag: &str) -> ElementBuilder {
    ElementBuilder::new(ElementType::Host(tag.into()))
}

/// Text node.
pub fn text(content: impl Into<Rc<str>>) -> Node {
    Node::Text(content.into())
}

/// Unkeyed list of children.
pub fn fragment<I, N>(children: I) -> Node
where
    I: IntoIterator<Item = N>,
    N: Into<Node>,
{
    Node::List(children.into_iter().map(Into::into).collect())
}

/// Keyed fragment element.
pub fn keyed_fragment<I, N>(key: impl Into<Key>, children: I) -> Node
where
    I: IntoIterator<Item = N>,
    N: Into<Node>,
{
    ElementBuilder::new(ElementType::Fragment).key(key).children(children).build()
}

/// Suspense boundary builder showing `fallback` while its children are suspended.
pub fn suspense(fallback: impl Into<Node>) -> ElementBuilder {
    ElementBuilder::new(ElementType::Suspense).attr("fallback", PropValue::Node(fallback.into()))
}

/// Error boundary builder rendering `fallback(error)` once a descendant fails.
pub fn error_boundary(fallback: impl Fn(&ReconcileError) -> Node + 'static) -> ElementBuilder {
    let fallback: Value = Rc::new(ErrorFallback(Rc::new(fallback)));
    ElementBuilder::new(ElementType::ErrorBoundary).attr("fallback", PropValue::Any(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_identity_semantics() {
        assert_eq!(PropValue::Float(f64::NAN), PropValue::Float(f64::NAN));
        assert_ne!(PropValue::Float(0.0), PropValue::Float(-0.0));
        assert_eq!(PropValue::Float(1.5), PropValue::Float(1.5));
    }

    #[test]
    fn test_callback_equality_is_by_pointer() {
        let f: Rc<dyn Fn()> = Rc::new(|| {});
        let g: Rc<dyn Fn()> = Rc::new(|| {});
        assert_eq!(PropValue::Callback(f.clone()), PropValue::Callback(f));
        assert_ne!(PropValue::Callback(g.clone()), PropValue::Callback(Rc::new(|| {})));
    }

    #[test]
    fn test_node_same_is_identity_for_elements() {
        let a = host("div").attr("id", "x").build();
        let b = host("div").attr("id", "x").build();
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
        assert!(text("hi").same(&text("hi")));
    }

    #[test]
    fn test_shallow_eq() {
        let child = text("c");
        let mut a = PropsData::default();
        a.attrs.insert("n".into(), 1.into());
        a.children = child.clone();
        let mut b = a.clone();
        assert!(a.shallow_eq(&b));
        b.attrs.insert("n".into(), 2.into());
        assert!(!a.shallow_eq(&b));
    }

    #[test]
    fn test_builder_children_shapes() {
        let Node::Element(one) = host("p").child("x").build() else { panic!("element") };
        assert!(matches!(one.props.children, Node::Text(_)));

        let Node::Element(many) = host("p").child("x").child("y").build() else { panic!("element") };
        assert!(matches!(&many.props.children, Node::List(items) if items.len() == 2));
    }

    #[test]
    fn test_component_identity() {
        let a = Component::new("A", |_, _| Ok(Node::Empty));
        let b = Component::new("A", |_, _| Ok(Node::Empty));
        assert!(a == a.clone());
        assert!(a != b);
    }
}
