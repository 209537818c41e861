//! Context - Values provided to a subtree without threading props.
//!
//! - [`Context<T>`] is the typed handle callers create once and share
//! - providers push their value on a [`ProviderStack`] in begin_work and pop
//!   it in complete_work (or unwind), so a component always reads the value
//!   of its nearest provider
//! - every read is recorded on the reading node as a [`ContextDependency`];
//!   when a provider's value changes, [`propagate_context_change`] walks its
//!   subtree and schedules the lane on each matching consumer

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::fiber::{FiberArena, NodeId, WorkTag};
use crate::lanes::{is_subset_of_lanes, merge_lanes, Lane};
use crate::types::{ElementBuilder, ElementType, PropValue, Value};

thread_local! {
    /// Counter for context identities.
    static NEXT_CONTEXT_ID: Cell<u64> = const { Cell::new(0) };
}

// =============================================================================
// Identity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

fn next_context_id() -> ContextId {
    NEXT_CONTEXT_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        ContextId(id)
    })
}

fn typed_eq<T: PartialEq + 'static>(a: &Value, b: &Value) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => Rc::ptr_eq(a, b),
    }
}

struct ContextDef {
    id: ContextId,
    name: Rc<str>,
    default: Value,
    eq: fn(&Value, &Value) -> bool,
}

/// Type-erased context, stored on provider elements and nodes.
#[derive(Clone)]
pub struct ContextHandle(Rc<ContextDef>);

impl ContextHandle {
    pub fn id(&self) -> ContextId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn default_value(&self) -> Value {
        self.0.default.clone()
    }

    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        (self.0.eq)(a, b)
    }
}

/// A typed context with a default value.
pub struct Context<T> {
    handle: ContextHandle,
    _marker: PhantomData<T>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self { handle: self.handle.clone(), _marker: PhantomData }
    }
}

impl<T: Clone + PartialEq + 'static> Context<T> {
    pub fn new(name: &str, default: T) -> Self {
        let def = ContextDef { id: next_context_id(), name: name.into(), default: Rc::new(default), eq: typed_eq::<T> };
        Self { handle: ContextHandle(Rc::new(def)), _marker: PhantomData }
    }

    pub fn handle(&self) -> &ContextHandle {
        &self.handle
    }

    /// Provider element builder; add children with `.child(..)`.
    pub fn provider(&self, value: T) -> ElementBuilder {
        let value: Value = Rc::new(value);
        ElementBuilder::new(ElementType::Provider(self.handle.clone())).attr("value", PropValue::Any(value))
    }

    pub(crate) fn downcast(&self, value: &Value) -> T {
        match value.downcast_ref::<T>() {
            Some(v) => v.clone(),
            None => self.default_typed(),
        }
    }

    fn default_typed(&self) -> T {
        let default: &dyn Any = &*self.handle.0.default;
        match default.downcast_ref::<T>() {
            Some(v) => v.clone(),
            None => unreachable!("context default always has the context's type"),
        }
    }
}

/// Provided value of a provider's props (`value` attribute), or the default.
pub(crate) fn provided_value(handle: &ContextHandle, value: Option<&PropValue>) -> Value {
    match value {
        Some(PropValue::Any(v)) => v.clone(),
        _ => handle.default_value(),
    }
}

/// A context read recorded on a node.
#[derive(Clone)]
pub struct ContextDependency {
    pub context: ContextId,
    pub value: Value,
}

// =============================================================================
// Provider Stack
// =============================================================================

pub type ContextValues = HashMap<ContextId, Value>;

struct SavedValue {
    provider: NodeId,
    context: ContextId,
    previous: Option<Value>,
}

/// Values in effect at the node being rendered.
#[derive(Default)]
pub(crate) struct ProviderStack {
    values: Rc<ContextValues>,
    saved: Vec<SavedValue>,
}

impl ProviderStack {
    pub fn push(&mut self, provider: NodeId, context: ContextId, value: Value) {
        let previous = Rc::make_mut(&mut self.values).insert(context, value);
        self.saved.push(SavedValue { provider, context, previous });
    }

    /// Pop the entry pushed by `provider`. A no-op when it is not on top.
    pub fn pop(&mut self, provider: NodeId) {
        if self.saved.last().is_none_or(|top| top.provider != provider) {
            return;
        }
        let Some(saved) = self.saved.pop() else {
            return;
        };
        let values = Rc::make_mut(&mut self.values);
        match saved.previous {
            Some(previous) => {
                values.insert(saved.context, previous);
            }
            None => {
                values.remove(&saved.context);
            }
        }
    }

    /// Cheap copy of the current values for a component render.
    pub fn snapshot(&self) -> Rc<ContextValues> {
        self.values.clone()
    }
}

// =============================================================================
// Propagation
// =============================================================================

/// Schedule `lane` on every consumer of `context` below `provider`.
///
/// Nested providers of the same context shadow it and are not entered.
pub(crate) fn propagate_context_change(arena: &mut FiberArena, provider: NodeId, context: ContextId, lane: Lane) {
    let mut fiber = arena[provider].child;
    if let Some(child) = fiber {
        arena[child].parent = Some(provider);
    }

    while let Some(id) = fiber {
        let node = &arena[id];
        let mut next = if !node.dependencies.is_empty() {
            if node.dependencies.iter().any(|d| d.context == context) {
                let parent = node.parent;
                let alternate = node.alternate;
                let node = &mut arena[id];
                node.lanes = merge_lanes(node.lanes, lane);
                if let Some(alt) = alternate.and_then(|a| arena.get_mut(a)) {
                    alt.lanes = merge_lanes(alt.lanes, lane);
                }
                tracing::debug!(?context, consumer = ?id, "context change reached consumer");
                schedule_context_work_on_parent_path(arena, parent, provider, lane);
            }
            arena[id].child
        } else if node.tag == WorkTag::ContextProvider && provides_context(node.element_type.as_ref(), context) {
            None
        } else {
            node.child
        };

        match next {
            Some(child) => arena[child].parent = Some(id),
            None => {
                let mut cursor = Some(id);
                while let Some(c) = cursor {
                    if c == provider {
                        cursor = None;
                        break;
                    }
                    if let Some(sibling) = arena[c].sibling {
                        arena[sibling].parent = arena[c].parent;
                        cursor = Some(sibling);
                        break;
                    }
                    cursor = arena[c].parent;
                }
                next = cursor;
            }
        }
        fiber = next;
    }
}

fn provides_context(ty: Option<&ElementType>, context: ContextId) -> bool {
    matches!(ty, Some(ElementType::Provider(handle)) if handle.id() == context)
}

/// Add `lane` to the child lanes of every node from `from` up to `to`.
pub(crate) fn schedule_context_work_on_parent_path(arena: &mut FiberArena, from: Option<NodeId>, to: NodeId, lane: Lane) {
    let mut node = from;
    while let Some(id) = node {
        let Some(n) = arena.get_mut(id) else {
            return;
        };
        let alternate = n.alternate;
        if !is_subset_of_lanes(n.child_lanes, lane) {
            n.child_lanes = merge_lanes(n.child_lanes, lane);
            if let Some(alt) = alternate.and_then(|a| arena.get_mut(a)) {
                alt.child_lanes = merge_lanes(alt.child_lanes, lane);
            }
        } else if let Some(alt) = alternate.and_then(|a| arena.get_mut(a)) {
            if !is_subset_of_lanes(alt.child_lanes, lane) {
                alt.child_lanes = merge_lanes(alt.child_lanes, lane);
            }
        }
        if id == to {
            return;
        }
        node = arena[id].parent;
    }
}
