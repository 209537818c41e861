//! State cells: actions, dispatchers and their typed handles.

use std::any::TypeId;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::fiber::NodeId;
use crate::update_queue::{enqueue_update, QueueState, SharedQueueRef, Update};
use crate::work_loop::{start_transition, RootShared};
use crate::types::Value;

/// Change requested through a dispatcher.
#[derive(Clone)]
pub enum HookAction {
    /// New value.
    Replace(Value),
    /// Function of the previous value.
    Map(Rc<dyn Fn(&Value) -> Value>),
    /// Action for the hook's reducer.
    Dispatch(Value),
}

pub(crate) type Reduce = Rc<dyn Fn(&Value, &HookAction) -> Value>;

/// Reducer of `use_state` hooks.
pub(crate) fn apply_state_action(state: &Value, action: &HookAction) -> Value {
    match action {
        HookAction::Replace(value) => value.clone(),
        HookAction::Map(f) => f(state),
        HookAction::Dispatch(_) => state.clone(),
    }
}

pub(crate) fn typed_eq<T: PartialEq + 'static>(a: &Value, b: &Value) -> bool {
    Rc::ptr_eq(a, b)
        || matches!((a.downcast_ref::<T>(), b.downcast_ref::<T>()), (Some(a), Some(b)) if a == b)
}

/// Hook slot of `use_state` / `use_reducer`.
#[derive(Clone)]
pub struct StateHook {
    pub(crate) queue: QueueState<Value, HookAction>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) state_type: TypeId,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Type-erased dispatch entry point bound to the node that mounted the hook.
#[derive(Clone)]
pub struct Dispatcher {
    root: Weak<RootShared>,
    fiber: NodeId,
    queue: SharedQueueRef<Value, HookAction>,
    /// Compute state at dispatch time when the node has no pending work.
    eager: bool,
    eq: fn(&Value, &Value) -> bool,
}

impl Dispatcher {
    pub(crate) fn new(
        root: Weak<RootShared>,
        fiber: NodeId,
        queue: SharedQueueRef<Value, HookAction>,
        eager: bool,
        eq: fn(&Value, &Value) -> bool,
    ) -> Self {
        Self { root, fiber, queue, eager, eq }
    }

    pub(crate) fn dispatch(&self, action: HookAction) {
        let Some(shared) = self.root.upgrade() else {
            tracing::warn!("state update dispatched after its root was dropped");
            return;
        };
        let lane = shared.request_update_lane();
        let mut update = Update::new(action, lane);

        if self.eager && shared.fiber_is_idle(self.fiber) {
            let last = {
                let queue = self.queue.borrow();
                if queue.pending.is_empty() { queue.last_rendered_state.clone() } else { None }
            };
            if let Some(last) = last {
                let eager = apply_state_action(&last, &update.action);
                let unchanged = (self.eq)(&eager, &last);
                update.eager_state = Some(eager);
                if unchanged {
                    tracing::trace!(fiber = ?self.fiber, "eager state unchanged, no render scheduled");
                    enqueue_update(&self.queue, update);
                    return;
                }
            }
        }

        enqueue_update(&self.queue, update);
        shared.schedule_update_on_fiber(self.fiber, lane);
    }

    fn same(&self, other: &Dispatcher) -> bool {
        Rc::ptr_eq(&self.queue, &other.queue)
    }
}

// =============================================================================
// Typed Handles
// =============================================================================

/// Setter returned by `use_state`. Identity is stable across renders.
pub struct SetState<T> {
    dispatcher: Dispatcher,
    _marker: PhantomData<T>,
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self { dispatcher: self.dispatcher.clone(), _marker: PhantomData }
    }
}

impl<T> PartialEq for SetState<T> {
    fn eq(&self, other: &Self) -> bool {
        self.dispatcher.same(&other.dispatcher)
    }
}

impl<T: Clone + PartialEq + 'static> SetState<T> {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher, _marker: PhantomData }
    }

    pub fn set(&self, value: T) {
        self.dispatcher.dispatch(HookAction::Replace(Rc::new(value)));
    }

    /// Queue a change computed from the state it is applied to.
    pub fn update(&self, f: impl Fn(&T) -> T + 'static) {
        let map = move |state: &Value| -> Value {
            match state.downcast_ref::<T>() {
                Some(state) => Rc::new(f(state)),
                None => state.clone(),
            }
        };
        self.dispatcher.dispatch(HookAction::Map(Rc::new(map)));
    }
}

/// Dispatch function returned by `use_reducer`.
pub struct Dispatch<A> {
    dispatcher: Dispatcher,
    _marker: PhantomData<A>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self { dispatcher: self.dispatcher.clone(), _marker: PhantomData }
    }
}

impl<A> PartialEq for Dispatch<A> {
    fn eq(&self, other: &Self) -> bool {
        self.dispatcher.same(&other.dispatcher)
    }
}

impl<A: 'static> Dispatch<A> {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher, _marker: PhantomData }
    }

    pub fn dispatch(&self, action: A) {
        self.dispatcher.dispatch(HookAction::Dispatch(Rc::new(action)));
    }
}

/// Starts low-priority updates. Returned by `use_transition`.
#[derive(Clone)]
pub struct StartTransition {
    set_pending: SetState<bool>,
}

impl StartTransition {
    pub(crate) fn new(set_pending: SetState<bool>) -> Self {
        Self { set_pending }
    }

    /// Run `f`; every update it dispatches gets the transition lane.
    ///
    /// The pending flag flips to true at the caller's priority and back to
    /// false together with the transition's own updates.
    pub fn start(&self, f: impl FnOnce()) {
        self.set_pending.set(true);
        start_transition(|| {
            self.set_pending.set(false);
            f();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_state_action() {
        let prev: Value = Rc::new(1_i32);
        let replaced = apply_state_action(&prev, &HookAction::Replace(Rc::new(5_i32)));
        assert_eq!(replaced.downcast_ref::<i32>(), Some(&5));

        let double: Rc<dyn Fn(&Value) -> Value> =
            Rc::new(|v: &Value| -> Value { Rc::new(v.downcast_ref::<i32>().copied().unwrap_or(0) * 2) });
        let mapped = apply_state_action(&prev, &HookAction::Map(double));
        assert_eq!(mapped.downcast_ref::<i32>(), Some(&2));
    }

    #[test]
    fn test_typed_eq() {
        let a: Value = Rc::new(String::from("x"));
        let b: Value = Rc::new(String::from("x"));
        assert!(typed_eq::<String>(&a, &b));
        assert!(!typed_eq::<String>(&a, &(Rc::new(String::from("y")) as Value)));
    }
}
