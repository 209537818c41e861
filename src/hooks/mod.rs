//! Hooks - Per-node state cells, effects and context reads.
//!
//! A component receives a [`RenderCx`] and calls hooks in a fixed order.
//! Hooks are stored on the node as a list indexed by call order:
//!
//! - on mount each call appends a fresh slot
//! - on update each call reads the slot at the same index of the current
//!   node, folds its pending updates, and appends the result to the
//!   work-in-progress list
//!
//! A different number or kind of hook calls on re-render is a fatal
//! invariant violation ([`ReconcileError::HookCountMismatch`],
//! [`ReconcileError::HookKindMismatch`]): the render fails instead of
//! guessing which slot belongs to which call.

mod effect;
mod state;

pub use effect::{Cleanup, Deps, Effect, EffectSetup};
pub use state::{Dispatch, HookAction, SetState, StartTransition};

pub(crate) use state::{Dispatcher, StateHook};

use std::any::TypeId;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use state::{apply_state_action, typed_eq, Reduce};

use crate::context::{Context, ContextDependency, ContextValues};
use crate::error::{Interrupt, Outcome, ReconcileError};
use crate::fiber::{FiberState, Flags, HookFlags, NodeId};
use crate::lanes::{merge_lanes, remove_lanes, Lane, Lanes, NO_LANES};
use crate::suspense::{SuspendedReason, Thenable};
use crate::types::{Component, Node, Props, Value};
use crate::update_queue::{merge_pending_into_base, process_update_queue, QueueState};
use crate::work_loop::{RootShared, WorkCx};

// =============================================================================
// Hook Slots
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookKind {
    State,
    Effect,
    Ref,
    Memo,
}

impl HookKind {
    fn name(self) -> &'static str {
        match self {
            HookKind::State => "state",
            HookKind::Effect => "effect",
            HookKind::Ref => "ref",
            HookKind::Memo => "memo",
        }
    }
}

/// One hook slot.
#[derive(Clone)]
pub enum Hook {
    #[doc(hidden)]
    State(StateHook),
    Effect(Rc<Effect>),
    Ref(Value),
    Memo { value: Value, deps: Deps },
}

impl Hook {
    fn kind(&self) -> HookKind {
        match self {
            Hook::State(_) => HookKind::State,
            Hook::Effect(_) => HookKind::Effect,
            Hook::Ref(_) => HookKind::Ref,
            Hook::Memo { .. } => HookKind::Memo,
        }
    }
}

// =============================================================================
// RenderCx
// =============================================================================

/// Render context handed to every component render.
pub struct RenderCx {
    root: Weak<RootShared>,
    fiber: NodeId,
    component: Rc<str>,
    render_lane: Lane,
    /// Hooks of the current node; `None` on mount.
    current_hooks: Option<Vec<Hook>>,
    hooks: Vec<Hook>,
    effects: Vec<Rc<Effect>>,
    fiber_flags: Flags,
    skipped_lanes: Lanes,
    contexts: Rc<ContextValues>,
    old_dependencies: Vec<ContextDependency>,
    dependencies: Vec<ContextDependency>,
    did_receive_update: bool,
    violation: Option<ReconcileError>,
}

impl RenderCx {
    pub fn component_name(&self) -> &str {
        &self.component
    }

    /// True on the first render of this node.
    pub fn is_mount(&self) -> bool {
        self.current_hooks.is_none()
    }

    fn record_violation(&mut self, error: ReconcileError) {
        if self.violation.is_none() {
            self.violation = Some(error);
        }
    }

    /// Slot `index` of the current node, checked against `kind`.
    fn current_hook(&mut self, index: usize, kind: HookKind) -> Option<Hook> {
        let found = match &self.current_hooks {
            None => return None,
            Some(list) => match list.get(index) {
                None => Err(ReconcileError::HookCountMismatch {
                    component: self.component.to_string(),
                    expected: list.len(),
                    actual: index + 1,
                }),
                Some(hook) if hook.kind() != kind => Err(ReconcileError::HookKindMismatch {
                    component: self.component.to_string(),
                    index,
                    expected: hook.kind().name(),
                    actual: kind.name(),
                }),
                Some(hook) => Ok(hook.clone()),
            },
        };
        match found {
            Ok(hook) => Some(hook),
            Err(error) => {
                self.record_violation(error);
                None
            }
        }
    }

    fn write_back(&mut self, index: usize, hook: Hook) {
        if let Some(slot) = self.current_hooks.as_mut().and_then(|list| list.get_mut(index)) {
            *slot = hook;
        }
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    /// Shared body of `use_state` and `use_reducer`. `init` runs on mount, and
    /// in place of a slot whose state turned out to hold another type.
    fn state_hook<T>(&mut self, reduce: Reduce, eager: bool, init: impl FnOnce() -> T) -> (T, Dispatcher)
    where
        T: Clone + PartialEq + 'static,
    {
        let index = self.hooks.len();
        let eq: fn(&Value, &Value) -> bool = typed_eq::<T>;
        let state_type = TypeId::of::<T>();
        let current = match self.current_hook(index, HookKind::State) {
            Some(Hook::State(hook)) if hook.state_type == state_type => Some(hook),
            Some(Hook::State(_)) => {
                self.record_type_violation(index);
                None
            }
            _ => None,
        };

        if let Some(mut current) = current {
            // Pending updates move onto the current buffer so an abandoned render keeps them.
            merge_pending_into_base(&mut current.queue);
            let mut skipped = NO_LANES;
            let processed = process_update_queue(
                current.queue.base_state.clone(),
                &current.queue.base_queue,
                self.render_lane,
                |state, action| reduce(state, action),
                |lane| skipped = merge_lanes(skipped, lane),
            );
            match processed.memoized_state.downcast_ref::<T>().cloned() {
                Some(value) => {
                    self.skipped_lanes = merge_lanes(self.skipped_lanes, skipped);
                    if !eq(&processed.memoized_state, &current.queue.memoized_state) {
                        self.did_receive_update = true;
                    }

                    let shared = current.queue.shared.clone();
                    shared.borrow_mut().last_rendered_state = Some(processed.memoized_state.clone());
                    let dispatcher = current.dispatcher.clone();
                    self.write_back(index, Hook::State(current));
                    self.hooks.push(Hook::State(StateHook {
                        queue: QueueState {
                            memoized_state: processed.memoized_state,
                            base_state: processed.base_state,
                            base_queue: processed.base_queue,
                            shared,
                        },
                        dispatcher: dispatcher.clone(),
                        state_type,
                    }));
                    return (value, dispatcher);
                }
                None => self.record_type_violation(index),
            }
        }

        let value = init();
        let queue = QueueState::new(Rc::new(value.clone()) as Value);
        queue.shared.borrow_mut().last_rendered_state = Some(queue.memoized_state.clone());
        let dispatcher = Dispatcher::new(self.root.clone(), self.fiber, queue.shared.clone(), eager, eq);
        self.hooks.push(Hook::State(StateHook { queue, dispatcher: dispatcher.clone(), state_type }));
        (value, dispatcher)
    }

    fn record_type_violation(&mut self, index: usize) {
        self.record_violation(ReconcileError::HookKindMismatch {
            component: self.component.to_string(),
            index,
            expected: "state",
            actual: "state of another type",
        });
    }

    /// A state cell. `init` runs on mount only.
    pub fn use_state<T>(&mut self, init: impl FnOnce() -> T) -> (T, SetState<T>)
    where
        T: Clone + PartialEq + 'static,
    {
        let (value, dispatcher) = self.state_hook(Rc::new(apply_state_action), true, init);
        (value, SetState::new(dispatcher))
    }

    /// A state cell driven by `reducer`. The reducer of the current render is used.
    pub fn use_reducer<S, A>(&mut self, reducer: impl Fn(&S, &A) -> S + 'static, init: impl FnOnce() -> S) -> (S, Dispatch<A>)
    where
        S: Clone + PartialEq + 'static,
        A: 'static,
    {
        let reduce: Reduce = Rc::new(move |state: &Value, action: &HookAction| -> Value {
            match action {
                HookAction::Dispatch(action) => match (state.downcast_ref::<S>(), action.downcast_ref::<A>()) {
                    (Some(state), Some(action)) => Rc::new(reducer(state, action)),
                    _ => state.clone(),
                },
                other => apply_state_action(state, other),
            }
        });
        let (value, dispatcher) = self.state_hook(reduce, false, init);
        (value, Dispatch::new(dispatcher))
    }

    /// `(is_pending, start)` for marking updates as low-priority transitions.
    pub fn use_transition(&mut self) -> (bool, StartTransition) {
        let (pending, set_pending) = self.use_state(|| false);
        (pending, StartTransition::new(set_pending))
    }

    // -------------------------------------------------------------------------
    // Effects
    // -------------------------------------------------------------------------

    fn effect_hook(&mut self, deps: Option<Deps>, setup: EffectSetup) {
        let index = self.hooks.len();
        let previous = match self.current_hook(index, HookKind::Effect) {
            Some(Hook::Effect(effect)) => Some(effect),
            _ => None,
        };

        let (changed, destroy) = match previous {
            Some(prev) => {
                let same = match (&prev.deps, &deps) {
                    (Some(a), Some(b)) => a.same(b),
                    _ => false,
                };
                (!same, prev.destroy.clone())
            }
            None => (true, Rc::new(RefCell::new(None))),
        };

        let mut tag = HookFlags::PASSIVE;
        if changed {
            tag |= HookFlags::HAS_EFFECT;
            self.fiber_flags |= Flags::PASSIVE;
        }
        let effect = Rc::new(Effect::new(tag, setup, destroy, deps));
        self.effects.push(effect.clone());
        self.hooks.push(Hook::Effect(effect));
    }

    /// Deferred effect that runs after every commit of this node.
    pub fn use_effect(&mut self, setup: impl FnOnce() -> Option<Cleanup> + 'static) {
        self.effect_hook(None, Box::new(setup));
    }

    /// Deferred effect that runs when `deps` change.
    pub fn use_effect_with<D: PartialEq + 'static>(&mut self, deps: D, setup: impl FnOnce() -> Option<Cleanup> + 'static) {
        self.effect_hook(Some(Deps::new(deps)), Box::new(setup));
    }

    // -------------------------------------------------------------------------
    // Refs and memoization
    // -------------------------------------------------------------------------

    /// A mutable cell that persists across renders without triggering them.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Rc<RefCell<T>> {
        let index = self.hooks.len();
        let existing = match self.current_hook(index, HookKind::Ref) {
            Some(Hook::Ref(value)) => value.downcast::<RefCell<T>>().ok(),
            _ => None,
        };
        let cell = existing.unwrap_or_else(|| Rc::new(RefCell::new(init())));
        self.hooks.push(Hook::Ref(cell.clone()));
        cell
    }

    /// `compute()` cached until `deps` change.
    pub fn use_memo<T, D>(&mut self, deps: D, compute: impl FnOnce() -> T) -> T
    where
        T: Clone + 'static,
        D: PartialEq + 'static,
    {
        let index = self.hooks.len();
        let deps = Deps::new(deps);
        let cached = match self.current_hook(index, HookKind::Memo) {
            Some(Hook::Memo { value, deps: prev }) if prev.same(&deps) => value.downcast_ref::<T>().cloned(),
            _ => None,
        };
        let value = match cached {
            Some(value) => value,
            None => compute(),
        };
        self.hooks.push(Hook::Memo { value: Rc::new(value.clone()), deps });
        value
    }

    /// `f` with a stable identity until `deps` change.
    pub fn use_callback<F: 'static, D: PartialEq + 'static>(&mut self, deps: D, f: F) -> Rc<F> {
        self.use_memo(deps, move || Rc::new(f))
    }

    // -------------------------------------------------------------------------
    // Context and awaitables
    // -------------------------------------------------------------------------

    /// Value of the nearest provider of `context`, or its default.
    pub fn use_context<T: Clone + PartialEq + 'static>(&mut self, context: &Context<T>) -> T {
        let handle = context.handle();
        let value = self.contexts.get(&handle.id()).cloned().unwrap_or_else(|| handle.default_value());
        let changed = self
            .old_dependencies
            .iter()
            .find(|dep| dep.context == handle.id())
            .is_some_and(|dep| !handle.values_equal(&dep.value, &value));
        if changed {
            self.did_receive_update = true;
        }
        self.dependencies.push(ContextDependency { context: handle.id(), value: value.clone() });
        context.downcast(&value)
    }

    /// Read an awaitable, suspending the render while it is pending.
    pub fn use_awaitable<T: Clone + 'static>(&mut self, thenable: &Thenable<T>) -> Outcome<T> {
        thenable.read(SuspendedReason::Data)
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Run `component` for `wip`, storing hooks, effects and dependencies on it.
pub(crate) fn render_with_hooks(
    cx: &mut WorkCx<'_>,
    current: Option<NodeId>,
    wip: NodeId,
    component: &Component,
    props: &Props,
) -> Outcome<Node> {
    let current_hooks = current.and_then(|c| match std::mem::take(&mut cx.arena[c].memoized_state) {
        FiberState::Hooks(hooks) => Some(hooks),
        other => {
            cx.arena[c].memoized_state = other;
            None
        }
    });
    let old_dependencies = current.map(|c| cx.arena[c].dependencies.clone()).unwrap_or_default();

    let mut rcx = RenderCx {
        root: cx.shared.weak(),
        fiber: wip,
        component: component.name_rc(),
        render_lane: cx.session.render_lane,
        current_hooks,
        hooks: Vec::new(),
        effects: Vec::new(),
        fiber_flags: Flags::empty(),
        skipped_lanes: NO_LANES,
        contexts: cx.session.providers.snapshot(),
        old_dependencies,
        dependencies: Vec::new(),
        did_receive_update: false,
        violation: None,
    };
    tracing::trace!(component = %rcx.component, "render");
    let result = component.render(&mut rcx, props);

    let RenderCx {
        current_hooks,
        hooks,
        effects,
        fiber_flags,
        skipped_lanes,
        dependencies,
        did_receive_update,
        mut violation,
        component: name,
        ..
    } = rcx;

    let previous_count = current_hooks.as_ref().map(Vec::len);
    if let (Some(c), Some(current_hooks)) = (current, current_hooks) {
        cx.arena[c].memoized_state = FiberState::Hooks(current_hooks);
    }

    if result.is_ok() && violation.is_none() {
        if let Some(expected) = previous_count.filter(|expected| *expected != hooks.len()) {
            violation = Some(ReconcileError::HookCountMismatch {
                component: name.to_string(),
                expected,
                actual: hooks.len(),
            });
        }
    }
    if let Some(violation) = violation {
        return Err(Interrupt::Failed(violation));
    }

    let node = &mut cx.arena[wip];
    if result.is_ok() {
        node.memoized_state = FiberState::Hooks(hooks);
        node.effects = effects;
        node.flags |= fiber_flags;
        node.dependencies = dependencies;
    }
    node.lanes = merge_lanes(node.lanes, skipped_lanes);
    cx.session.did_receive_update |= did_receive_update;
    result
}

/// Reuse the current node's effects after a render that changed nothing.
pub(crate) fn bailout_hooks(cx: &mut WorkCx<'_>, current: NodeId, wip: NodeId) {
    let effects = cx.arena[current].effects.clone();
    let node = &mut cx.arena[wip];
    node.effects = effects;
    node.flags.remove(Flags::PASSIVE);
    let current = &mut cx.arena[current];
    current.lanes = remove_lanes(current.lanes, cx.session.render_lane);
}
