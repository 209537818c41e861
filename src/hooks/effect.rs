//! Effect records and dependency snapshots.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::fiber::HookFlags;
use crate::types::Value;

/// Teardown returned by an effect setup.
pub type Cleanup = Box<dyn FnOnce()>;

/// Setup of a deferred effect.
pub type EffectSetup = Box<dyn FnOnce() -> Option<Cleanup>>;

// =============================================================================
// Deps
// =============================================================================

/// Type-erased dependency snapshot compared with the type's `PartialEq`.
#[derive(Clone)]
pub struct Deps {
    value: Value,
    eq: fn(&Value, &Value) -> bool,
}

fn deps_eq<D: PartialEq + 'static>(a: &Value, b: &Value) -> bool {
    match (a.downcast_ref::<D>(), b.downcast_ref::<D>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

impl Deps {
    pub fn new<D: PartialEq + 'static>(deps: D) -> Self {
        Self { value: Rc::new(deps), eq: deps_eq::<D> }
    }

    pub fn same(&self, other: &Deps) -> bool {
        (self.eq)(&self.value, &other.value)
    }
}

// =============================================================================
// Effect
// =============================================================================

/// One deferred effect produced by one render.
///
/// The teardown cell is shared with the previous render's record for the
/// same hook, so whichever record is flushed or unmounted last sees the
/// teardown currently installed.
pub struct Effect {
    pub(crate) tag: HookFlags,
    setup: RefCell<Option<EffectSetup>>,
    pub(crate) destroy: Rc<RefCell<Option<Cleanup>>>,
    pub(crate) deps: Option<Deps>,
}

impl Effect {
    pub(crate) fn new(
        tag: HookFlags,
        setup: EffectSetup,
        destroy: Rc<RefCell<Option<Cleanup>>>,
        deps: Option<Deps>,
    ) -> Self {
        Self { tag, setup: RefCell::new(Some(setup)), destroy, deps }
    }

    pub fn has_effect(&self) -> bool {
        self.tag.contains(HookFlags::PASSIVE | HookFlags::HAS_EFFECT)
    }

    /// Run the installed teardown, if any.
    pub(crate) fn run_teardown(&self) {
        let destroy = self.destroy.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }

    /// Run the setup (once) and install its teardown.
    pub(crate) fn run_setup(&self) {
        let setup = self.setup.borrow_mut().take();
        if let Some(setup) = setup {
            let cleanup = setup();
            *self.destroy.borrow_mut() = cleanup;
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect").field("tag", &self.tag).finish_non_exhaustive()
    }
}
