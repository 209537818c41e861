//! Suspense - Pausing a render on external data and resuming it later.
//!
//! A render step that needs a value which is not ready returns
//! `Err(Interrupt::Suspended(..))` carrying an [`Awaitable`]. The work loop
//! then:
//! 1. throws: marks the nearest suspense boundary should-capture and attaches
//!    a one-shot ping listener to the awaitable (deduplicated per lane)
//! 2. unwinds: pops context/boundary stacks up to that boundary, which then
//!    re-renders with its fallback
//! 3. on ping: marks the lane pinged and schedules the root again
//!
//! With no boundary the render ends as "did not complete" and the lane is
//! parked as suspended until the ping.

mod lazy;
mod thenable;
pub(crate) mod throw;

pub use lazy::{lazy, LazyComponent};
pub use thenable::{Thenable, ThenableStatus};

use std::fmt;
use std::rc::Rc;

/// Anything a render can wait on.
pub trait Wakeable {
    /// Register callbacks for settlement. Called at most once per (awaitable, lane).
    fn then(&self, on_ready: Box<dyn FnOnce()>, on_error: Box<dyn FnOnce(String)>);

    /// Identity used to deduplicate listeners.
    fn id(&self) -> usize;
}

pub type Awaitable = Rc<dyn Wakeable>;

/// How the render came to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendedReason {
    /// A component read an unresolved awaitable.
    Data,
    /// A lazy component is still loading.
    LegacyAwait,
    /// A genuine failure is being unwound.
    Error,
}

/// Payload of a suspension interrupt.
#[derive(Clone)]
pub struct Suspension {
    pub awaitable: Awaitable,
    pub reason: SuspendedReason,
}

impl fmt::Debug for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspension").field("awaitable", &self.awaitable.id()).field("reason", &self.reason).finish()
    }
}
