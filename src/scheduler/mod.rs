//! Scheduler - Contract of the external cooperative task scheduler.
//!
//! The reconciler never runs its own event loop. It hands time-sliced work to
//! an implementation of [`Scheduler`] and polls [`Scheduler::should_yield`]
//! between units of work.
//!
//! - Five ordered priority levels ([`SchedulerPriority`])
//! - Cancellable callbacks identified by [`CallbackToken`]
//! - Continuations: a callback may return another [`SchedulerTask`] which the
//!   scheduler re-invokes later under the same token and priority
//!
//! [`ManualScheduler`] is a deterministic implementation used by tests and
//! single-threaded embedders that drive time themselves.

mod mock;

pub use mock::ManualScheduler;

// =============================================================================
// Priority
// =============================================================================

/// Scheduler priority levels, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SchedulerPriority {
    Immediate,
    UserBlocking,
    #[default]
    Normal,
    Low,
    Idle,
}

// =============================================================================
// Tasks
// =============================================================================

/// Handle returned by [`Scheduler::schedule_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackToken(pub u64);

/// A unit of scheduled work.
///
/// The argument is `did_timeout`: true when the scheduler wants the task to
/// finish without yielding. Returning `Some` asks to be resumed later.
pub struct SchedulerTask(Box<dyn FnOnce(bool) -> Option<SchedulerTask>>);

impl SchedulerTask {
    pub fn new(task: impl FnOnce(bool) -> Option<SchedulerTask> + 'static) -> Self {
        Self(Box::new(task))
    }

    /// Run the task, returning its continuation if it yielded.
    pub fn run(self, did_timeout: bool) -> Option<SchedulerTask> {
        (self.0)(did_timeout)
    }
}

impl std::fmt::Debug for SchedulerTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SchedulerTask(..)")
    }
}

// =============================================================================
// Scheduler Trait
// =============================================================================

/// The scheduler the work loop is driven by.
pub trait Scheduler {
    /// Queue `task` at `priority`.
    fn schedule_callback(&self, priority: SchedulerPriority, task: SchedulerTask) -> CallbackToken;

    /// Drop a queued task. Unknown tokens are ignored.
    fn cancel_callback(&self, token: CallbackToken);

    /// Whether the running task should hand control back.
    fn should_yield(&self) -> bool;

    /// Priority of the task currently running (or the ambient priority).
    fn current_priority(&self) -> SchedulerPriority;

    /// Run `f` with the ambient priority set to `priority`.
    fn run_with_priority(&self, priority: SchedulerPriority, f: &mut dyn FnMut());
}

/// Typed convenience over [`Scheduler::run_with_priority`].
pub fn run_at<R>(scheduler: &dyn Scheduler, priority: SchedulerPriority, f: impl FnOnce() -> R) -> R {
    let mut f = Some(f);
    let mut out = None;
    scheduler.run_with_priority(priority, &mut || {
        if let Some(f) = f.take() {
            out = Some(f());
        }
    });
    match out {
        Some(out) => out,
        // Scheduler never invoked the closure; run it at ambient priority.
        None => match f.take() {
            Some(f) => f(),
            None => unreachable!("closure consumed without producing a value"),
        },
    }
}
