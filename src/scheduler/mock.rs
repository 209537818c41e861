//! ManualScheduler - Deterministic, caller-driven scheduler.
//!
//! Tasks are kept in a priority queue and only run when the owner calls
//! [`ManualScheduler::run_next`] or [`ManualScheduler::run_all`]. Time slicing
//! is simulated with a "units per slice" budget: `should_yield` returns true
//! once it has been polled more than the budget allows within one task run.

use std::cell::{Cell, RefCell};

use super::{CallbackToken, Scheduler, SchedulerPriority, SchedulerTask};

/// Upper bound on tasks `run_all` will execute before giving up.
const RUN_ALL_LIMIT: usize = 10_000;

struct QueuedTask {
    token: CallbackToken,
    priority: SchedulerPriority,
    seq: u64,
    task: SchedulerTask,
}

/// Scheduler whose clock is the test (or embedder) calling `run_*`.
#[derive(Default)]
pub struct ManualScheduler {
    queue: RefCell<Vec<QueuedTask>>,
    next_token: Cell<u64>,
    next_seq: Cell<u64>,
    current: Cell<SchedulerPriority>,
    units_per_slice: Cell<Option<usize>>,
    polls: Cell<usize>,
    running: Cell<Option<CallbackToken>>,
    running_cancelled: Cell<bool>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler that yields after `units` polls of `should_yield` per task run.
    pub fn with_units_per_slice(units: usize) -> Self {
        let scheduler = Self::default();
        scheduler.units_per_slice.set(Some(units));
        scheduler
    }

    /// Change the slice budget. `None` never yields.
    pub fn set_units_per_slice(&self, units: Option<usize>) {
        self.units_per_slice.set(units);
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Priorities of the queued tasks, in run order.
    pub fn pending_priorities(&self) -> Vec<SchedulerPriority> {
        let mut queued: Vec<(SchedulerPriority, u64)> =
            self.queue.borrow().iter().map(|t| (t.priority, t.seq)).collect();
        queued.sort();
        queued.into_iter().map(|(priority, _)| priority).collect()
    }

    /// Run the most urgent queued task once. Returns false when idle.
    pub fn run_next(&self) -> bool {
        let next = {
            let mut queue = self.queue.borrow_mut();
            let index = queue
                .iter()
                .enumerate()
                .min_by_key(|(_, t)| (t.priority, t.seq))
                .map(|(i, _)| i);
            index.map(|i| queue.remove(i))
        };
        let Some(QueuedTask { token, priority, seq, task }) = next else {
            return false;
        };

        let previous = self.current.replace(priority);
        self.polls.set(0);
        self.running.set(Some(token));
        self.running_cancelled.set(false);

        let continuation = task.run(false);

        self.running.set(None);
        self.current.set(previous);

        if let Some(task) = continuation {
            if !self.running_cancelled.get() {
                // Continuations keep their token and their place in line.
                self.queue.borrow_mut().push(QueuedTask { token, priority, seq, task });
            }
        }
        true
    }

    /// Run tasks until the queue is empty. Returns how many task runs happened.
    pub fn run_all(&self) -> usize {
        let mut runs = 0;
        while self.run_next() {
            runs += 1;
            if runs >= RUN_ALL_LIMIT {
                tracing::warn!(runs, "ManualScheduler::run_all hit its run limit");
                break;
            }
        }
        runs
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_callback(&self, priority: SchedulerPriority, task: SchedulerTask) -> CallbackToken {
        let token = CallbackToken(self.next_token.get());
        self.next_token.set(token.0 + 1);
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.queue.borrow_mut().push(QueuedTask { token, priority, seq, task });
        token
    }

    fn cancel_callback(&self, token: CallbackToken) {
        if self.running.get() == Some(token) {
            self.running_cancelled.set(true);
        }
        self.queue.borrow_mut().retain(|t| t.token != token);
    }

    fn should_yield(&self) -> bool {
        match self.units_per_slice.get() {
            Some(budget) => {
                let polls = self.polls.get() + 1;
                self.polls.set(polls);
                polls > budget
            }
            None => false,
        }
    }

    fn current_priority(&self) -> SchedulerPriority {
        self.current.get()
    }

    fn run_with_priority(&self, priority: SchedulerPriority, f: &mut dyn FnMut()) {
        let previous = self.current.replace(priority);
        f();
        self.current.set(previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_runs_in_priority_then_fifo_order() {
        let scheduler = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (priority, name) in [
            (SchedulerPriority::Low, "low"),
            (SchedulerPriority::Immediate, "immediate"),
            (SchedulerPriority::Normal, "normal-1"),
            (SchedulerPriority::Normal, "normal-2"),
        ] {
            let log = log.clone();
            scheduler.schedule_callback(
                priority,
                SchedulerTask::new(move |_| {
                    log.borrow_mut().push(name);
                    None
                }),
            );
        }
        assert_eq!(scheduler.run_all(), 4);
        assert_eq!(*log.borrow(), vec!["immediate", "normal-1", "normal-2", "low"]);
    }

    #[test]
    fn test_cancel_removes_task() {
        let scheduler = ManualScheduler::new();
        let token = scheduler.schedule_callback(SchedulerPriority::Normal, SchedulerTask::new(|_| None));
        scheduler.cancel_callback(token);
        assert_eq!(scheduler.pending(), 0);
        assert!(!scheduler.run_next());
    }

    #[test]
    fn test_continuation_is_requeued() {
        let scheduler = ManualScheduler::new();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        scheduler.schedule_callback(
            SchedulerPriority::Normal,
            SchedulerTask::new(move |_| {
                c.set(c.get() + 1);
                let c = c.clone();
                Some(SchedulerTask::new(move |_| {
                    c.set(c.get() + 1);
                    None
                }))
            }),
        );
        assert_eq!(scheduler.run_all(), 2);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_should_yield_budget_resets_per_run() {
        let scheduler = ManualScheduler::with_units_per_slice(2);
        assert!(!scheduler.should_yield());
        assert!(!scheduler.should_yield());
        assert!(scheduler.should_yield());
        scheduler.schedule_callback(SchedulerPriority::Normal, SchedulerTask::new(|_| None));
        scheduler.run_next();
        assert!(!scheduler.should_yield());
    }

    #[test]
    fn test_current_priority_during_run() {
        let scheduler = Rc::new(ManualScheduler::new());
        let seen = Rc::new(Cell::new(SchedulerPriority::Idle));
        let (s, out) = (scheduler.clone(), seen.clone());
        scheduler.schedule_callback(
            SchedulerPriority::UserBlocking,
            SchedulerTask::new(move |_| {
                out.set(s.current_priority());
                None
            }),
        );
        scheduler.run_all();
        assert_eq!(seen.get(), SchedulerPriority::UserBlocking);
        assert_eq!(scheduler.current_priority(), SchedulerPriority::Normal);
    }
}
