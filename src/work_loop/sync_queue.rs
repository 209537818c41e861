//! Queue of synchronous-lane work, drained from a host microtask.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

#[derive(Default)]
pub(crate) struct SyncQueue {
    callbacks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    flushing: Cell<bool>,
}

impl SyncQueue {
    pub fn push(&self, callback: Box<dyn FnOnce()>) {
        self.callbacks.borrow_mut().push_back(callback);
    }

    /// Run queued callbacks, including ones queued while flushing.
    ///
    /// Re-entrant calls return immediately; the outer flush picks up their work.
    pub fn flush(&self) -> usize {
        if self.flushing.replace(true) {
            return 0;
        }
        let mut ran = 0;
        loop {
            let next = self.callbacks.borrow_mut().pop_front();
            let Some(callback) = next else {
                break;
            };
            callback();
            ran += 1;
        }
        self.flushing.set(false);
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_flush_runs_callbacks_queued_during_flush() {
        let queue = Rc::new(SyncQueue::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        let (q, l) = (queue.clone(), log.clone());
        queue.push(Box::new(move || {
            l.borrow_mut().push(1);
            let l = l.clone();
            q.push(Box::new(move || l.borrow_mut().push(2)));
            assert_eq!(q.flush(), 0);
        }));
        assert_eq!(queue.flush(), 2);
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert_eq!(queue.flush(), 0);
    }
}
