//! Update Queue - Per-node pending changes with priority-aware folding.
//!
//! A queue has two halves:
//! - the *shared* pending list, reachable from dispatchers and from both
//!   buffers (`Rc<RefCell<SharedQueue>>`), where new updates land in O(1)
//! - the *base* list owned by one buffer: updates skipped by earlier renders
//!   that must be replayed from `base_state`
//!
//! Rendering first moves the pending list into the current buffer's base
//! list (so an abandoned render loses nothing), then folds it with
//! [`process_update_queue`]. Lanes are merged onto the node by the scheduling
//! path (`mark_update_lane_from_fiber_to_root`), not here.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::lanes::{is_subset_of_lanes, Lane, Lanes, NO_LANE};

// =============================================================================
// Types
// =============================================================================

/// An intent to change state at one lane.
#[derive(Clone)]
pub struct Update<S, A> {
    pub action: A,
    pub lane: Lane,
    /// Result computed at dispatch time against `last_rendered_state`.
    pub eager_state: Option<S>,
}

impl<S, A> Update<S, A> {
    pub fn new(action: A, lane: Lane) -> Self {
        Self { action, lane, eager_state: None }
    }
}

/// Pending half of a queue.
pub struct SharedQueue<S, A> {
    pub pending: VecDeque<Update<S, A>>,
    /// State produced by the last completed render, for the eager path.
    pub last_rendered_state: Option<S>,
}

impl<S, A> Default for SharedQueue<S, A> {
    fn default() -> Self {
        Self { pending: VecDeque::new(), last_rendered_state: None }
    }
}

pub type SharedQueueRef<S, A> = Rc<RefCell<SharedQueue<S, A>>>;

/// Queue state memoized on one buffer.
#[derive(Clone)]
pub struct QueueState<S, A> {
    pub memoized_state: S,
    pub base_state: S,
    pub base_queue: Vec<Update<S, A>>,
    pub shared: SharedQueueRef<S, A>,
}

impl<S: Clone, A> QueueState<S, A> {
    pub fn new(initial: S) -> Self {
        Self {
            memoized_state: initial.clone(),
            base_state: initial,
            base_queue: Vec::new(),
            shared: Rc::new(RefCell::new(SharedQueue::default())),
        }
    }
}

/// Output of one fold.
pub struct ProcessedQueue<S, A> {
    pub memoized_state: S,
    /// State before the first skipped update (or the final state if none was skipped).
    pub base_state: S,
    /// Skipped updates plus every update after the first skip.
    pub base_queue: Vec<Update<S, A>>,
}

// =============================================================================
// Operations
// =============================================================================

/// Append `update` to the pending list.
pub fn enqueue_update<S, A>(shared: &SharedQueueRef<S, A>, update: Update<S, A>) {
    shared.borrow_mut().pending.push_back(update);
}

/// Move the pending list onto the end of `state.base_queue`.
pub fn merge_pending_into_base<S, A>(state: &mut QueueState<S, A>) {
    let pending = std::mem::take(&mut state.shared.borrow_mut().pending);
    state.base_queue.extend(pending);
}

/// Fold `updates` over `base_state` for the lanes in `render_lanes`.
///
/// Updates outside `render_lanes` are skipped and carried over; `on_skipped`
/// receives each skipped lane. Once something was skipped, every later update
/// is carried over too (retagged `NO_LANE` when it was applied), so a replay
/// from the returned base reproduces the same order.
pub fn process_update_queue<S: Clone, A: Clone>(
    base_state: S,
    updates: &[Update<S, A>],
    render_lanes: Lanes,
    mut reduce: impl FnMut(&S, &A) -> S,
    mut on_skipped: impl FnMut(Lane),
) -> ProcessedQueue<S, A> {
    let mut new_state = base_state;
    let mut new_base_state: Option<S> = None;
    let mut new_base_queue: Vec<Update<S, A>> = Vec::new();

    for update in updates {
        if !is_subset_of_lanes(render_lanes, update.lane) {
            if new_base_queue.is_empty() {
                new_base_state = Some(new_state.clone());
            }
            new_base_queue.push(update.clone());
            on_skipped(update.lane);
            continue;
        }

        if !new_base_queue.is_empty() {
            let mut carried = update.clone();
            carried.lane = NO_LANE;
            new_base_queue.push(carried);
        }
        new_state = match &update.eager_state {
            Some(eager) => eager.clone(),
            None => reduce(&new_state, &update.action),
        };
    }

    let base_state = new_base_state.unwrap_or_else(|| new_state.clone());
    ProcessedQueue { memoized_state: new_state, base_state, base_queue: new_base_queue }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum Op {
        Add(i32),
        Mul(i32),
    }

    fn apply(state: &i32, op: &Op) -> i32 {
        match op {
            Op::Add(n) => state + n,
            Op::Mul(n) => state * n,
        }
    }

    #[test]
    fn test_all_updates_applied_at_matching_lane() {
        let updates = vec![Update::new(Op::Add(1), Lanes::SYNC), Update::new(Op::Mul(3), Lanes::SYNC)];
        let out = process_update_queue(1, &updates, Lanes::SYNC, apply, |_| panic!("nothing skipped"));
        assert_eq!(out.memoized_state, 6);
        assert_eq!(out.base_state, 6);
        assert!(out.base_queue.is_empty());
    }

    #[test]
    fn test_skipped_update_rebases_following_updates() {
        let updates = vec![
            Update::new(Op::Add(1), Lanes::SYNC),
            Update::new(Op::Add(10), Lanes::TRANSITION),
            Update::new(Op::Mul(2), Lanes::SYNC),
        ];
        let mut skipped = Vec::new();
        let out = process_update_queue(0, &updates, Lanes::SYNC, apply, |lane| skipped.push(lane));

        // 0 + 1, skip +10, * 2
        assert_eq!(out.memoized_state, 2);
        assert_eq!(out.base_state, 1);
        assert_eq!(skipped, vec![Lanes::TRANSITION]);
        assert_eq!(out.base_queue.len(), 2);
        assert_eq!(out.base_queue[1].lane, NO_LANE);

        // Replay at the transition lane: (1 + 10) * 2, nothing skipped since NO_LANE always applies.
        let replay = process_update_queue(out.base_state, &out.base_queue, Lanes::TRANSITION, apply, |_| {
            panic!("nothing skipped")
        });
        assert_eq!(replay.memoized_state, 22);
        assert!(replay.base_queue.is_empty());
    }

    #[test]
    fn test_eager_state_is_used_verbatim() {
        let mut update = Update::new(Op::Add(1), Lanes::DEFAULT);
        update.eager_state = Some(100);
        let out = process_update_queue(0, &[update], Lanes::DEFAULT, apply, |_| {});
        assert_eq!(out.memoized_state, 100);
    }

    #[test]
    fn test_merge_pending_moves_into_base() {
        let mut state: QueueState<i32, Op> = QueueState::new(0);
        enqueue_update(&state.shared, Update::new(Op::Add(1), Lanes::DEFAULT));
        enqueue_update(&state.shared, Update::new(Op::Add(2), Lanes::DEFAULT));
        merge_pending_into_base(&mut state);
        assert!(state.shared.borrow().pending.is_empty());
        assert_eq!(state.base_queue.len(), 2);
        assert_eq!(state.base_queue[1].action, Op::Add(2));
    }
}
