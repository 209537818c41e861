//! Lanes - Priority classes as bitset arithmetic.
//!
//! Every update is tagged with exactly one lane. Sets of lanes (`Lanes`) are
//! merged as work bubbles toward the root, and the work loop always services
//! the lowest set bit first (lower bits are more urgent).
//!
//! - Lane algebra (merge, remove, subset, intersection)
//! - Highest-priority extraction
//! - Mapping to and from the external scheduler's priority levels
//! - Root bookkeeping: pending, suspended and pinged lanes
//!
//! # Example
//!
//! ```ignore
//! use spark_reconciler::lanes::*;
//!
//! let set = merge_lanes(Lanes::DEFAULT, Lanes::SYNC);
//! assert_eq!(get_highest_priority_lane(set), Lanes::SYNC);
//! assert!(is_subset_of_lanes(set, Lanes::DEFAULT));
//! ```

use crate::scheduler::SchedulerPriority;

// =============================================================================
// Lane Bits
// =============================================================================

bitflags::bitflags! {
    /// A set of priority classes. A single-bit value is one lane.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        /// Discrete user input and `Root::render`. Flushed in a microtask.
        const SYNC = 0b00001;
        /// Continuous input (drag, scroll).
        const INPUT_CONTINUOUS = 0b00010;
        /// Ordinary updates outside any event.
        const DEFAULT = 0b00100;
        /// Updates issued inside `StartTransition::start`.
        const TRANSITION = 0b01000;
        /// Background work.
        const IDLE = 0b10000;
    }
}

/// One lane. Kept as an alias so signatures say which of the two they mean.
pub type Lane = Lanes;

pub const NO_LANE: Lane = Lanes::empty();
pub const NO_LANES: Lanes = Lanes::empty();

// =============================================================================
// Lane Algebra
// =============================================================================

/// Union of two lane sets.
pub fn merge_lanes(a: Lanes, b: Lanes) -> Lanes {
    a | b
}

/// `set` with every lane of `subset` cleared.
pub fn remove_lanes(set: Lanes, subset: Lanes) -> Lanes {
    set & !subset
}

/// True when the two sets share at least one lane.
pub fn include_some_lanes(a: Lanes, b: Lanes) -> bool {
    a.intersects(b)
}

/// True when every lane of `subset` is in `set`. The empty set is a subset of anything,
/// which is what lets re-tagged updates (`NO_LANE`) always apply.
pub fn is_subset_of_lanes(set: Lanes, subset: Lanes) -> bool {
    set.contains(subset)
}

/// The most urgent lane in `lanes`, or `NO_LANE` when empty.
pub fn get_highest_priority_lane(lanes: Lanes) -> Lane {
    let bits = lanes.bits();
    Lanes::from_bits_retain(bits & bits.wrapping_neg())
}

// =============================================================================
// Scheduler Mapping
// =============================================================================

/// Scheduler priority used when a root callback services `lanes`.
pub fn lanes_to_scheduler_priority(lanes: Lanes) -> SchedulerPriority {
    let lane = get_highest_priority_lane(lanes);
    if lane == Lanes::SYNC {
        SchedulerPriority::Immediate
    } else if lane == Lanes::INPUT_CONTINUOUS {
        SchedulerPriority::UserBlocking
    } else if lane == Lanes::DEFAULT {
        SchedulerPriority::Normal
    } else if lane == Lanes::TRANSITION {
        SchedulerPriority::Low
    } else {
        SchedulerPriority::Idle
    }
}

/// Lane assigned to an update dispatched while the scheduler runs at `priority`.
pub fn scheduler_priority_to_lane(priority: SchedulerPriority) -> Lane {
    match priority {
        SchedulerPriority::Immediate => Lanes::SYNC,
        SchedulerPriority::UserBlocking => Lanes::INPUT_CONTINUOUS,
        SchedulerPriority::Normal => Lanes::DEFAULT,
        SchedulerPriority::Low | SchedulerPriority::Idle => Lanes::IDLE,
    }
}

// =============================================================================
// Root Lanes
// =============================================================================

/// Lane bookkeeping owned by a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RootLanes {
    /// Lanes with outstanding work somewhere in the tree.
    pub pending: Lanes,
    /// Lanes whose last render could not finish and wait for a ping.
    pub suspended: Lanes,
    /// Suspended lanes whose awaitable has since settled.
    pub pinged: Lanes,
}

/// The lane the work loop should service next.
///
/// Suspended lanes are skipped unless they have been pinged.
pub fn get_next_lane(root: &RootLanes) -> Lane {
    let pending = root.pending;
    if pending.is_empty() {
        return NO_LANE;
    }

    let unblocked = remove_lanes(pending, root.suspended);
    if !unblocked.is_empty() {
        return get_highest_priority_lane(unblocked);
    }

    let pinged = pending & root.pinged;
    get_highest_priority_lane(pinged)
}

/// A new update at `lane` arrived.
///
/// Any non-idle update may unblock a previously suspended render, so the
/// suspended and pinged sets are cleared.
pub fn mark_root_updated(root: &mut RootLanes, lane: Lane) {
    root.pending = merge_lanes(root.pending, lane);
    if lane != Lanes::IDLE {
        root.suspended = NO_LANES;
        root.pinged = NO_LANES;
    }
}

/// A render at `lane` could not complete.
pub fn mark_root_suspended(root: &mut RootLanes, lane: Lane) {
    root.suspended = merge_lanes(root.suspended, lane);
    root.pinged = remove_lanes(root.pinged, lane);
}

/// An awaitable a render at `lane` was blocked on has settled.
pub fn mark_root_pinged(root: &mut RootLanes, lane: Lane) {
    root.pinged |= root.suspended & lane;
}

/// A commit finished; `remaining` is what the committed tree still needs.
pub fn mark_root_finished(root: &mut RootLanes, remaining: Lanes) {
    root.pending = remaining;
    root.suspended &= remaining;
    root.pinged &= remaining;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lanes() -> impl Strategy<Value = Lanes> {
        any::<u32>().prop_map(Lanes::from_bits_truncate)
    }

    fn lane() -> impl Strategy<Value = Lane> {
        prop_oneof![
            Just(Lanes::SYNC),
            Just(Lanes::INPUT_CONTINUOUS),
            Just(Lanes::DEFAULT),
            Just(Lanes::TRANSITION),
            Just(Lanes::IDLE),
        ]
    }

    proptest! {
        #[test]
        fn merge_is_commutative_and_keeps_both(base in lanes(), p in lane(), q in lane()) {
            let pq = merge_lanes(merge_lanes(base, p), q);
            let qp = merge_lanes(merge_lanes(base, q), p);
            prop_assert_eq!(pq, qp);
            prop_assert!(is_subset_of_lanes(pq, p));
            prop_assert!(is_subset_of_lanes(pq, q));
            prop_assert!(include_some_lanes(pq, p));
        }

        #[test]
        fn highest_priority_is_a_single_member(set in lanes()) {
            let highest = get_highest_priority_lane(set);
            if set.is_empty() {
                prop_assert_eq!(highest, NO_LANE);
            } else {
                prop_assert_eq!(highest.bits().count_ones(), 1);
                prop_assert!(set.contains(highest));
                prop_assert!(highest.bits() <= set.bits());
            }
        }

        #[test]
        fn remove_clears_only_the_subset(set in lanes(), sub in lanes()) {
            let rest = remove_lanes(set, sub);
            prop_assert!(!include_some_lanes(rest, sub));
            prop_assert_eq!(merge_lanes(rest, set & sub), set);
        }
    }

    #[test]
    fn test_no_lane_is_subset_of_everything() {
        assert!(is_subset_of_lanes(Lanes::SYNC, NO_LANE));
        assert!(is_subset_of_lanes(NO_LANES, NO_LANE));
    }

    #[test]
    fn test_scheduler_mapping() {
        assert_eq!(lanes_to_scheduler_priority(Lanes::SYNC | Lanes::DEFAULT), SchedulerPriority::Immediate);
        assert_eq!(lanes_to_scheduler_priority(Lanes::DEFAULT), SchedulerPriority::Normal);
        assert_eq!(scheduler_priority_to_lane(SchedulerPriority::UserBlocking), Lanes::INPUT_CONTINUOUS);
        assert_eq!(scheduler_priority_to_lane(SchedulerPriority::Low), Lanes::IDLE);
    }

    #[test]
    fn test_next_lane_skips_suspended_until_pinged() {
        let mut root = RootLanes::default();
        mark_root_updated(&mut root, Lanes::DEFAULT);
        assert_eq!(get_next_lane(&root), Lanes::DEFAULT);

        mark_root_suspended(&mut root, Lanes::DEFAULT);
        assert_eq!(get_next_lane(&root), NO_LANE);

        mark_root_pinged(&mut root, Lanes::DEFAULT);
        assert_eq!(get_next_lane(&root), Lanes::DEFAULT);
    }

    #[test]
    fn test_update_unblocks_suspended() {
        let mut root = RootLanes::default();
        mark_root_updated(&mut root, Lanes::TRANSITION);
        mark_root_suspended(&mut root, Lanes::TRANSITION);
        mark_root_updated(&mut root, Lanes::DEFAULT);
        assert_eq!(root.suspended, NO_LANES);
        assert_eq!(get_next_lane(&root), Lanes::DEFAULT);
    }

    #[test]
    fn test_finished_keeps_remaining() {
        let mut root = RootLanes::default();
        mark_root_updated(&mut root, Lanes::SYNC);
        mark_root_updated(&mut root, Lanes::DEFAULT);
        mark_root_finished(&mut root, Lanes::DEFAULT);
        assert_eq!(root.pending, Lanes::DEFAULT);
    }
}
