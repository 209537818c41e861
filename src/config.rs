//! Reconciler configuration.

use crate::scheduler::SchedulerPriority;

/// Knobs shared by every root created from one `Reconciler`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// When false, non-sync lanes render to completion without polling `should_yield`.
    pub time_slicing: bool,
    /// Priority of the task that flushes deferred effects after a commit.
    pub passive_effect_priority: SchedulerPriority,
    /// Log a warning when a dispatcher targets a node that is no longer mounted.
    pub warn_on_unmounted_update: bool,
    /// Consecutive synchronous commits that may schedule more sync work before
    /// the loop is broken.
    pub max_render_retries: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            time_slicing: true,
            passive_effect_priority: SchedulerPriority::Normal,
            warn_on_unmounted_update: true,
            max_render_retries: 50,
        }
    }
}

impl ReconcilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_slicing(mut self, enabled: bool) -> Self {
        self.time_slicing = enabled;
        self
    }

    pub fn with_passive_effect_priority(mut self, priority: SchedulerPriority) -> Self {
        self.passive_effect_priority = priority;
        self
    }

    pub fn with_warn_on_unmounted_update(mut self, enabled: bool) -> Self {
        self.warn_on_unmounted_update = enabled;
        self
    }

    pub fn with_max_render_retries(mut self, retries: usize) -> Self {
        self.max_render_retries = retries;
        self
    }
}
