//! Per-render state, reset before every fresh render.

use crate::context::ProviderStack;
use crate::error::ReconcileError;
use crate::fiber::NodeId;
use crate::lanes::{Lane, Lanes, NO_LANE};
use crate::suspense::SuspendedReason;

/// How the last render of a root ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootExitStatus {
    /// Nothing rendered yet.
    #[default]
    Idle,
    InProgress,
    /// Yielded to the scheduler; will resume.
    Incomplete,
    /// Finished and committed.
    Completed,
    /// Suspended with no boundary to show a fallback; nothing committed.
    DidNotComplete,
    /// Failed with no boundary to capture the error; nothing committed.
    Errored,
}

#[derive(Default)]
pub(crate) struct RenderSession {
    /// Host root of the tree being rendered.
    pub wip_root: Option<NodeId>,
    /// Next unit of work.
    pub work_in_progress: Option<NodeId>,
    pub render_lane: Lane,
    /// Lanes updated while this render was in progress.
    pub interleaved_lanes: Lanes,
    pub exit_status: RootExitStatus,
    pub suspended_reason: Option<SuspendedReason>,
    pub fatal_error: Option<ReconcileError>,

    pub providers: ProviderStack,
    /// Suspense boundaries currently rendering primary content, innermost last.
    pub suspense_handlers: Vec<NodeId>,
    /// Error boundaries currently rendering children, innermost last.
    pub error_boundaries: Vec<NodeId>,
    /// A boundary switched to its fallback during this render.
    pub showed_fallback: bool,
    /// Set while beginning a node whose input changed.
    pub did_receive_update: bool,
}

impl RenderSession {
    pub fn reset(&mut self) {
        *self = RenderSession { render_lane: NO_LANE, ..RenderSession::default() };
    }

    pub fn push_suspense_handler(&mut self, boundary: NodeId) {
        self.suspense_handlers.push(boundary);
    }

    pub fn pop_suspense_handler(&mut self, boundary: NodeId) {
        if self.suspense_handlers.last() == Some(&boundary) {
            self.suspense_handlers.pop();
        }
    }

    pub fn push_error_boundary(&mut self, boundary: NodeId) {
        self.error_boundaries.push(boundary);
    }

    pub fn pop_error_boundary(&mut self, boundary: NodeId) {
        if self.error_boundaries.last() == Some(&boundary) {
            self.error_boundaries.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::{create_host_root_fiber, FiberArena};
    use crate::lanes::Lanes;

    #[test]
    fn test_pop_ignores_non_top_entries() {
        let mut arena = FiberArena::new();
        let (a, b) = (arena.insert(create_host_root_fiber()), arena.insert(create_host_root_fiber()));
        let mut session = RenderSession::default();
        session.push_suspense_handler(a);
        session.push_suspense_handler(b);
        session.pop_suspense_handler(a);
        assert_eq!(session.suspense_handlers, vec![a, b]);
        session.pop_suspense_handler(b);
        assert_eq!(session.suspense_handlers, vec![a]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = RenderSession {
            render_lane: Lanes::DEFAULT,
            showed_fallback: true,
            exit_status: RootExitStatus::Incomplete,
            ..RenderSession::default()
        };
        session.reset();
        assert_eq!(session.render_lane, NO_LANE);
        assert!(!session.showed_fallback);
        assert_eq!(session.exit_status, RootExitStatus::Idle);
    }
}
