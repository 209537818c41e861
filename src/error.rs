//! Errors and the non-local exits a render step can take.
//!
//! A component render returns [`Outcome<T>`]. `Ok` carries the value; `Err`
//! carries an [`Interrupt`], which is either a suspension (recoverable by
//! the nearest suspense boundary) or a genuine failure.

use thiserror::Error;

use crate::suspense::Suspension;

/// Failures surfaced by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("component `{component}` rendered {actual} hooks, expected {expected}")]
    HookCountMismatch { component: String, expected: usize, actual: usize },

    #[error("component `{component}` called {actual} at hook #{index}, previously {expected}")]
    HookKindMismatch { component: String, index: usize, expected: &'static str, actual: &'static str },

    #[error("awaitable rejected: {0}")]
    Rejected(String),

    #[error("component failed: {0}")]
    Component(String),

    #[error("no host parent found above node `{0}`")]
    MissingHostParent(String),

    #[error("maximum update depth exceeded after {0} nested synchronous commits")]
    NestedUpdateLimit(usize),
}

impl ReconcileError {
    /// Internal invariant violations. These abort the render and skip error boundaries.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReconcileError::HookCountMismatch { .. } | ReconcileError::HookKindMismatch { .. })
    }
}

/// Why a render step stopped before producing a value.
#[derive(Debug, Clone)]
pub enum Interrupt {
    /// A descendant is waiting on an awaitable.
    Suspended(Suspension),
    /// A genuine failure.
    Failed(ReconcileError),
}

impl From<ReconcileError> for Interrupt {
    fn from(error: ReconcileError) -> Self {
        Interrupt::Failed(error)
    }
}

impl From<Suspension> for Interrupt {
    fn from(suspension: Suspension) -> Self {
        Interrupt::Suspended(suspension)
    }
}

/// Result of a render step.
pub type Outcome<T> = Result<T, Interrupt>;

/// Convenience for components: fail the render with a message.
pub fn fail<T>(message: impl Into<String>) -> Outcome<T> {
    Err(Interrupt::Failed(ReconcileError::Component(message.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let count = ReconcileError::HookCountMismatch { component: "A".into(), expected: 2, actual: 1 };
        assert!(count.is_fatal());
        assert!(!ReconcileError::Component("boom".into()).is_fatal());
        assert!(!ReconcileError::Rejected("io".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = ReconcileError::HookKindMismatch {
            component: "Counter".into(),
            index: 1,
            expected: "use_state",
            actual: "use_effect",
        };
        assert_eq!(err.to_string(), "component `Counter` called use_effect at hook #1, previously use_state");
    }

    #[test]
    fn test_fail_helper() {
        let out: Outcome<()> = fail("bad input");
        assert!(matches!(out, Err(Interrupt::Failed(ReconcileError::Component(m))) if m == "bad input"));
    }
}
