//! # spark-reconciler
//!
//! Incremental reconciliation and priority scheduling for component trees.
//!
//! A caller describes the desired UI as an immutable intent tree ([`Node`]).
//! The reconciler diffs it against the tree it committed last, computes the
//! minimal set of host mutations, and applies them through a [`HostConfig`].
//! Work is split into small units so an external [`Scheduler`] can
//! interleave it with more urgent work.
//!
//! ## Architecture
//!
//! Every tree position exists as up to two nodes (current and
//! work-in-progress) living in one arena. A render walks the
//! work-in-progress buffer depth-first:
//! ```text
//! Root::render → update queue → begin/complete per node → commit → deferred effects
//!                     ↑                    │
//!               lanes (priority)    suspend / fail → unwind to boundary
//! ```
//!
//! The commit is synchronous and runs in three passes: mutation, reference
//! binding, then deferred effects scheduled as a separate task.
//!
//! ## Modules
//!
//! - [`types`] - Intent tree, elements, props, components, refs
//! - [`lanes`] - Priority classes as bit sets
//! - [`scheduler`] - External scheduler contract and a manual implementation
//! - [`host`] - Host tree contract and an in-memory implementation
//! - [`hooks`] - Per-node state cells, effects and context reads
//! - [`context`] - Provider/consumer values scoped to subtrees
//! - [`suspense`] - Awaitables, lazy components, throw and unwind
//! - [`root`] - Creating, rendering and unmounting trees

pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod host;
pub mod lanes;
pub mod root;
pub mod scheduler;
pub mod suspense;
pub mod types;
pub mod update_queue;

pub(crate) mod commit;
pub(crate) mod fiber;
pub(crate) mod reconcile;
pub(crate) mod work_loop;

// Re-export commonly used items
pub use types::*;

pub use commit::CommitSummary;
pub use config::ReconcilerConfig;
pub use context::Context;
pub use error::{Interrupt, Outcome, ReconcileError};
pub use hooks::{Cleanup, Dispatch, HookAction, RenderCx, SetState, StartTransition};
pub use host::{HostConfig, HostOp, MemoryHost};
pub use lanes::{Lane, Lanes};
pub use root::{Reconciler, Root};
pub use scheduler::{CallbackToken, ManualScheduler, Scheduler, SchedulerPriority, SchedulerTask};
pub use suspense::{lazy, Awaitable, LazyComponent, SuspendedReason, Thenable, ThenableStatus, Wakeable};
pub use work_loop::{start_transition, RootExitStatus};
