//! Reconcile - Per-node render work.
//!
//! - [`begin_work`] renders a node and diffs its children (`child`)
//! - [`complete_work`] realizes host instances and bubbles flags and lanes
//!
//! Both run on work-in-progress nodes only; the committed tree is read,
//! never written, apart from lanes consumed by hook bailouts.

mod begin;
mod child;
mod complete;

pub(crate) use begin::begin_work;
pub(crate) use complete::complete_work;
