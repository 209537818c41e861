//! Deferred effects: queued by commit, flushed by a scheduler task.
//!
//! Flush order: every teardown of deleted nodes, then teardowns of changed
//! effects, then their setups. Effects run outside the engine lock so they
//! may dispatch updates freely.

use crate::scheduler::SchedulerTask;
use crate::work_loop::{RootShared, WorkCx};

/// Queue one flush task for the root's pending effects.
pub(super) fn schedule_passive_flush(cx: &mut WorkCx<'_>) {
    if cx.root.has_scheduled_passive {
        return;
    }
    cx.root.has_scheduled_passive = true;
    let weak = cx.shared.weak();
    let priority = cx.shared.config.passive_effect_priority;
    cx.shared.scheduler.schedule_callback(
        priority,
        SchedulerTask::new(move |_| {
            if let Some(shared) = weak.upgrade() {
                flush_passive_effects(&shared);
            }
            None
        }),
    );
}

/// Run every pending deferred effect of the root. Returns true if any were pending.
pub(crate) fn flush_passive_effects(shared: &RootShared) -> bool {
    let pending = shared.with_engine(|cx| {
        cx.root.has_scheduled_passive = false;
        std::mem::take(&mut cx.root.pending_passive)
    });
    let Some(pending) = pending.filter(|p| !p.is_empty()) else {
        return false;
    };

    tracing::trace!(unmount = pending.unmount.len(), update = pending.update.len(), "flushing deferred effects");
    for effect in &pending.unmount {
        effect.run_teardown();
    }
    for effect in pending.update.iter().filter(|e| e.has_effect()) {
        effect.run_teardown();
    }
    for effect in pending.update.iter().filter(|e| e.has_effect()) {
        effect.run_setup();
    }

    // Updates dispatched from effects at sync priority are flushed here.
    shared.sync_queue.flush();
    true
}
