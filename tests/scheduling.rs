mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{Harness, Log, Slot};
use spark_reconciler::{
    host, text, Component, Lanes, Node, NodeRef, ReconcileError, ReconcilerConfig, Root, RootExitStatus, Scheduler,
    SchedulerPriority, SetState, StartTransition,
};

fn counter(name: &'static str, log: Log, setter: Slot<SetState<i32>>) -> Component {
    Component::new(name, move |cx, _props| {
        let (count, set) = cx.use_state(|| 0);
        setter.put(set);
        log.push(format!("{name} {count}"));
        Ok(host("count").child(text(count.to_string())).build())
    })
}

fn two_counters(h: &Harness, log: &Log) -> (Slot<SetState<i32>>, Slot<SetState<i32>>) {
    let (set_a, set_b) = (Slot::default(), Slot::default());
    let a = counter("A", log.clone(), set_a.clone());
    let b = counter("B", log.clone(), set_b.clone());
    h.render(host("row").child(a.element().key("a")).child(b.element().key("b")));
    log.take();
    (set_a, set_b)
}

#[test]
fn test_default_update_yields_between_slices() {
    let h = Harness::new();
    let log = Log::default();
    let (set_a, _) = two_counters(&h, &log);
    h.scheduler.set_units_per_slice(Some(2));

    set_a.get().set(1);
    assert_eq!(h.root.pending_lanes(), Lanes::DEFAULT);
    assert_eq!(h.scheduler.pending_priorities(), vec![SchedulerPriority::Normal]);

    assert!(h.scheduler.run_next());
    assert_eq!(h.root.exit_status(), RootExitStatus::Incomplete);
    assert_eq!(h.scheduler.pending(), 1);
    assert_eq!(h.markup(), "<row><count>0</count><count>0</count></row>");

    h.settle();

    assert_eq!(h.root.exit_status(), RootExitStatus::Completed);
    assert_eq!(h.markup(), "<row><count>1</count><count>0</count></row>");
    assert_eq!(log.take(), vec!["A 1"]);
}

#[test]
fn test_disabled_time_slicing_renders_in_one_task() {
    let h = Harness::with_config(ReconcilerConfig::new().with_time_slicing(false));
    let log = Log::default();
    let (set_a, _) = two_counters(&h, &log);
    h.scheduler.set_units_per_slice(Some(1));

    set_a.get().set(7);
    assert!(h.scheduler.run_next());

    assert_eq!(h.root.exit_status(), RootExitStatus::Completed);
    assert_eq!(h.markup(), "<row><count>7</count><count>0</count></row>");
}

#[test]
fn test_sync_update_preempts_default_render() {
    let h = Harness::new();
    let log = Log::default();
    let (set_a, set_b) = two_counters(&h, &log);
    h.scheduler.set_units_per_slice(Some(1));

    set_a.get().set(1);
    assert!(h.scheduler.run_next());
    assert_eq!(h.root.exit_status(), RootExitStatus::Incomplete);

    let set_b = set_b.get();
    h.scheduler.run_with_priority(SchedulerPriority::Immediate, &mut || set_b.set(1));
    assert_eq!(h.root.pending_lanes(), Lanes::SYNC | Lanes::DEFAULT);

    // The half-built default render's callback was cancelled.
    assert_eq!(h.scheduler.pending(), 0);

    h.host.run_microtasks();
    assert_eq!(h.markup(), "<row><count>0</count><count>1</count></row>");
    assert_eq!(h.root.last_commit().map(|c| c.lane), Some(Lanes::SYNC));
    assert_eq!(h.root.pending_lanes(), Lanes::DEFAULT);

    h.settle();

    assert_eq!(h.markup(), "<row><count>1</count><count>1</count></row>");
    assert_eq!(h.root.last_commit().map(|c| c.lane), Some(Lanes::DEFAULT));
    assert!(h.root.pending_lanes().is_empty());
}

#[test]
fn test_transition_commits_pending_flag_before_new_value() {
    let h = Harness::new();
    let starter: Slot<StartTransition> = Slot::default();
    let set_tab: Slot<SetState<&'static str>> = Slot::default();
    let tabs = {
        let (starter, set_tab) = (starter.clone(), set_tab.clone());
        Component::new("Tabs", move |cx, _props| {
            let (pending, start) = cx.use_transition();
            let (tab, set) = cx.use_state(|| "home");
            starter.put(start);
            set_tab.put(set);
            let label = if pending { format!("{tab} (loading)") } else { tab.to_string() };
            Ok(text(label))
        })
    };
    h.render(tabs.element());
    assert_eq!(h.markup(), "home");

    let set = set_tab.get();
    starter.get().start(move || set.set("settings"));
    assert_eq!(h.root.pending_lanes(), Lanes::DEFAULT | Lanes::TRANSITION);

    assert!(h.scheduler.run_next());
    assert_eq!(h.markup(), "home (loading)");
    assert_eq!(h.root.pending_lanes(), Lanes::TRANSITION);

    h.settle();

    assert_eq!(h.markup(), "settings");
    assert_eq!(h.root.last_commit().map(|c| c.lane), Some(Lanes::TRANSITION));
}

#[test]
fn test_update_inside_start_transition_uses_transition_lane() {
    let h = Harness::new();
    let log = Log::default();
    let (set_a, _) = two_counters(&h, &log);

    spark_reconciler::start_transition(|| set_a.get().set(2));

    assert_eq!(h.root.pending_lanes(), Lanes::TRANSITION);
    h.settle();
    assert_eq!(h.markup(), "<row><count>2</count><count>0</count></row>");
}

/// A tree whose callback ref renders a fresh copy of itself on every attach.
fn self_rendering(root: Root, attaches: Rc<Cell<usize>>) -> Node {
    let node_ref = {
        let attaches = attaches.clone();
        NodeRef::callback(move |handle| {
            if handle.is_some() {
                attaches.set(attaches.get() + 1);
                root.render(self_rendering(root.clone(), attaches.clone()));
            }
        })
    };
    host("input").node_ref(node_ref).build()
}

#[test]
fn test_runaway_sync_updates_are_cut_off() {
    let h = Harness::with_config(ReconcilerConfig::new().with_max_render_retries(3));
    let attaches = Rc::new(Cell::new(0));

    h.render(self_rendering(h.root.clone(), attaches.clone()));

    assert_eq!(attaches.get(), 4);
    assert_eq!(h.root.take_errors(), vec![ReconcileError::NestedUpdateLimit(3)]);
    assert!(h.root.pending_lanes().is_empty());
    assert_eq!(h.markup(), "<input></input>");
}

#[test]
fn test_arena_does_not_grow_across_renders() {
    let h = Harness::new();
    let tree = |round: usize| {
        host("list").children((0..3).map(|i| host("item").key(i.to_string()).child(text(format!("{round}-{i}"))))).build()
    };

    for round in 0..5 {
        h.render(tree(round));
    }
    let settled = h.root.node_count();
    for round in 5..25 {
        h.render(tree(round));
    }

    assert_eq!(h.root.node_count(), settled);
    assert!(settled <= 16, "two buffers of eight nodes at most, got {settled}");
    assert_eq!(h.markup(), "<list><item>24-0</item><item>24-1</item><item>24-2</item></list>");
}
