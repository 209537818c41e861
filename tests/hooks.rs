mod common;

use common::{Harness, Log, Slot};
use spark_reconciler::{
    host, memo, start_transition, text, Component, Context, HostOp, Lanes, Node, NodeRef, ReconcileError,
    RootExitStatus, Scheduler, SchedulerPriority, SetState,
};

fn counter(name: &'static str, log: Log, setter: Slot<SetState<i32>>) -> Component {
    Component::new(name, move |cx, _props| {
        let (count, set) = cx.use_state(|| 0);
        setter.put(set);
        log.push(format!("{name} {count}"));
        Ok(host("count").child(text(count.to_string())).build())
    })
}

#[test]
fn test_state_update_rerenders_component() {
    let h = Harness::new();
    let log = Log::default();
    let setter = Slot::default();
    h.render(counter("Counter", log.clone(), setter.clone()).element());
    assert_eq!(h.markup(), "<count>0</count>");

    setter.get().set(3);
    h.settle();

    assert_eq!(h.markup(), "<count>3</count>");
    assert_eq!(log.take(), vec!["Counter 0", "Counter 3"]);
}

#[test]
fn test_functional_updates_apply_in_order() {
    let h = Harness::new();
    let setter = Slot::default();
    h.render(counter("Counter", Log::default(), setter.clone()).element());

    let set = setter.get();
    set.update(|n| n + 1);
    set.update(|n| n * 10);
    set.update(|n| n + 2);
    h.settle();

    assert_eq!(h.markup(), "<count>12</count>");
}

#[test]
fn test_setting_same_state_schedules_nothing() {
    let h = Harness::new();
    let log = Log::default();
    let setter = Slot::default();
    h.render(counter("Counter", log.clone(), setter.clone()).element());
    log.take();

    setter.get().set(0);

    assert_eq!(h.scheduler.pending(), 0);
    assert_eq!(h.host.pending_microtasks(), 0);
    h.settle();
    assert!(log.take().is_empty());
}

#[test]
fn test_update_only_renders_the_updated_sibling() {
    let h = Harness::new();
    let log = Log::default();
    let set_a = Slot::default();
    let a = counter("A", log.clone(), set_a.clone());
    let b = counter("B", log.clone(), Slot::default());
    h.render(host("row").child(a.element().key("a")).child(b.element().key("b")));
    assert_eq!(log.take(), vec!["A 0", "B 0"]);

    let row = h.host.children(h.root.container())[0];
    let counts = h.host.children(row);
    let (count_a, count_b) = (counts[0], counts[1]);
    let (text_a, text_b) = (h.host.children(count_a)[0], h.host.children(count_b)[0]);
    h.host.take_ops();

    set_a.get().set(1);
    h.settle();

    assert_eq!(log.take(), vec!["A 1"]);
    assert_eq!(h.markup(), "<row><count>1</count><count>0</count></row>");
    assert_eq!(h.host.take_ops(), vec![HostOp::UpdateText(text_a, String::from("1"))]);
    assert_eq!(h.host.children(row), vec![count_a, count_b]);
    assert_eq!(h.host.children(count_b), vec![text_b]);
}

#[test]
fn test_eager_update_rebases_onto_skipped_transition() {
    let h = Harness::new();
    let log = Log::default();
    let setter: Slot<SetState<i32>> = Slot::default();
    let counter = {
        let (log, setter) = (log.clone(), setter.clone());
        Component::new("Counter", move |cx, _props| {
            let (count, set) = cx.use_state(|| 1);
            setter.put(set);
            log.push(format!("Counter {count}"));
            Ok(text(count.to_string()))
        })
    };
    h.render(counter.element());
    log.take();
    let set = setter.get();

    // Idle node with an empty queue: this one takes the eager path.
    start_transition(|| set.update(|n| n + 1));
    h.scheduler.run_with_priority(SchedulerPriority::Immediate, &mut || set.update(|n| n * 10));

    h.host.run_microtasks();
    assert_eq!(h.markup(), "10");
    assert_eq!(h.root.pending_lanes(), Lanes::TRANSITION);

    h.settle();
    assert_eq!(h.markup(), "20");
    assert_eq!(log.take(), vec!["Counter 10", "Counter 20"]);

    set.update(|n| n + 5);
    h.settle();
    assert_eq!(h.markup(), "25");
    assert_eq!(log.take(), vec!["Counter 25"]);
}

#[test]
fn test_teardowns_run_before_setups() {
    let h = Harness::new();
    let log = Log::default();
    let effectful = {
        let log = log.clone();
        Component::new("Effectful", move |cx, props| {
            let name = props.str("name").unwrap_or_default().to_string();
            let dep = props.int("dep").unwrap_or_default();
            let log = log.clone();
            cx.use_effect_with(dep, move || {
                log.push(format!("setup {name}{dep}"));
                Some(Box::new(move || log.push(format!("cleanup {name}{dep}"))))
            });
            Ok(Node::Empty)
        })
    };
    let tree = |items: &[(&str, i64)]| {
        host("row")
            .children(items.iter().map(|(name, dep)| effectful.element().key(*name).attr("name", *name).attr("dep", *dep)))
            .build()
    };

    h.render(tree(&[("a", 0), ("b", 0)]));
    assert_eq!(log.take(), vec!["setup a0", "setup b0"]);

    h.render(tree(&[("a", 1), ("b", 1)]));
    assert_eq!(log.take(), vec!["cleanup a0", "cleanup b0", "setup a1", "setup b1"]);

    h.render(tree(&[("b", 2)]));
    assert_eq!(log.take(), vec!["cleanup a1", "cleanup b1", "setup b2"]);

    h.render(tree(&[("b", 2)]));
    assert!(log.take().is_empty());

    h.root.unmount();
    assert_eq!(log.take(), vec!["cleanup b2"]);
}

#[test]
fn test_memo_skips_render_for_equal_props() {
    let h = Harness::new();
    let log = Log::default();
    let child = {
        let log = log.clone();
        memo(Component::new("Label", move |_cx, props| {
            let label = props.str("label").unwrap_or_default().to_string();
            log.push(format!("Label {label}"));
            Ok(text(label))
        }))
    };
    let setter: Slot<SetState<i32>> = Slot::default();
    let parent = {
        let (log, setter) = (log.clone(), setter.clone());
        Component::new("Parent", move |cx, _props| {
            let (count, set) = cx.use_state(|| 0);
            setter.put(set);
            log.push(format!("Parent {count}"));
            let label = if count < 2 { "fixed" } else { "changed" };
            Ok(host("box").child(child.element().attr("label", label)).build())
        })
    };

    h.render(parent.element());
    assert_eq!(log.take(), vec!["Parent 0", "Label fixed"]);

    setter.get().set(1);
    h.settle();
    assert_eq!(log.take(), vec!["Parent 1"]);

    setter.get().set(2);
    h.settle();
    assert_eq!(log.take(), vec!["Parent 2", "Label changed"]);
    assert_eq!(h.markup(), "<box>changed</box>");
}

#[test]
fn test_context_change_reaches_consumer_below_bailout() {
    let h = Harness::new();
    let log = Log::default();
    let theme = Context::new("theme", String::from("light"));

    let consumer = {
        let (log, theme) = (log.clone(), theme.clone());
        Component::new("Consumer", move |cx, _props| {
            let value = cx.use_context(&theme);
            log.push(format!("Consumer {value}"));
            Ok(text(value))
        })
    };
    let middle = {
        let log = log.clone();
        let inner: Node = consumer.element().build();
        Component::new("Middle", move |_cx, _props| {
            log.push("Middle");
            Ok(host("panel").child(inner.clone()).build())
        })
    };
    let middle_node: Node = middle.element().build();
    let setter: Slot<SetState<String>> = Slot::default();
    let app = {
        let (theme, setter) = (theme.clone(), setter.clone());
        Component::new("App", move |cx, _props| {
            let (value, set) = cx.use_state(|| String::from("dark"));
            setter.put(set);
            Ok(theme.provider(value).child(middle_node.clone()).build())
        })
    };

    h.render(host("root").child(text("outside:")).child(consumer.element()).child(app.element()));
    assert_eq!(log.take(), vec!["Consumer light", "Middle", "Consumer dark"]);
    assert_eq!(h.markup(), "<root>outside:light<panel>dark</panel></root>");

    setter.get().set(String::from("sepia"));
    h.settle();

    assert_eq!(log.take(), vec!["Consumer sepia"]);
    assert_eq!(h.markup(), "<root>outside:light<panel>sepia</panel></root>");
}

#[test]
fn test_object_ref_follows_mount_and_unmount() {
    let h = Harness::new();
    let node_ref = NodeRef::object();
    h.render(host("row").child(host("input").node_ref(node_ref.clone())));
    let row = h.host.children(h.root.container())[0];
    let input = h.host.children(row)[0];
    assert_eq!(node_ref.current(), Some(input));

    h.render(host("row"));

    assert_eq!(node_ref.current(), None);
}

#[test]
fn test_callback_ref_is_swapped_when_replaced() {
    let h = Harness::new();
    let log = Log::default();
    let make_ref = |name: &'static str| {
        let log = log.clone();
        NodeRef::callback(move |handle| log.push(format!("{name} {}", if handle.is_some() { "attach" } else { "detach" })))
    };

    h.render(host("input").node_ref(make_ref("first")));
    assert_eq!(log.take(), vec!["first attach"]);

    h.render(host("input").node_ref(make_ref("second")));
    assert_eq!(log.take(), vec!["first detach", "second attach"]);
}

#[test]
fn test_hook_count_change_is_fatal() {
    let h = Harness::new();
    let unstable = Component::new("Unstable", |cx, props| {
        let (_a, _) = cx.use_state(|| 1);
        if props.int("hooks") == Some(2) {
            let (_b, _) = cx.use_state(|| 2);
        }
        Ok(text("ok"))
    });
    let tree = |hooks: i64| {
        spark_reconciler::error_boundary(|_| text("fallback")).child(unstable.element().attr("hooks", hooks)).build()
    };

    h.render(tree(1));
    assert_eq!(h.markup(), "ok");

    h.render(tree(2));

    assert_eq!(h.root.exit_status(), RootExitStatus::Errored);
    assert!(matches!(
        h.root.take_errors().as_slice(),
        [ReconcileError::HookCountMismatch { expected: 1, actual: 2, .. }]
    ));
    assert_eq!(h.markup(), "ok");
}

#[test]
fn test_state_slot_changing_type_is_fatal() {
    let h = Harness::new();
    let shifty = Component::new("Shifty", |cx, props| {
        if props.int("mode") == Some(1) {
            let (n, _) = cx.use_state(|| 1_i64);
            Ok(text(n.to_string()))
        } else {
            let (s, _) = cx.use_state(|| String::from("s"));
            Ok(text(s))
        }
    });

    h.render(shifty.element().attr("mode", 1));
    assert_eq!(h.markup(), "1");

    h.render(shifty.element().attr("mode", 2));

    assert_eq!(h.root.exit_status(), RootExitStatus::Errored);
    assert!(matches!(
        h.root.take_errors().as_slice(),
        [ReconcileError::HookKindMismatch { index: 0, expected: "state", .. }]
    ));
    assert_eq!(h.markup(), "1");
}
