#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use spark_reconciler::{ManualScheduler, MemoryHost, Node, Reconciler, ReconcilerConfig, Root};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A root bound to an in-memory host and a manual scheduler.
pub struct Harness {
    pub host: Rc<MemoryHost>,
    pub scheduler: Rc<ManualScheduler>,
    pub root: Root,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        init_tracing();
        let host = Rc::new(MemoryHost::new());
        let scheduler = Rc::new(ManualScheduler::new());
        let reconciler = Reconciler::new(host.clone(), scheduler.clone()).with_config(config);
        let root = reconciler.create_root(host.create_container());
        Self { host, scheduler, root }
    }

    /// Render and run everything that becomes ready.
    pub fn render(&self, node: impl Into<Node>) {
        self.root.render(node);
        self.settle();
    }

    /// Drain microtasks and scheduler tasks until both are empty.
    pub fn settle(&self) {
        loop {
            let microtasks = self.host.run_microtasks();
            let tasks = self.scheduler.run_all();
            if microtasks == 0 && tasks == 0 {
                return;
            }
        }
    }

    pub fn markup(&self) -> String {
        self.host.to_markup(self.root.container())
    }
}

/// Shared append-only log for render and effect order assertions.
#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

/// Slot a component stores a setter in so the test can call it later.
pub struct Slot<T>(Rc<RefCell<Option<T>>>);

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }
}

impl<T: Clone> Slot<T> {
    pub fn put(&self, value: T) {
        *self.0.borrow_mut() = Some(value);
    }

    pub fn get(&self) -> T {
        self.0.borrow().clone().expect("slot filled by a render")
    }
}
