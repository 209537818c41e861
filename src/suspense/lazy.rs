//! Lazy - Components whose definition arrives later.

use std::cell::RefCell;
use std::rc::Rc;

use super::{SuspendedReason, Thenable};
use crate::error::Outcome;
use crate::types::{Component, ElementBuilder, ElementType};

type Loader = Box<dyn FnOnce() -> Thenable<Component>>;

struct LazyDef {
    loader: RefCell<Option<Loader>>,
    payload: RefCell<Option<Thenable<Component>>>,
}

/// A component loaded on first render.
#[derive(Clone)]
pub struct LazyComponent(Rc<LazyDef>);

/// Wrap a loader. It runs once, the first time the component renders.
pub fn lazy(loader: impl FnOnce() -> Thenable<Component> + 'static) -> LazyComponent {
    LazyComponent(Rc::new(LazyDef { loader: RefCell::new(Some(Box::new(loader))), payload: RefCell::new(None) }))
}

impl LazyComponent {
    pub fn element(&self) -> ElementBuilder {
        ElementBuilder::new(ElementType::Lazy(self.clone()))
    }

    /// The loaded component, suspending while the loader is pending.
    pub(crate) fn resolve(&self) -> Outcome<Component> {
        let existing = self.0.payload.borrow().clone();
        let payload = match existing {
            Some(payload) => payload,
            None => {
                let loader = self.0.loader.borrow_mut().take();
                let payload = match loader {
                    Some(loader) => loader(),
                    None => Thenable::new(),
                };
                *self.0.payload.borrow_mut() = Some(payload.clone());
                payload
            }
        };
        payload.read(SuspendedReason::LegacyAwait)
    }
}

impl PartialEq for LazyComponent {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Interrupt;
    use crate::types::Node;
    use std::cell::Cell;

    #[test]
    fn test_loader_runs_once_and_suspends_until_resolved() {
        let calls = Rc::new(Cell::new(0));
        let pending: Thenable<Component> = Thenable::new();
        let (c, p) = (calls.clone(), pending.clone());
        let lazy = lazy(move || {
            c.set(c.get() + 1);
            p
        });

        assert!(matches!(
            lazy.resolve(),
            Err(Interrupt::Suspended(s)) if s.reason == SuspendedReason::LegacyAwait
        ));
        let component = Component::new("Loaded", |_, _| Ok(Node::Empty));
        pending.resolve(component.clone());
        assert!(matches!(lazy.resolve(), Ok(c) if c == component));
        assert_eq!(calls.get(), 1);
    }
}
