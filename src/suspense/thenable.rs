//! Thenable - A single-threaded, settle-once awaitable with a cached result.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{Awaitable, Suspension, SuspendedReason, Wakeable};
use crate::error::{Interrupt, Outcome, ReconcileError};

thread_local! {
    /// Counter for awaitable identities.
    static NEXT_THENABLE_ID: Cell<usize> = const { Cell::new(1) };
}

/// Observable state of a [`Thenable`].
#[derive(Debug, Clone, PartialEq)]
pub enum ThenableStatus<T> {
    Pending,
    Fulfilled(T),
    Rejected(String),
}

type Listener = (Box<dyn FnOnce()>, Box<dyn FnOnce(String)>);

struct Inner<T> {
    id: usize,
    status: RefCell<ThenableStatus<T>>,
    listeners: RefCell<Vec<Listener>>,
}

/// Awaitable value. Clones share state.
pub struct Thenable<T>(Rc<Inner<T>>);

impl<T> Clone for Thenable<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Clone + 'static> Default for Thenable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Thenable<T> {
    /// A pending thenable.
    pub fn new() -> Self {
        let id = NEXT_THENABLE_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Self(Rc::new(Inner {
            id,
            status: RefCell::new(ThenableStatus::Pending),
            listeners: RefCell::new(Vec::new()),
        }))
    }

    /// An already fulfilled thenable.
    pub fn resolved(value: T) -> Self {
        let thenable = Self::new();
        *thenable.0.status.borrow_mut() = ThenableStatus::Fulfilled(value);
        thenable
    }

    pub fn status(&self) -> ThenableStatus<T> {
        self.0.status.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.0.status.borrow(), ThenableStatus::Pending)
    }

    /// Fulfil with `value` and notify listeners. Ignored once settled.
    pub fn resolve(&self, value: T) {
        if !self.is_pending() {
            return;
        }
        *self.0.status.borrow_mut() = ThenableStatus::Fulfilled(value);
        let listeners = std::mem::take(&mut *self.0.listeners.borrow_mut());
        for (on_ready, _) in listeners {
            on_ready();
        }
    }

    /// Reject with `reason` and notify listeners. Ignored once settled.
    pub fn reject(&self, reason: impl Into<String>) {
        if !self.is_pending() {
            return;
        }
        let reason = reason.into();
        *self.0.status.borrow_mut() = ThenableStatus::Rejected(reason.clone());
        let listeners = std::mem::take(&mut *self.0.listeners.borrow_mut());
        for (_, on_error) in listeners {
            on_error(reason.clone());
        }
    }

    /// Type-erased handle for the suspension protocol.
    pub fn awaitable(&self) -> Awaitable {
        Rc::new(self.clone())
    }

    /// The settled value, or the interrupt a render should raise.
    pub fn read(&self, reason: SuspendedReason) -> Outcome<T> {
        match self.status() {
            ThenableStatus::Fulfilled(value) => Ok(value),
            ThenableStatus::Rejected(error) => Err(Interrupt::Failed(ReconcileError::Rejected(error))),
            ThenableStatus::Pending => {
                Err(Interrupt::Suspended(Suspension { awaitable: self.awaitable(), reason }))
            }
        }
    }
}

impl<T: 'static> Wakeable for Thenable<T> {
    fn then(&self, on_ready: Box<dyn FnOnce()>, on_error: Box<dyn FnOnce(String)>) {
        let settled = match &*self.0.status.borrow() {
            ThenableStatus::Pending => None,
            ThenableStatus::Fulfilled(_) => Some(Ok(())),
            ThenableStatus::Rejected(error) => Some(Err(error.clone())),
        };
        match settled {
            None => self.0.listeners.borrow_mut().push((on_ready, on_error)),
            Some(Ok(())) => on_ready(),
            Some(Err(error)) => on_error(error),
        }
    }

    fn id(&self) -> usize {
        self.0.id
    }
}
