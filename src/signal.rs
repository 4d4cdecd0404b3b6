//! The abort signal attached to every [`AbortableFuture`](crate::AbortableFuture).
//!
//! A signal flips to aborted exactly when its future enters the aborted
//! state, and calls its listeners synchronously at that moment.
use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::Error;

/// Handle returned by [`AbortSignal::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Box<dyn FnOnce(&Error<E>)>;

struct Inner<E> {
    reason: Option<Error<E>>,
    listeners: Vec<(ListenerId, Listener<E>)>,
    next_id: u64,
}

/// Shared view of a future's abort state. Clones observe the same signal.
pub struct AbortSignal<E> {
    inner: Rc<RefCell<Inner<E>>>,
}

impl<E> Clone for AbortSignal<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Debug> Debug for AbortSignal<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("AbortSignal")
            .field("reason", &inner.reason)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl<E: Clone> AbortSignal<E> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                reason: None,
                listeners: vec![],
                next_id: 0,
            })),
        }
    }

    pub fn aborted(&self) -> bool {
        self.inner.borrow().reason.is_some()
    }

    /// The abort reason, once aborted.
    pub fn reason(&self) -> Option<Error<E>> {
        self.inner.borrow().reason.clone()
    }

    /// Registers `listener` to run when the signal fires. A listener added
    /// after the signal fired is never called.
    pub fn add_listener(&self, listener: impl FnOnce(&Error<E>) + 'static) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        if inner.reason.is_none() {
            inner.listeners.push((id, Box::new(listener)));
        }
        id
    }

    /// Unregisters a listener. Returns `false` if it was already removed or
    /// has already run.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id);
        inner.listeners.len() != before
    }

    pub(crate) fn fire(&self, reason: Error<E>) {
        let listeners = {
            let mut inner = self.inner.borrow_mut();
            if inner.reason.is_some() {
                return;
            }
            inner.reason = Some(reason.clone());
            std::mem::take(&mut inner.listeners)
        };
        // Listeners may touch this signal again, so none run under the borrow.
        for (_, listener) in listeners {
            listener(&reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn fire_notifies_listeners_once() {
        let signal = AbortSignal::<String>::new();
        let calls = Rc::new(Cell::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            signal.add_listener(move |reason| {
                assert_eq!(reason, &Error::Aborted(None));
                calls.set(calls.get() + 1);
            });
        }
        assert!(!signal.aborted());
        signal.fire(Error::Aborted(None));
        signal.fire(Error::Aborted(Some("again".into())));
        assert_eq!(calls.get(), 2);
        assert_eq!(signal.reason(), Some(Error::Aborted(None)));
    }

    #[test]
    fn remove_listener_is_idempotent() {
        let signal = AbortSignal::<()>::new();
        let called = Rc::new(Cell::new(false));
        let flag = called.clone();
        let id = signal.add_listener(move |_| flag.set(true));
        assert!(signal.remove_listener(id));
        assert!(!signal.remove_listener(id));
        signal.fire(Error::Aborted(None));
        assert!(!called.get());
    }

    #[test]
    fn listener_added_after_abort_is_ignored() {
        let signal = AbortSignal::<()>::new();
        signal.fire(Error::Aborted(None));
        let called = Rc::new(Cell::new(false));
        let flag = called.clone();
        let id = signal.add_listener(move |_| flag.set(true));
        assert!(!signal.remove_listener(id));
        assert!(!called.get());
    }
}
