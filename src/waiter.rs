use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;
use std::{future::Future, task::{Poll, Waker}};

use crate::{AbortableFuture, Error};

/// A `std::future::Future` over an [`AbortableFuture`]'s outcome.
///
/// # Examples
///
/// ```
/// use abortable_promise::{event_loop, AbortableFuture};
///
/// let (future, resolvers) = AbortableFuture::<String, ()>::with_resolvers();
/// event_loop::set_timeout(10, move || resolvers.resolve.resolve("🍓".into()));
///
/// let received = event_loop::block_on(async move { future.await });
/// assert_eq!(received, Some(Ok("🍓".to_string())));
/// ```
///
/// If every handle able to settle the future is dropped first, the waiter
/// yields [`Error::Dropped`].
#[derive(Debug)]
pub struct Waiter<T, E> {
    slot: Rc<RefCell<Slot<T, E>>>,
}

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

#[derive(Debug)]
struct Slot<T, E> {
    value: Option<Result<T, Error<E>>>,
    waker: Result<Waker, WakerState>,
}

/// The producing half, parked in the future's reaction queue.
struct Delivery<T, E> {
    slot: Rc<RefCell<Slot<T, E>>>,
}

impl<T, E> Delivery<T, E> {
    fn deliver(self, outcome: Result<T, Error<E>>) {
        self.slot.borrow_mut().value = Some(outcome);
    }
}

impl<T, E> Drop for Delivery<T, E> {
    /// Delivered or not, the waiter has nothing more to wait for.
    fn drop(&mut self) {
        let mut slot = self.slot.borrow_mut();
        if let Ok(waker) = std::mem::replace(&mut slot.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl<T: Clone + 'static, E: Clone + Debug + 'static> Waiter<T, E> {
    pub(crate) fn new(future: &AbortableFuture<T, E>) -> Self {
        let slot = Rc::new(RefCell::new(Slot {
            value: None,
            waker: Err(WakerState::Fresh),
        }));
        let delivery = Delivery { slot: slot.clone() };
        future.subscribe(move |outcome| delivery.deliver(outcome));
        Waiter { slot }
    }
}

impl<T, E> Future for Waiter<T, E> {
    type Output = Result<T, Error<E>>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        match slot.value.take() {
            Some(value) => Poll::Ready(value),
            None => match std::mem::replace(&mut slot.waker, Ok(cx.waker().clone())) {
                Err(WakerState::Tainted) => Poll::Ready(Err(Error::Dropped)),
                _ => Poll::Pending,
            },
        }
    }
}
