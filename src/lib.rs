//! A single-threaded promise with a third settlement channel: abort.
//!
//! An [`AbortableFuture`] runs its executor synchronously and hands it three
//! handles: [`Resolve`], [`Reject`] and [`Abort`]. Reactions attached with
//! [`AbortableFuture::then`] always run later, from the thread-local
//! [`event_loop`], in the order they were attached.
//!
//! # Examples
//!
//! ```
//! use abortable_promise::{event_loop, AbortableFuture, Resolution};
//!
//! let doubled = AbortableFuture::<i32, String>::new(|resolve, _reject, _abort| {
//!     resolve.resolve(21);
//!     Ok(())
//! })
//! .and_then(|v| Ok(Resolution::Value(v * 2)));
//!
//! assert_eq!(event_loop::block_on(doubled.wait()), Some(Ok(42)));
//! ```
//!
//! Aborting a pending future settles it with [`Error::Aborted`] and notifies
//! its [`AbortSignal`]:
//!
//! ```
//! use abortable_promise::{event_loop, AbortableFuture, Error};
//!
//! let (future, resolvers) = AbortableFuture::<i32, &str>::with_resolvers();
//! future.abort("stop");
//! resolvers.resolve.resolve(1);
//!
//! assert!(future.abort_signal().aborted());
//! assert_eq!(
//!     event_loop::block_on(future.wait()),
//!     Some(Err(Error::Aborted(Some("stop"))))
//! );
//! ```
use thiserror::Error;

pub mod combinator;
pub mod event_loop;
mod future;
pub mod signal;
mod waiter;

pub use combinator::Settled;
pub use future::{Abort, AbortableFuture, Reject, Resolve, Resolvers, State};
pub use signal::{AbortSignal, ListenerId};
pub use waiter::Waiter;

/// Why a future did not fulfil.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error<E> {
    /// Rejected by `reject`, or by an `Err` returned from an executor or handler.
    #[error("promise rejected: {0:?}")]
    Rejected(E),
    /// Aborted. `None` is the default abort reason.
    #[error("promise aborted: {0:?}")]
    Aborted(Option<E>),
    /// The future was resolved with itself.
    #[error("chaining cycle detected for promise")]
    Cycle,
    /// Every input of `any` failed; reasons are kept in input order.
    #[error("all promises were rejected")]
    Aggregate(Vec<Error<E>>),
    /// Every handle able to settle the future was dropped while it was pending.
    #[error("promise dropped before it settled")]
    Dropped,
}

impl<E> Error<E> {
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted(_))
    }
}

/// What a future can be resolved with.
pub enum Resolution<T, E> {
    Value(T),
    /// Adopt the outcome of another future.
    Future(AbortableFuture<T, E>),
    /// Adopt the outcome of a foreign async-like value.
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T, E> From<AbortableFuture<T, E>> for Resolution<T, E> {
    fn from(future: AbortableFuture<T, E>) -> Self {
        Resolution::Future(future)
    }
}

/// The return type of reaction handlers. `Err` plays the part of a thrown
/// error and rejects the derived future.
pub type Outcome<T, E> = Result<Resolution<T, E>, Error<E>>;

/// Anything that reports its outcome through a resolve/reject pair.
///
/// Returning `Err` from `then` rejects the adopting future, unless one of the
/// continuations already settled it. Closures taking `(Resolve, Reject)` are
/// thenables:
///
/// ```
/// use abortable_promise::{event_loop, AbortableFuture, Reject, Resolution, Resolve};
///
/// let thenable = |resolve: Resolve<i32, ()>, _reject: Reject<i32, ()>| {
///     resolve.resolve(42);
///     Ok(())
/// };
/// let future = AbortableFuture::<i32, ()>::resolve_with(Resolution::Thenable(Box::new(thenable)));
///
/// assert_eq!(event_loop::block_on(future.wait()), Some(Ok(42)));
/// ```
pub trait Thenable<T, E> {
    fn then(self: Box<Self>, resolve: Resolve<T, E>, reject: Reject<T, E>) -> Result<(), E>;
}

impl<T, E, F> Thenable<T, E> for F
where
    F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
{
    fn then(self: Box<Self>, resolve: Resolve<T, E>, reject: Reject<T, E>) -> Result<(), E> {
        (*self)(resolve, reject)
    }
}
