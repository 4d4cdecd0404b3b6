use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::future::IntoFuture;
use std::rc::Rc;

use log::{debug, trace};

use crate::combinator::{self, Settled};
use crate::event_loop;
use crate::signal::AbortSignal;
use crate::waiter::Waiter;
use crate::{Error, Outcome, Resolution};

/// Where a future is in its lifecycle. Every state but `Pending` is final.
#[derive(Debug, Clone, PartialEq)]
pub enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(Error<E>),
    Aborted(Error<E>),
}

impl<T, E> State<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    fn label(&self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Fulfilled(_) => "fulfilled",
            State::Rejected(_) => "rejected",
            State::Aborted(_) => "aborted",
        }
    }
}

type Reaction<T, E> = Box<dyn FnOnce(Result<T, Error<E>>)>;

pub(crate) struct Inner<T, E> {
    state: State<T, E>,
    reactions: Vec<Reaction<T, E>>,
    /// Set by the first resolve or reject, including a resolve that is still
    /// adopting another future's outcome.
    resolved: bool,
    signal: AbortSignal<E>,
}

type Shared<T, E> = Rc<RefCell<Inner<T, E>>>;

/// A promise that can also be aborted while pending.
///
/// Cloning is cheap and every clone observes the same state.
pub struct AbortableFuture<T, E> {
    inner: Shared<T, E>,
}

impl<T, E> Clone for AbortableFuture<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Debug for AbortableFuture<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("AbortableFuture")
            .field("state", &inner.state.label())
            .field("reactions", &inner.reactions.len())
            .finish()
    }
}

/// Fulfils its future, or makes it adopt another outcome.
pub struct Resolve<T, E> {
    inner: Shared<T, E>,
}

/// Rejects its future.
pub struct Reject<T, E> {
    inner: Shared<T, E>,
}

/// Aborts its future.
pub struct Abort<T, E> {
    inner: Shared<T, E>,
}

/// The three settlement handles of one future.
pub struct Resolvers<T, E> {
    pub resolve: Resolve<T, E>,
    pub reject: Reject<T, E>,
    pub abort: Abort<T, E>,
}

macro_rules! impl_handle_clone {
    ($($handle:ident),*) => {$(
        impl<T, E> Clone for $handle<T, E> {
            fn clone(&self) -> Self {
                Self { inner: self.inner.clone() }
            }
        }
    )*};
}

impl_handle_clone!(Resolve, Reject, Abort);

fn fulfill<T: Clone + 'static, E: Clone + Debug + 'static>(inner: &Shared<T, E>, value: T) {
    let reactions = {
        let mut this = inner.borrow_mut();
        if !this.state.is_pending() {
            return;
        }
        this.state = State::Fulfilled(value.clone());
        this.resolved = true;
        std::mem::take(&mut this.reactions)
    };
    trace!("future fulfilled, {} reactions queued", reactions.len());
    for reaction in reactions {
        let value = value.clone();
        event_loop::queue_microtask(move || reaction(Ok(value)));
    }
}

/// Settles with a rejection, or with an abort when `abort` is set.
fn settle_err<T: Clone + 'static, E: Clone + Debug + 'static>(
    inner: &Shared<T, E>,
    reason: Error<E>,
    abort: bool,
) {
    let (reactions, signal) = {
        let mut this = inner.borrow_mut();
        if !this.state.is_pending() {
            return;
        }
        this.state = if abort {
            State::Aborted(reason.clone())
        } else {
            State::Rejected(reason.clone())
        };
        this.resolved = true;
        (std::mem::take(&mut this.reactions), this.signal.clone())
    };
    if abort {
        trace!("future aborted, {} reactions queued", reactions.len());
    } else if reactions.is_empty() {
        debug!("future rejected with no reaction attached: {:?}", reason);
    } else {
        trace!("future rejected, {} reactions queued", reactions.len());
    }
    for reaction in reactions {
        let reason = reason.clone();
        event_loop::queue_microtask(move || reaction(Err(reason)));
    }
    if abort {
        signal.fire(reason);
    }
}

/// Settles `target` with `resolution`, adopting it if it is not a plain value.
fn adopt<T: Clone + 'static, E: Clone + Debug + 'static>(
    target: &Shared<T, E>,
    resolution: Resolution<T, E>,
) {
    match resolution {
        Resolution::Value(value) => fulfill(target, value),
        Resolution::Future(source) => {
            if Rc::ptr_eq(&source.inner, target) {
                settle_err(target, Error::Cycle, false);
                return;
            }
            let target = target.clone();
            source.subscribe(move |outcome| match outcome {
                Ok(value) => fulfill(&target, value),
                Err(reason) => settle_err(&target, reason, false),
            });
        }
        Resolution::Thenable(thenable) => {
            let (proxy, resolvers) = AbortableFuture::with_resolvers();
            let Resolvers { resolve, reject, .. } = resolvers;
            event_loop::queue_microtask(move || {
                if let Err(reason) = thenable.then(resolve, reject.clone()) {
                    reject.reject(reason);
                }
            });
            adopt(target, Resolution::Future(proxy));
        }
    }
}

/// Marks the future resolved. `false` if it was already resolved or settled.
fn claim<T, E>(inner: &Shared<T, E>) -> bool {
    let mut this = inner.borrow_mut();
    if this.resolved || !this.state.is_pending() {
        return false;
    }
    this.resolved = true;
    true
}

impl<T: Clone + 'static, E: Clone + Debug + 'static> Resolve<T, E> {
    pub fn resolve(&self, value: T) {
        self.resolve_with(Resolution::Value(value));
    }

    /// Resolves with a value, another future, or a thenable. Resolving a
    /// future with itself rejects it with [`Error::Cycle`].
    pub fn resolve_with(&self, resolution: Resolution<T, E>) {
        if claim(&self.inner) {
            adopt(&self.inner, resolution);
        }
    }
}

impl<T: Clone + 'static, E: Clone + Debug + 'static> Reject<T, E> {
    pub fn reject(&self, reason: E) {
        self.reject_with(Error::Rejected(reason));
    }

    /// Rejects with an already built error, e.g. to pass an abort along.
    pub fn reject_with(&self, reason: Error<E>) {
        if claim(&self.inner) {
            settle_err(&self.inner, reason, false);
        }
    }
}

impl<T: Clone + 'static, E: Clone + Debug + 'static> Abort<T, E> {
    pub fn abort(&self, reason: E) {
        settle_err(&self.inner, Error::Aborted(Some(reason)), true);
    }

    /// Aborts with the default reason, `Error::Aborted(None)`.
    pub fn abort_default(&self) {
        settle_err(&self.inner, Error::Aborted(None), true);
    }
}

impl<T: Clone + 'static, E: Clone + Debug + 'static> AbortableFuture<T, E> {
    fn pending() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending,
                reactions: vec![],
                resolved: false,
                signal: AbortSignal::new(),
            })),
        }
    }

    /// Runs `executor` right away with the future's three handles. An `Err`
    /// from the executor rejects the future unless it is already resolved.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolve<T, E>, Reject<T, E>, Abort<T, E>) -> Result<(), E>,
    {
        let (future, resolvers) = Self::with_resolvers();
        let Resolvers {
            resolve,
            reject,
            abort,
        } = resolvers;
        let on_error = reject.clone();
        if let Err(reason) = executor(resolve, reject, abort) {
            on_error.reject(reason);
        }
        future
    }

    /// A pending future and the handles that settle it.
    pub fn with_resolvers() -> (Self, Resolvers<T, E>) {
        let future = Self::pending();
        let resolvers = Resolvers {
            resolve: Resolve {
                inner: future.inner.clone(),
            },
            reject: Reject {
                inner: future.inner.clone(),
            },
            abort: Abort {
                inner: future.inner.clone(),
            },
        };
        (future, resolvers)
    }

    pub fn resolve(value: T) -> Self {
        let future = Self::pending();
        fulfill(&future.inner, value);
        future
    }

    /// Coerces `resolution` into a future. Futures are returned unchanged.
    pub fn resolve_with(resolution: Resolution<T, E>) -> Self {
        match resolution {
            Resolution::Future(future) => future,
            other => {
                let future = Self::pending();
                if claim(&future.inner) {
                    adopt(&future.inner, other);
                }
                future
            }
        }
    }

    pub fn reject(reason: E) -> Self {
        let future = Self::pending();
        settle_err(&future.inner, Error::Rejected(reason), false);
        future
    }

    /// Registers `reaction` to receive the outcome. It never runs before the
    /// current call returns.
    pub(crate) fn subscribe(&self, reaction: impl FnOnce(Result<T, Error<E>>) + 'static) {
        let mut this = self.inner.borrow_mut();
        let settled = match &this.state {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) | State::Aborted(reason) => Some(Err(reason.clone())),
        };
        match settled {
            None => this.reactions.push(Box::new(reaction)),
            Some(outcome) => event_loop::queue_microtask(move || reaction(outcome)),
        }
    }

    /// Attaches both handlers and returns the future of whichever one runs.
    /// An aborted source runs `on_rejected` with its abort reason.
    pub fn then<U, F, G>(&self, on_fulfilled: F, on_rejected: G) -> AbortableFuture<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Outcome<U, E> + 'static,
        G: FnOnce(Error<E>) -> Outcome<U, E> + 'static,
    {
        let (next, resolvers) = AbortableFuture::with_resolvers();
        let Resolvers { resolve, reject, .. } = resolvers;
        self.subscribe(move |outcome| {
            let handled = match outcome {
                Ok(value) => on_fulfilled(value),
                Err(reason) => on_rejected(reason),
            };
            match handled {
                Ok(resolution) => resolve.resolve_with(resolution),
                Err(reason) => reject.reject_with(reason),
            }
        });
        next
    }

    /// `then` with the rejection passed through unchanged.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> AbortableFuture<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Outcome<U, E> + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    /// `then` with the value passed through unchanged.
    pub fn catch<G>(&self, on_rejected: G) -> AbortableFuture<T, E>
    where
        G: FnOnce(Error<E>) -> Outcome<T, E> + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    /// Runs `on_settled` on either outcome, then passes the original outcome
    /// on. An `Err` from `on_settled`, or a future it returns that rejects,
    /// replaces the original outcome.
    pub fn finally<H>(&self, on_settled: H) -> AbortableFuture<T, E>
    where
        H: FnOnce() -> Outcome<(), E> + 'static,
    {
        let (next, resolvers) = AbortableFuture::with_resolvers();
        let Resolvers { resolve, reject, .. } = resolvers;
        self.subscribe(move |original| match on_settled() {
            Err(reason) => reject.reject_with(reason),
            Ok(Resolution::Value(())) => match original {
                Ok(value) => resolve.resolve(value),
                Err(reason) => reject.reject_with(reason),
            },
            Ok(gate) => {
                let restored = AbortableFuture::resolve_with(gate).and_then(move |()| {
                    original.map(Resolution::Value)
                });
                resolve.resolve_with(Resolution::Future(restored));
            }
        });
        next
    }

    /// Aborts the future if it is still pending; otherwise does nothing.
    pub fn abort(&self, reason: E) -> &Self {
        settle_err(&self.inner, Error::Aborted(Some(reason)), true);
        self
    }

    pub fn abort_default(&self) -> &Self {
        settle_err(&self.inner, Error::Aborted(None), true);
        self
    }

    pub(crate) fn abort_with(&self, reason: Error<E>) {
        settle_err(&self.inner, reason, true);
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.inner.borrow().state, State::Aborted(_))
    }

    pub fn is_pending(&self) -> bool {
        self.inner.borrow().state.is_pending()
    }

    pub fn state(&self) -> State<T, E> {
        self.inner.borrow().state.clone()
    }

    pub fn abort_signal(&self) -> AbortSignal<E> {
        self.inner.borrow().signal.clone()
    }

    /// A `std::future::Future` resolving to this future's outcome.
    pub fn wait(&self) -> Waiter<T, E> {
        Waiter::new(self)
    }

    pub fn all<I>(iterable: I) -> AbortableFuture<Vec<T>, E>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        combinator::all(iterable)
    }

    pub fn any<I>(iterable: I) -> AbortableFuture<T, E>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        combinator::any(iterable)
    }

    pub fn race<I>(iterable: I) -> AbortableFuture<T, E>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        combinator::race(iterable)
    }

    pub fn all_settled<I>(iterable: I) -> AbortableFuture<Vec<Settled<T, E>>, E>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        combinator::all_settled(iterable)
    }
}

impl<T: Clone + 'static, E: Clone + Debug + 'static> IntoFuture for AbortableFuture<T, E> {
    type Output = Result<T, Error<E>>;
    type IntoFuture = Waiter<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        Waiter::new(&self)
    }
}
