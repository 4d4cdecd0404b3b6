//! Futures built from many futures: [`all`], [`any`], [`race`] and
//! [`all_settled`].
//!
//! Every input is first coerced with [`AbortableFuture::resolve_with`].
//! Aborting the combined future forwards the abort to each input that is
//! still pending and turns all later input callbacks into no-ops.
use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use log::debug;

use crate::future::Resolvers;
use crate::{AbortableFuture, Error, Resolution};

/// How one input of [`all_settled`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled<T, E> {
    Fulfilled(T),
    Rejected(Error<E>),
}

impl<T, E> Settled<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled(_))
    }
}

impl<T, E> From<Result<T, Error<E>>> for Settled<T, E> {
    fn from(outcome: Result<T, Error<E>>) -> Self {
        match outcome {
            Ok(value) => Settled::Fulfilled(value),
            Err(reason) => Settled::Rejected(reason),
        }
    }
}

fn collect<T, E, I>(iterable: I) -> Vec<AbortableFuture<T, E>>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    iterable
        .into_iter()
        .map(|item| AbortableFuture::resolve_with(item.into()))
        .collect()
}

/// Returns the guard flag that is raised once `combined` is aborted.
///
/// The abort listener keeps the inputs alive until `combined` settles, at
/// which point it is unregistered.
fn forward_abort<T, U, E>(
    combined: &AbortableFuture<U, E>,
    inputs: &[AbortableFuture<T, E>],
) -> Rc<Cell<bool>>
where
    T: Clone + 'static,
    U: Clone + 'static,
    E: Clone + Debug + 'static,
{
    let aborted = Rc::new(Cell::new(false));
    let flag = aborted.clone();
    let inputs = inputs.to_vec();
    let signal = combined.abort_signal();
    let id = signal.add_listener(move |reason| {
        flag.set(true);
        debug!("combinator aborted, forwarding to {} inputs", inputs.len());
        for input in &inputs {
            input.abort_with(reason.clone());
        }
    });
    combined.subscribe(move |_| {
        signal.remove_listener(id);
    });
    aborted
}

/// Fulfils with every input's value, in input order, or rejects with the
/// first failure.
///
/// ```
/// use abortable_promise::{combinator, event_loop, AbortableFuture};
///
/// let (slow, resolvers) = AbortableFuture::<&str, ()>::with_resolvers();
/// event_loop::set_timeout(10, move || resolvers.resolve.resolve("A"));
/// let fast = AbortableFuture::resolve("B");
///
/// let both = combinator::all([slow, fast]);
/// assert_eq!(event_loop::block_on(both.wait()), Some(Ok(vec!["A", "B"])));
/// ```
pub fn all<T, E, I>(iterable: I) -> AbortableFuture<Vec<T>, E>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    let inputs = collect(iterable);
    let (combined, Resolvers { resolve, reject, .. }) = AbortableFuture::with_resolvers();
    if inputs.is_empty() {
        resolve.resolve(vec![]);
        return combined;
    }
    let aborted = forward_abort(&combined, &inputs);
    let values = Rc::new(RefCell::new(vec![None; inputs.len()]));
    let remaining = Rc::new(Cell::new(inputs.len()));
    for (index, input) in inputs.iter().enumerate() {
        let (aborted, values, remaining) = (aborted.clone(), values.clone(), remaining.clone());
        let (resolve, reject) = (resolve.clone(), reject.clone());
        input.subscribe(move |outcome| {
            if aborted.get() {
                return;
            }
            match outcome {
                Ok(value) => {
                    values.borrow_mut()[index] = Some(value);
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        let values = values.borrow_mut().drain(..).flatten().collect();
                        resolve.resolve(values);
                    }
                }
                Err(reason) => reject.reject_with(reason),
            }
        });
    }
    combined
}

/// Fulfils with the first input to fulfil. If every input fails, rejects
/// with [`Error::Aggregate`] holding the reasons in input order.
pub fn any<T, E, I>(iterable: I) -> AbortableFuture<T, E>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    let inputs = collect(iterable);
    let (combined, Resolvers { resolve, reject, .. }) = AbortableFuture::with_resolvers();
    if inputs.is_empty() {
        reject.reject_with(Error::Aggregate(vec![]));
        return combined;
    }
    let aborted = forward_abort(&combined, &inputs);
    let reasons = Rc::new(RefCell::new(vec![None; inputs.len()]));
    let remaining = Rc::new(Cell::new(inputs.len()));
    for (index, input) in inputs.iter().enumerate() {
        let (aborted, reasons, remaining) = (aborted.clone(), reasons.clone(), remaining.clone());
        let (resolve, reject) = (resolve.clone(), reject.clone());
        input.subscribe(move |outcome| {
            if aborted.get() {
                return;
            }
            match outcome {
                Ok(value) => resolve.resolve(value),
                Err(reason) => {
                    reasons.borrow_mut()[index] = Some(reason);
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        let reasons = reasons.borrow_mut().drain(..).flatten().collect();
                        reject.reject_with(Error::Aggregate(reasons));
                    }
                }
            }
        });
    }
    combined
}

/// Settles like whichever input settles first. With no inputs it never
/// settles.
pub fn race<T, E, I>(iterable: I) -> AbortableFuture<T, E>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    let inputs = collect(iterable);
    let (combined, Resolvers { resolve, reject, .. }) = AbortableFuture::with_resolvers();
    let aborted = forward_abort(&combined, &inputs);
    for input in &inputs {
        let aborted = aborted.clone();
        let (resolve, reject) = (resolve.clone(), reject.clone());
        input.subscribe(move |outcome| {
            if aborted.get() {
                return;
            }
            match outcome {
                Ok(value) => resolve.resolve(value),
                Err(reason) => reject.reject_with(reason),
            }
        });
    }
    combined
}

/// Fulfils with one [`Settled`] record per input, in input order, once every
/// input has settled. Never rejects on account of its inputs.
pub fn all_settled<T, E, I>(iterable: I) -> AbortableFuture<Vec<Settled<T, E>>, E>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
    I: IntoIterator,
    I::Item: Into<Resolution<T, E>>,
{
    let inputs = collect(iterable);
    let (combined, Resolvers { resolve, .. }) = AbortableFuture::with_resolvers();
    if inputs.is_empty() {
        resolve.resolve(vec![]);
        return combined;
    }
    let aborted = forward_abort(&combined, &inputs);
    let records = Rc::new(RefCell::new(vec![None; inputs.len()]));
    let remaining = Rc::new(Cell::new(inputs.len()));
    for (index, input) in inputs.iter().enumerate() {
        let (aborted, records, remaining) = (aborted.clone(), records.clone(), remaining.clone());
        let resolve = resolve.clone();
        input.subscribe(move |outcome| {
            if aborted.get() {
                return;
            }
            records.borrow_mut()[index] = Some(Settled::from(outcome));
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                let records = records.borrow_mut().drain(..).flatten().collect();
                resolve.resolve(records);
            }
        });
    }
    combined
}
