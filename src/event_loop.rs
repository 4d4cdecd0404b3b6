//! The deferred-execution queue every reaction runs from.
//!
//! Each thread owns one event loop holding a FIFO microtask queue and a list
//! of timers on a virtual clock. Nothing runs on its own: the embedding code
//! drives the loop with [`run`], [`run_for`], [`run_microtasks`] or
//! [`block_on`].
//!
//! ```
//! use abortable_promise::event_loop;
//! use std::{cell::RefCell, rc::Rc};
//!
//! let order = Rc::new(RefCell::new(Vec::new()));
//! let (a, b) = (order.clone(), order.clone());
//! event_loop::set_timeout(10, move || a.borrow_mut().push("timer"));
//! event_loop::queue_microtask(move || b.borrow_mut().push("microtask"));
//!
//! event_loop::run();
//! assert_eq!(*order.borrow(), ["microtask", "timer"]);
//! assert_eq!(event_loop::now_ms(), 10);
//! ```
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll};

use futures::task::noop_waker_ref;
use log::trace;

pub type Job = Box<dyn FnOnce()>;

/// Handle returned by [`set_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct TimerTask {
    id: TimerId,
    due_at: u64,
    job: Job,
}

#[derive(Default)]
struct MicrotaskQueue {
    queue: VecDeque<Job>,
}

impl MicrotaskQueue {
    fn enqueue(&mut self, job: Job) {
        self.queue.push_back(job);
    }

    fn pop(&mut self) -> Option<Job> {
        self.queue.pop_front()
    }
}

#[derive(Default)]
struct TaskQueue {
    tasks: Vec<TimerTask>,
}

impl TaskQueue {
    fn add(&mut self, task: TimerTask) {
        self.tasks.push(task);
    }

    fn clear(&mut self, id: TimerId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        self.tasks.len() != before
    }

    /// Earliest deadline wins; ties go to the timer scheduled first.
    fn next_index(&self) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (idx, task) in self.tasks.iter().enumerate() {
            match best {
                Some((_, best_due)) if task.due_at >= best_due => {}
                _ => best = Some((idx, task.due_at)),
            }
        }
        best.map(|(idx, _)| idx)
    }
}

#[derive(Default)]
struct EventLoop {
    now_ms: u64,
    next_timer_id: u64,
    microtasks: MicrotaskQueue,
    tasks: TaskQueue,
}

impl EventLoop {
    fn schedule_timer(&mut self, delay_ms: u64, job: Job) -> TimerId {
        self.next_timer_id += 1;
        let id = TimerId(self.next_timer_id);
        self.tasks.add(TimerTask {
            id,
            due_at: self.now_ms.saturating_add(delay_ms),
            job,
        });
        id
    }

    /// Removes the next timer due no later than `deadline` and moves the
    /// clock forward to its deadline.
    fn pop_timer(&mut self, deadline: Option<u64>) -> Option<Job> {
        let idx = self.tasks.next_index()?;
        let due_at = self.tasks.tasks[idx].due_at;
        if deadline.is_some_and(|deadline| due_at > deadline) {
            return None;
        }
        let task = self.tasks.tasks.remove(idx);
        self.now_ms = self.now_ms.max(due_at);
        trace!("timer {:?} fired at {}ms", task.id, self.now_ms);
        Some(task.job)
    }
}

thread_local! {
    static EVENT_LOOP: RefCell<EventLoop> = RefCell::new(EventLoop::default());
}

/// Schedules `job` to run after the current synchronous work, after every
/// microtask queued before it.
pub fn queue_microtask(job: impl FnOnce() + 'static) {
    EVENT_LOOP.with(|el| el.borrow_mut().microtasks.enqueue(Box::new(job)));
}

/// Schedules `job` to run once the virtual clock reaches `now + delay_ms`.
pub fn set_timeout(delay_ms: u64, job: impl FnOnce() + 'static) -> TimerId {
    EVENT_LOOP.with(|el| el.borrow_mut().schedule_timer(delay_ms, Box::new(job)))
}

/// Cancels a timer. Returns `false` if it already fired or was cancelled.
pub fn clear_timeout(id: TimerId) -> bool {
    EVENT_LOOP.with(|el| el.borrow_mut().tasks.clear(id))
}

pub fn now_ms() -> u64 {
    EVENT_LOOP.with(|el| el.borrow().now_ms)
}

/// True when neither microtasks nor timers are waiting.
pub fn is_idle() -> bool {
    EVENT_LOOP.with(|el| {
        let el = el.borrow();
        el.microtasks.queue.is_empty() && el.tasks.tasks.is_empty()
    })
}

/// Drains the microtask queue, including microtasks queued while draining.
/// Returns the number of jobs run.
pub fn run_microtasks() -> usize {
    let mut ran = 0;
    // The borrow must end before the job runs: jobs queue more jobs.
    while let Some(job) = EVENT_LOOP.with(|el| el.borrow_mut().microtasks.pop()) {
        job();
        ran += 1;
    }
    ran
}

fn run_until(deadline: Option<u64>) -> usize {
    let mut ran = 0;
    loop {
        ran += run_microtasks();
        match EVENT_LOOP.with(|el| el.borrow_mut().pop_timer(deadline)) {
            Some(job) => {
                job();
                ran += 1;
            }
            None => return ran,
        }
    }
}

/// Runs microtasks and timers until both queues are empty.
pub fn run() -> usize {
    run_until(None)
}

/// Like [`run`], but only fires timers due within the next `ms` virtual
/// milliseconds. The clock ends at `now + ms`.
pub fn run_for(ms: u64) -> usize {
    let deadline = now_ms().saturating_add(ms);
    let ran = run_until(Some(deadline));
    EVENT_LOOP.with(|el| {
        let mut el = el.borrow_mut();
        el.now_ms = el.now_ms.max(deadline);
    });
    ran
}

/// Runs all microtasks, or failing that the next timer.
fn turn() -> bool {
    if run_microtasks() > 0 {
        return true;
    }
    match EVENT_LOOP.with(|el| el.borrow_mut().pop_timer(None)) {
        Some(job) => {
            job();
            true
        }
        None => false,
    }
}

/// Polls `future` to completion while driving this thread's event loop.
///
/// Returns `None` if the loop runs out of work with the future still
/// pending, since nothing is left that could complete it.
pub fn block_on<F: Future>(future: F) -> Option<F::Output> {
    let mut future = pin!(future);
    let mut cx = Context::from_waker(noop_waker_ref());
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return Some(output);
        }
        if !turn() {
            return None;
        }
    }
}

/// Discards every queued microtask and timer and rewinds the clock.
pub fn reset() {
    let old = EVENT_LOOP.with(|el| std::mem::take(&mut *el.borrow_mut()));
    // Dropped jobs may own futures; drop them outside the borrow.
    drop(old);
}
