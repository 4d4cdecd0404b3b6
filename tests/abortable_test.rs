mod common;

use abortable_promise::{
    event_loop, AbortableFuture, Error, Reject, Resolution, Resolve, State, Thenable,
};
use common::{init_logger, new_log, push};
use rstest::*;
use std::{cell::Cell, rc::Rc};

#[fixture]
fn setup() {
    init_logger();
}

/// A foreign async-like value that answers through its continuations.
struct Answer(i32);

impl Thenable<i32, String> for Answer {
    fn then(
        self: Box<Self>,
        resolve: Resolve<i32, String>,
        _reject: Reject<i32, String>,
    ) -> Result<(), String> {
        resolve.resolve(self.0);
        Ok(())
    }
}

#[rstest]
#[case::fulfilled(0)]
#[case::rejected(1)]
#[case::aborted(2)]
fn settles_only_once(setup: (), #[case] first: usize) {
    let _ = setup;
    let (future, resolvers) = AbortableFuture::<i32, String>::with_resolvers();
    let settle = |which: usize, tag: &str| match which {
        0 => resolvers.resolve.resolve(tag.len() as i32),
        1 => resolvers.reject.reject(tag.to_string()),
        _ => resolvers.abort.abort(tag.to_string()),
    };
    settle(first, "first");
    let settled = future.state();
    for which in 0..3 {
        settle(which, "second try");
    }
    future.abort("external".into());
    event_loop::run();
    assert_eq!(future.state(), settled);
    assert_eq!(future.abort_signal().aborted(), first == 2);
}

#[rstest]
fn reactions_run_fifo_after_settlement(setup: ()) {
    let _ = setup;
    let log = new_log();
    let (future, resolvers) = AbortableFuture::<i32, String>::with_resolvers();
    for i in 1..=5 {
        let log = log.clone();
        future.and_then(move |v| {
            push(&log, format!("R{i}={v}"));
            Ok(Resolution::Value(()))
        });
    }
    event_loop::set_timeout(10, move || resolvers.resolve.resolve(7));
    event_loop::run();
    assert_eq!(*log.borrow(), ["R1=7", "R2=7", "R3=7", "R4=7", "R5=7"]);
}

#[rstest]
fn handlers_never_run_in_the_registering_or_settling_turn(setup: ()) {
    let _ = setup;
    let calls = Rc::new(Cell::new(0));

    let settled = AbortableFuture::<i32, String>::resolve(1);
    let counter = calls.clone();
    settled.and_then(move |_| {
        counter.set(counter.get() + 1);
        Ok(Resolution::Value(()))
    });
    assert_eq!(calls.get(), 0);

    let (pending, resolvers) = AbortableFuture::<i32, String>::with_resolvers();
    let counter = calls.clone();
    pending.catch(move |reason| {
        counter.set(counter.get() + 1);
        Err(reason)
    });
    resolvers.reject.reject("late".into());
    assert_eq!(calls.get(), 0);

    event_loop::run_microtasks();
    assert_eq!(calls.get(), 2);
}

#[rstest]
fn resolving_with_itself_rejects_with_cycle(setup: ()) {
    let _ = setup;
    let (future, resolvers) = AbortableFuture::<i32, String>::with_resolvers();
    let this = future.clone();
    event_loop::queue_microtask(move || resolvers.resolve.resolve_with(this.into()));
    assert_eq!(
        event_loop::block_on(future.wait()),
        Some(Err(Error::Cycle))
    );
}

#[rstest]
fn handler_returning_its_own_future_is_a_cycle(setup: ()) {
    let _ = setup;
    let slot: Rc<std::cell::RefCell<Option<AbortableFuture<i32, String>>>> = Default::default();
    let inner = slot.clone();
    let derived = AbortableFuture::<i32, String>::resolve(1).and_then(move |_| {
        match inner.borrow_mut().take() {
            Some(itself) => Ok(Resolution::Future(itself)),
            None => Ok(Resolution::Value(0)),
        }
    });
    *slot.borrow_mut() = Some(derived.clone());
    event_loop::run();
    assert_eq!(derived.state(), State::Rejected(Error::Cycle));
}

#[rstest]
fn thenables_are_adopted(setup: ()) {
    let _ = setup;
    let future =
        AbortableFuture::<i32, String>::resolve_with(Resolution::Thenable(Box::new(Answer(42))));
    assert!(future.is_pending());
    assert_eq!(event_loop::block_on(future.wait()), Some(Ok(42)));
}

#[rstest]
fn nested_thenables_are_adopted_recursively(setup: ()) {
    let _ = setup;
    let outer = |resolve: Resolve<i32, String>, _: Reject<i32, String>| {
        resolve.resolve_with(Resolution::Thenable(Box::new(Answer(7))));
        Ok(())
    };
    let future = AbortableFuture::<i32, String>::new(move |resolve, _, _| {
        resolve.resolve_with(Resolution::Thenable(Box::new(outer)));
        Ok(())
    });
    assert_eq!(event_loop::block_on(future.wait()), Some(Ok(7)));
}

#[rstest]
fn thenable_failing_before_settling_rejects(setup: ()) {
    let _ = setup;
    let failing = |_: Resolve<i32, String>, _: Reject<i32, String>| -> Result<(), String> {
        Err("broken".to_string())
    };
    let future = AbortableFuture::<i32, String>::resolve_with(Resolution::Thenable(Box::new(failing)));
    assert_eq!(
        event_loop::block_on(future.wait()),
        Some(Err(Error::Rejected("broken".into())))
    );
}

#[rstest]
fn thenable_failure_after_resolving_is_ignored(setup: ()) {
    let _ = setup;
    let eager = |resolve: Resolve<i32, String>, _: Reject<i32, String>| -> Result<(), String> {
        resolve.resolve(5);
        Err("too late".to_string())
    };
    let future = AbortableFuture::<i32, String>::resolve_with(Resolution::Thenable(Box::new(eager)));
    assert_eq!(event_loop::block_on(future.wait()), Some(Ok(5)));
}

#[test]
fn abort_error_shows_its_reason() {
    let reason: Error<&str> = Error::Aborted(Some("stop"));
    assert_eq!(reason.to_string(), "promise aborted: Some(\"stop\")");
    assert_eq!(Error::<&str>::Aborted(None).to_string(), "promise aborted: None");
}

#[rstest]
fn abort_suppresses_late_settlement(setup: ()) {
    let _ = setup;
    let future = AbortableFuture::<i32, String>::new(|resolve, _, _| {
        event_loop::set_timeout(10, move || resolve.resolve(1));
        Ok(())
    });
    future.abort("stop".into());
    event_loop::run();
    assert_eq!(event_loop::now_ms(), 10);
    assert_eq!(
        future.state(),
        State::Aborted(Error::Aborted(Some("stop".into())))
    );
    assert_eq!(
        future.abort_signal().reason(),
        Some(Error::Aborted(Some("stop".into())))
    );
}

#[rstest]
fn executor_can_abort_before_construction_returns(setup: ()) {
    let _ = setup;
    let future = AbortableFuture::<i32, String>::new(|_, _, abort| {
        abort.abort_default();
        Ok(())
    });
    assert!(future.is_aborted());
    assert!(future.abort_signal().aborted());
    assert_eq!(
        event_loop::block_on(future.wait()),
        Some(Err(Error::Aborted(None)))
    );
}

#[rstest]
fn signal_stays_clear_for_rejections(setup: ()) {
    let _ = setup;
    let future = AbortableFuture::<i32, String>::reject("no".into());
    let fired = Rc::new(Cell::new(false));
    let flag = fired.clone();
    future.abort_signal().add_listener(move |_| flag.set(true));
    future.abort_default();
    event_loop::run();
    assert!(!fired.get());
    assert!(!future.abort_signal().aborted());
}

#[rstest]
fn chains_compose_with_await(setup: ()) {
    let _ = setup;
    let log = new_log();
    let entries = log.clone();
    let result = event_loop::block_on(async move {
        let first = AbortableFuture::<i32, String>::new(|resolve, _, _| {
            event_loop::set_timeout(5, move || resolve.resolve(2));
            Ok(())
        })
        .and_then(|v| Ok(Resolution::Value(v * 10)))
        .finally(move || {
            push(&entries, "cleanup");
            Ok(Resolution::Value(()))
        });
        let first = first.await?;
        let second = AbortableFuture::<i32, String>::reject("bad".into())
            .catch(|_| Ok(Resolution::Value(1)))
            .await?;
        Ok::<_, Error<String>>(first + second)
    });
    assert_eq!(result, Some(Ok(21)));
    assert_eq!(*log.borrow(), ["cleanup"]);
}
