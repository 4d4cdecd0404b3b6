#![allow(dead_code)]

use abortable_promise::event_loop;
use captains_log::{recipe, ConsoleTarget, Level};
use std::{cell::RefCell, rc::Rc};

// Initialize logging for the integration tests
pub fn init_logger() {
    // Every test calls this; only the first install takes effect.
    let _ = recipe::console_logger(ConsoleTarget::Stdout, Level::Debug)
        .test()
        .build();
    event_loop::reset();
}

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}
