//! Task scheduling core.
//!
//! Two cooperating modes:
//!
//! - [`PeriodicScheduler`] polls registered tasks at fixed intervals from
//!   a single owner context. Nothing here is thread-safe by design; the
//!   owner context is the serialization point.
//! - [`AsyncFuncScheduler`] carries closures *into* that context from
//!   other contexts (timer callbacks, network handlers), with a
//!   [`crate::sync::Future`] handed back for the result.

mod async_func;
mod estimator;
mod periodic;

pub use async_func::{AsyncFunc, AsyncFuncScheduler};
pub use estimator::{AdaptiveDelayEstimator, ConstantDelayEstimator, DelayEstimator};
pub use periodic::PeriodicScheduler;

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;

/// Unit of schedulable work.
pub trait Task {
    fn run(&mut self) -> Result<()>;
}

/// Shared objects (a counter that is both a task and a reboot handler)
/// register through an `Rc<RefCell<_>>` clone.
impl<T: Task + ?Sized> Task for Rc<RefCell<T>> {
    fn run(&mut self) -> Result<()> {
        self.borrow_mut().run()
    }
}

/// Adapts a closure into a [`Task`] for lightweight wiring.
pub struct FuncTask<F: FnMut() -> Result<()>>(F);

impl<F: FnMut() -> Result<()>> FuncTask<F> {
    pub fn new(func: F) -> Self {
        Self(func)
    }
}

impl<F: FnMut() -> Result<()>> Task for FuncTask<F> {
    fn run(&mut self) -> Result<()> {
        (self.0)()
    }
}

/// Ordered task group. Every child runs on every round; the first
/// failure is reported after the whole group has run.
pub struct FanoutTask {
    tasks: Vec<Box<dyn Task>>,
}

impl FanoutTask {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn add(&mut self, task: Box<dyn Task>) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for FanoutTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for FanoutTask {
    fn run(&mut self) -> Result<()> {
        let mut first_failure = Ok(());
        for task in &mut self.tasks {
            let code = task.run();
            if code.is_err() && first_failure.is_ok() {
                first_failure = code;
            }
        }
        first_failure
    }
}
