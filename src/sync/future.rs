//! Single-shot completion rendezvous.
//!
//! One context waits, another delivers exactly one completion status.
//! Built on [`Cond`] so several contexts may observe the same future;
//! `notify` broadcasts to all of them.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{Cond, lock_unpoisoned};
use crate::error::{Error, Result};

pub struct Future {
    completion: Mutex<Option<Result<()>>>,
    cond: Cond,
}

impl Future {
    pub fn new() -> Self {
        Self {
            completion: Mutex::new(None),
            cond: Cond::new(),
        }
    }

    /// Delivers the completion status and wakes every waiter.
    ///
    /// A future completes exactly once: a second call returns
    /// `Err(InvalidState)` and leaves the first status untouched.
    pub fn notify(&self, code: Result<()>) -> Result<()> {
        let mut completion = lock_unpoisoned(&self.completion);
        if completion.is_some() {
            return Err(Error::InvalidState);
        }
        *completion = Some(code);
        self.cond.broadcast();
        Ok(())
    }

    /// Blocks until the future completes or `timeout` expires
    /// (`None` = wait forever). Returns `Ok` once completed regardless
    /// of the delivered status; read it with [`Future::code`].
    pub fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut completion = lock_unpoisoned(&self.completion);
        while completion.is_none() {
            let remaining = match deadline {
                None => None,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::Timeout);
                    }
                    Some(deadline - now)
                }
            };
            completion = self.cond.wait(&self.completion, completion, remaining)?;
        }
        Ok(())
    }

    /// Non-blocking snapshot: `None` until completed.
    pub fn code(&self) -> Option<Result<()>> {
        *lock_unpoisoned(&self.completion)
    }
}

impl Default for Future {
    fn default() -> Self {
        Self::new()
    }
}
