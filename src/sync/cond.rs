//! FIFO condition variable.
//!
//! `std::sync::Condvar` does not promise wake order; this wrapper adds an
//! explicit wait queue so `signal()` always wakes the longest waiter.
//! Each waiter registers a slot in the queue *before* releasing the
//! caller's lock, which closes the classic lost-wakeup window between
//! "check predicate" and "park".
//!
//! Usage mirrors a monitor:
//!
//! ```ignore
//! let mut state = lock.lock().unwrap();
//! while !ready(&state) {
//!     state = cond.wait(&lock, state, Some(timeout))?;
//! }
//! ```
//!
//! On timeout the caller's lock is *not* held and `Err(Timeout)` is
//! returned; the timed-out waiter withdraws its queue slot so a later
//! `signal` is not spent on it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::lock_unpoisoned;
use crate::error::{Error, Result};

struct WaitSlot {
    notified: AtomicBool,
}

pub struct Cond {
    waiters: Mutex<VecDeque<Arc<WaitSlot>>>,
    cv: Condvar,
}

impl Cond {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
        }
    }

    /// Atomically releases `guard`, parks until signalled or until
    /// `timeout` expires (`None` = wait forever), then re-acquires the
    /// lock and returns the fresh guard.
    ///
    /// Spurious wakes are possible; callers loop on their predicate.
    pub fn wait<'a, T>(
        &self,
        lock: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
        timeout: Option<Duration>,
    ) -> Result<MutexGuard<'a, T>> {
        let slot = Arc::new(WaitSlot {
            notified: AtomicBool::new(false),
        });

        // Queue the slot before dropping the caller's guard so a signal
        // racing with this wait cannot slip between the two.
        let mut waiters = lock_unpoisoned(&self.waiters);
        waiters.push_back(Arc::clone(&slot));
        drop(guard);

        let deadline = timeout.map(|t| Instant::now() + t);
        while !slot.notified.load(Ordering::Acquire) {
            match deadline {
                None => {
                    waiters = self
                        .cv
                        .wait(waiters)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    let (reacquired, _) = self
                        .cv
                        .wait_timeout(waiters, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    waiters = reacquired;
                }
            }
        }

        if slot.notified.load(Ordering::Acquire) {
            drop(waiters);
            return Ok(lock_unpoisoned(lock));
        }

        // Timed out: withdraw so a later signal goes to a live waiter.
        waiters.retain(|w| !Arc::ptr_eq(w, &slot));
        drop(waiters);
        Err(Error::Timeout)
    }

    /// Wakes the waiter that has been parked the longest. No-op when the
    /// queue is empty. Callers should hold the predicate lock while
    /// changing the predicate, then signal.
    pub fn signal(&self) {
        let mut waiters = lock_unpoisoned(&self.waiters);
        if let Some(slot) = waiters.pop_front() {
            slot.notified.store(true, Ordering::Release);
            self.cv.notify_all();
        }
    }

    /// Wakes every parked waiter.
    pub fn broadcast(&self) {
        let mut waiters = lock_unpoisoned(&self.waiters);
        if waiters.is_empty() {
            return;
        }
        for slot in waiters.drain(..) {
            slot.notified.store(true, Ordering::Release);
        }
        self.cv.notify_all();
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        lock_unpoisoned(&self.waiters).len()
    }
}

impl Default for Cond {
    fn default() -> Self {
        Self::new()
    }
}
