//! Cross-context synchronization primitives.
//!
//! The periodic schedulers are strictly single-context; any work that has
//! to cross between contexts goes through these primitives (or the async
//! dispatch queue built on top of them).

mod cond;
mod future;

pub use cond::Cond;
pub use future::Future;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the guard if a panicking holder poisoned it.
/// The firmware treats poisoning as survivable: the protected data is
/// plain state with no invariants that a panic can break mid-update.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
