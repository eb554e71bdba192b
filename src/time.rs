//! Monotonic time source abstraction.
//!
//! All durations in the core are measured in microseconds since boot,
//! delivered by a [`Clock`]. Counters and FSM blocks convert to their own
//! resolution (seconds, minutes) at the edge, so a single clock serves
//! every consumer. On device the clock is backed by `esp_timer_get_time()`
//! (see `adapters::time`); tests drive a [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};

pub const USECS_PER_MSEC: u64 = 1_000;
pub const USECS_PER_SEC: u64 = 1_000_000;
pub const USECS_PER_MIN: u64 = 60 * USECS_PER_SEC;
pub const USECS_PER_HOUR: u64 = 60 * USECS_PER_MIN;

/// Monotonic microsecond clock. Implementations never go backwards.
pub trait Clock: Send + Sync {
    /// Microseconds elapsed since boot.
    fn now_us(&self) -> u64;
}

/// Hand-driven clock for simulation and tests.
///
/// Time only moves when the owner advances it, which makes duration
/// arithmetic in tests exact instead of sleep-based.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now_us: AtomicU64::new(0),
        }
    }

    pub fn set_us(&self, value: u64) {
        self.now_us.store(value, Ordering::Release);
    }

    pub fn advance_us(&self, delta: u64) {
        self.now_us.fetch_add(delta, Ordering::AcqRel);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance_us(secs * USECS_PER_SEC);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::Acquire)
    }
}
