//! Fixed-capacity cooperative periodic scheduler.
//!
//! Tasks register once at wiring time with an id and an interval; each
//! `run()` round executes every due task in registration order. A task
//! is charged its slot time whether it succeeds or not, and failures
//! never stop the round: a flaky sensor must not starve the watchdog
//! feeder behind it.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use super::Task;
use crate::error::{Error, Result};
use crate::time::{Clock, USECS_PER_MSEC};

const MAX_TASK_ID_LEN: usize = 16;

/// Intervals below this are a configuration error.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct Entry {
    id: heapless::String<MAX_TASK_ID_LEN>,
    task: Box<dyn Task>,
    interval_us: u64,
    last_run_us: Option<u64>,
}

/// `N` is the compile-time task slot count.
pub struct PeriodicScheduler<const N: usize> {
    id: heapless::String<MAX_TASK_ID_LEN>,
    clock: Arc<dyn Clock>,
    entries: heapless::Vec<Entry, N>,
}

impl<const N: usize> PeriodicScheduler<N> {
    pub fn new(clock: Arc<dyn Clock>, id: &str) -> Self {
        let mut end = id.len().min(MAX_TASK_ID_LEN);
        while !id.is_char_boundary(end) {
            end -= 1;
        }
        let mut clipped = heapless::String::new();
        let _ = clipped.push_str(&id[..end]);
        Self {
            id: clipped,
            clock,
            entries: heapless::Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers a task. `Err(Failed)` when every slot is taken,
    /// `Err(InvalidArg)` on a duplicate id or an interval below
    /// [`MIN_INTERVAL`].
    pub fn add(&mut self, task: Box<dyn Task>, id: &str, interval: Duration) -> Result<()> {
        if interval < MIN_INTERVAL {
            warn!("scheduler={}: task={id}: interval below 1ms", self.id);
            return Err(Error::InvalidArg);
        }
        if id.is_empty() || id.len() > MAX_TASK_ID_LEN {
            warn!("scheduler={}: task={id}: invalid id length", self.id);
            return Err(Error::InvalidArg);
        }
        if self.entries.iter().any(|entry| entry.id.as_str() == id) {
            warn!("scheduler={}: task={id}: duplicate id", self.id);
            return Err(Error::InvalidArg);
        }

        let mut entry_id = heapless::String::new();
        let _ = entry_id.push_str(id);
        let entry = Entry {
            id: entry_id,
            task,
            interval_us: interval.as_micros() as u64,
            last_run_us: None,
        };
        self.entries.push(entry).map_err(|_| {
            warn!("scheduler={}: task={id}: no free slot", self.id);
            Error::Failed
        })?;
        Ok(())
    }

    /// Logs the configured task set. Call once after wiring.
    pub fn start(&self) {
        let min_interval_us = self
            .entries
            .iter()
            .map(|entry| entry.interval_us)
            .min()
            .unwrap_or(0);
        info!(
            "scheduler={}: start: tasks={}/{} min_interval_ms={}",
            self.id,
            self.entries.len(),
            N,
            min_interval_us / USECS_PER_MSEC
        );
    }

    pub fn stop(&self) {
        info!("scheduler={}: stop", self.id);
    }

    /// One scheduling round: runs every due task in registration order.
    /// A task's first round is always due. Failures are logged and the
    /// round continues; the slot time is charged either way.
    pub fn run(&mut self) {
        for entry in &mut self.entries {
            let now = self.clock.now_us();
            let due = match entry.last_run_us {
                None => true,
                Some(last) => now.saturating_sub(last) >= entry.interval_us,
            };
            if !due {
                continue;
            }
            if let Err(err) = entry.task.run() {
                warn!("scheduler={}: task={}: {err}", self.id, entry.id);
            }
            entry.last_run_us = Some(now);
        }
    }
}
