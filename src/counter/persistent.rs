//! Persistent wrapper over a live counter.
//!
//! The persisted cell holds the last checkpointed total; the live counter
//! contributes the delta accrued since that checkpoint. `save()` absorbs
//! the delta into the baseline, so the quantity survives a controlled
//! reboot exactly and loses at most one checkpoint interval on an
//! unplanned power cut. That loss boundary is accepted, not an error.

use std::sync::Arc;

use log::{info, warn};

use crate::error::{Error, Result};
use crate::scheduler::Task;
use crate::storage::{self, Storage};
use crate::system::RebootHandler;

use super::Counter;

pub struct PersistentCounter<C: Counter> {
    storage: Arc<dyn Storage>,
    counter: C,
    baseline: u64,
}

impl<C: Counter> PersistentCounter<C> {
    /// Lifetime-style counter: the persisted baseline carries over.
    pub fn accumulating(storage: Arc<dyn Storage>, counter: C) -> Self {
        let baseline = Self::restore(&storage, counter.id());
        Self {
            storage,
            counter,
            baseline,
        }
    }

    /// Session-style counter: any persisted value is dropped at
    /// construction, so the total never carries across boots.
    pub fn session(storage: Arc<dyn Storage>, counter: C) -> Self {
        Self::erase_at_boot(storage, counter)
    }

    /// Boot-fresh counter (uptime): identical reset-at-construction
    /// behavior, kept as a named variant for wiring clarity.
    pub fn fresh(storage: Arc<dyn Storage>, counter: C) -> Self {
        Self::erase_at_boot(storage, counter)
    }

    fn erase_at_boot(storage: Arc<dyn Storage>, counter: C) -> Self {
        match storage.erase(counter.id()) {
            Ok(()) | Err(Error::NoData) => {}
            Err(err) => {
                warn!(
                    "counter={}: failed to drop stale persisted value: {err}",
                    counter.id()
                );
            }
        }
        Self {
            storage,
            counter,
            baseline: 0,
        }
    }

    fn restore(storage: &Arc<dyn Storage>, id: &str) -> u64 {
        match storage::read_u64(storage, id) {
            Ok(value) => {
                info!("counter={id}: restored baseline={value}");
                value
            }
            Err(Error::NoData) => 0,
            Err(err) => {
                // Unreadable cells are treated as absent; liveness wins.
                warn!("counter={id}: restore failed, starting from zero: {err}");
                0
            }
        }
    }

    pub fn id(&self) -> &str {
        self.counter.id()
    }

    /// Persisted baseline plus the live delta.
    pub fn get(&self) -> u64 {
        self.baseline + self.counter.get()
    }

    /// Checkpoints the current total, then absorbs the delta: the
    /// baseline becomes the total and the live counter restarts from
    /// zero. On write failure nothing is absorbed and the next save
    /// retries with the full delta intact.
    pub fn save(&mut self) -> Result<()> {
        let total = self.get();
        storage::write_u64(&self.storage, self.counter.id(), total)?;
        self.baseline = total;
        self.counter.rebase();
        Ok(())
    }

    /// Drops the persisted value and resets the baseline. An absent cell
    /// yields `Err(NoData)`, which callers treat as soft.
    pub fn invalidate(&mut self) -> Result<()> {
        match self.storage.erase(self.counter.id()) {
            Ok(()) => {
                self.baseline = 0;
                Ok(())
            }
            Err(Error::NoData) => {
                self.baseline = 0;
                Err(Error::NoData)
            }
            Err(err) => Err(err),
        }
    }
}

impl<C: Counter> Task for PersistentCounter<C> {
    fn run(&mut self) -> Result<()> {
        self.save()
    }
}

impl<C: Counter> RebootHandler for PersistentCounter<C> {
    fn handle_reboot(&mut self) {
        if let Err(err) = self.save() {
            warn!("counter={}: reboot save failed: {err}", self.counter.id());
        }
    }
}
