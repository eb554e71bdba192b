//! FSM-gated persistent counter.
//!
//! Accumulates time only while an observed FSM state equals the required
//! state. One contiguous occupancy of the required state is a *cycle*:
//!
//! - Entering the required state for the first time after construction
//!   continues the persisted cycle (the node may have rebooted mid-cycle).
//! - Leaving stops accumulation; the live, un-checkpointed delta is
//!   deliberately discarded. What storage holds is what the cycle counts.
//! - Re-entering after having left starts a new cycle: the stored value
//!   is dropped and counting restarts from zero.
//!
//! Periodic `run()` checkpoints the running total, bounding the loss on
//! a power cut to one checkpoint interval.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::fsm::State;
use crate::scheduler::Task;
use crate::storage::{self, Storage, clip_key};
use crate::system::RebootHandler;
use crate::time::Clock;

pub struct StateCounter {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    id: heapless::String<{ crate::storage::MAX_KEY_LEN }>,
    resolution_us: u64,
    required_state: State,
    current_state: State,
    baseline: u64,
    entered_at_us: Option<u64>,
    held_before: bool,
}

impl StateCounter {
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        id: &str,
        resolution: Duration,
        required_state: State,
    ) -> Self {
        let resolution_us = resolution.as_micros() as u64;
        assert!(resolution_us > 0, "counter resolution must be non-zero");
        assert!(required_state != 0, "state 0 is reserved for unset");

        let id = clip_key(id);
        let baseline = match storage::read_u64(&storage, &id) {
            Ok(value) => value,
            Err(Error::NoData) => 0,
            Err(err) => {
                warn!("counter={id}: restore failed, starting from zero: {err}");
                0
            }
        };
        Self {
            storage,
            clock,
            id,
            resolution_us,
            required_state,
            current_state: 0,
            baseline,
            entered_at_us: None,
            held_before: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Feeds the counter the latest observed state. Unchanged states are
    /// ignored, so callers may report on every poll.
    pub fn update(&mut self, state: State) {
        if state == self.current_state {
            return;
        }
        if state == self.required_state {
            self.enter();
        } else if self.current_state == self.required_state {
            self.leave();
        }
        debug!(
            "counter={}: state {} -> {}",
            self.id, self.current_state, state
        );
        self.current_state = state;
    }

    fn enter(&mut self) {
        if self.held_before {
            // New cycle: the previous cycle's total is stale now.
            match self.storage.erase(&self.id) {
                Ok(()) | Err(Error::NoData) => {}
                Err(err) => {
                    warn!("counter={}: failed to drop stale total: {err}", self.id);
                }
            }
            self.baseline = 0;
        }
        self.entered_at_us = Some(self.clock.now_us());
        self.held_before = true;
    }

    fn leave(&mut self) {
        // The un-checkpointed delta is dropped on purpose; storage keeps
        // the last checkpoint of this cycle.
        self.entered_at_us = None;
    }

    /// Running total: checkpointed baseline plus the live delta while
    /// the required state is held.
    pub fn get(&self) -> u64 {
        match self.entered_at_us {
            Some(entered) => {
                let elapsed = self.clock.now_us().saturating_sub(entered);
                self.baseline + elapsed / self.resolution_us
            }
            None => self.baseline,
        }
    }

    /// Persists the running total and absorbs the delta. No-op while the
    /// required state is not held.
    pub fn save(&mut self) -> Result<()> {
        if self.entered_at_us.is_none() {
            return Ok(());
        }
        let total = self.get();
        storage::write_u64(&self.storage, &self.id, total)?;
        self.baseline = total;
        self.entered_at_us = Some(self.clock.now_us());
        Ok(())
    }
}

impl Task for StateCounter {
    fn run(&mut self) -> Result<()> {
        self.save()
    }
}

impl RebootHandler for StateCounter {
    fn handle_reboot(&mut self) {
        if let Err(err) = self.save() {
            warn!("counter={}: reboot save failed: {err}", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsStorage;
    use crate::time::ManualClock;

    const REQUIRED: State = 2;
    const OTHER: State = 3;

    fn fixture() -> (Arc<ManualClock>, Arc<dyn Storage>) {
        let clock = Arc::new(ManualClock::new());
        let storage: Arc<dyn Storage> = Arc::new(NvsStorage::open("test").unwrap());
        (clock, storage)
    }

    fn counter(clock: &Arc<ManualClock>, storage: &Arc<dyn Storage>) -> StateCounter {
        StateCounter::new(
            storage.clone(),
            clock.clone(),
            "c_soil_dry",
            Duration::from_secs(1),
            REQUIRED,
        )
    }

    #[test]
    fn restores_baseline_and_stays_dormant() {
        let (clock, storage) = fixture();
        storage::write_u64(&storage, "c_soil_dry", 24).unwrap();
        let counter = counter(&clock, &storage);
        assert_eq!(counter.get(), 24);
        clock.advance_secs(100);
        assert_eq!(counter.get(), 24, "dormant counter must not accumulate");
    }

    #[test]
    fn first_entry_continues_the_persisted_cycle() {
        let (clock, storage) = fixture();
        storage::write_u64(&storage, "c_soil_dry", 24).unwrap();
        let mut counter = counter(&clock, &storage);
        counter.update(REQUIRED);
        assert_eq!(counter.get(), 24, "entry itself adds nothing");
        clock.advance_secs(6);
        assert_eq!(counter.get(), 30);
        assert_eq!(
            storage::read_u64(&storage, "c_soil_dry").unwrap(),
            24,
            "no save happened yet"
        );
    }

    #[test]
    fn leaving_discards_the_live_delta() {
        let (clock, storage) = fixture();
        storage::write_u64(&storage, "c_soil_dry", 24).unwrap();
        let mut counter = counter(&clock, &storage);
        counter.update(REQUIRED);
        clock.advance_secs(10);
        counter.update(OTHER);
        assert_eq!(counter.get(), 24, "un-checkpointed delta is dropped");
        clock.advance_secs(50);
        assert_eq!(counter.get(), 24);
    }

    #[test]
    fn checkpoint_bounds_the_loss() {
        let (clock, storage) = fixture();
        storage::write_u64(&storage, "c_soil_dry", 24).unwrap();
        let mut counter = counter(&clock, &storage);
        counter.update(REQUIRED);
        clock.advance_secs(10);
        counter.run().unwrap();
        assert_eq!(storage::read_u64(&storage, "c_soil_dry").unwrap(), 34);
        clock.advance_secs(5);
        counter.update(OTHER);
        assert_eq!(counter.get(), 34, "value falls back to last checkpoint");
    }

    #[test]
    fn reentry_starts_a_new_cycle() {
        let (clock, storage) = fixture();
        storage::write_u64(&storage, "c_soil_dry", 24).unwrap();
        let mut counter = counter(&clock, &storage);
        counter.update(REQUIRED);
        clock.advance_secs(10);
        counter.run().unwrap();
        counter.update(OTHER);
        clock.advance_secs(100);

        counter.update(REQUIRED);
        assert_eq!(counter.get(), 0, "new cycle restarts from zero");
        assert_eq!(
            storage::read_u64(&storage, "c_soil_dry"),
            Err(Error::NoData),
            "stale total must be erased"
        );
        clock.advance_secs(3);
        assert_eq!(counter.get(), 3);
    }

    #[test]
    fn save_absorbs_delta_without_double_counting() {
        let (clock, storage) = fixture();
        let mut counter = counter(&clock, &storage);
        counter.update(REQUIRED);
        clock.advance_secs(7);
        counter.save().unwrap();
        counter.save().unwrap();
        assert_eq!(storage::read_u64(&storage, "c_soil_dry").unwrap(), 7);
        assert_eq!(counter.get(), 7);
    }

    #[test]
    fn dormant_save_is_a_no_op() {
        let (clock, storage) = fixture();
        let mut counter = counter(&clock, &storage);
        counter.run().unwrap();
        assert_eq!(storage::read_u64(&storage, "c_soil_dry"), Err(Error::NoData));
        counter.update(OTHER);
        counter.run().unwrap();
        assert_eq!(storage::read_u64(&storage, "c_soil_dry"), Err(Error::NoData));
    }

    #[test]
    fn repeated_same_state_updates_are_ignored() {
        let (clock, storage) = fixture();
        let mut counter = counter(&clock, &storage);
        counter.update(REQUIRED);
        clock.advance_secs(4);
        // A repeated report must not re-anchor the entry time.
        counter.update(REQUIRED);
        clock.advance_secs(4);
        assert_eq!(counter.get(), 8);
    }
}
