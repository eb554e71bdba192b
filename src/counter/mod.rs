//! Diagnostic counters.
//!
//! A counter is a monotone `u64` quantity (uptime seconds, lifetime
//! hours, time spent in a soil regime). Live counters derive their value
//! from the clock; the persistent wrappers in [`persistent`] checkpoint
//! them to storage so the totals survive reboots.

mod persistent;
mod state;

pub use persistent::PersistentCounter;
pub use state::StateCounter;

use std::sync::Arc;
use std::time::Duration;

use crate::storage::clip_key;
use crate::time::Clock;

/// Live counter contract used by the persistent wrappers.
pub trait Counter {
    /// Storage key and log id, already clipped to the NVS key limit.
    fn id(&self) -> &str;

    /// Current value. Pure and non-blocking.
    fn get(&self) -> u64;

    /// Restarts the live delta from zero. Called after a checkpoint has
    /// absorbed the delta into the persisted baseline.
    fn rebase(&mut self);
}

/// Clock-driven live counter: `(now - offset) / resolution`.
pub struct TimeCounter {
    id: heapless::String<{ crate::storage::MAX_KEY_LEN }>,
    clock: Arc<dyn Clock>,
    resolution_us: u64,
    offset_us: u64,
}

impl TimeCounter {
    /// `resolution` is the unit one count represents, e.g. 1 s for an
    /// uptime counter. Counts from boot (offset 0).
    pub fn new(clock: Arc<dyn Clock>, id: &str, resolution: Duration) -> Self {
        let resolution_us = resolution.as_micros() as u64;
        assert!(resolution_us > 0, "counter resolution must be non-zero");
        Self {
            id: clip_key(id),
            clock,
            resolution_us,
            offset_us: 0,
        }
    }
}

impl Counter for TimeCounter {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self) -> u64 {
        let now = self.clock.now_us();
        now.saturating_sub(self.offset_us) / self.resolution_us
    }

    fn rebase(&mut self) {
        self.offset_us = self.clock.now_us();
    }
}
