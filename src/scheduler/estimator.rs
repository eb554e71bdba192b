//! Loop delay estimation.
//!
//! The periodic scheduler never sleeps itself; the outer loop brackets
//! each round with `begin()` / `estimate()` and sleeps for the returned
//! duration. The adaptive estimator compensates for time spent running
//! tasks so the round cadence stays close to the target.

use std::sync::Arc;
use std::time::Duration;

use crate::time::{Clock, USECS_PER_MSEC};

pub trait DelayEstimator {
    /// Marks the start of a scheduling round.
    fn begin(&mut self);

    /// Suggests how long the outer loop should sleep before the next
    /// round.
    fn estimate(&mut self) -> Duration;
}

/// Always suggests the same delay, regardless of round cost.
pub struct ConstantDelayEstimator {
    delay: Duration,
}

impl ConstantDelayEstimator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl DelayEstimator for ConstantDelayEstimator {
    fn begin(&mut self) {}

    fn estimate(&mut self) -> Duration {
        self.delay
    }
}

/// Target cadence minus the measured round cost, floored at 1 ms so a
/// slow round still yields the CPU.
pub struct AdaptiveDelayEstimator {
    clock: Arc<dyn Clock>,
    target_us: u64,
    begin_us: u64,
}

impl AdaptiveDelayEstimator {
    pub fn new(clock: Arc<dyn Clock>, target: Duration) -> Self {
        let target_us = target.as_micros() as u64;
        assert!(target_us >= USECS_PER_MSEC, "target below minimum delay");
        Self {
            clock,
            target_us,
            begin_us: 0,
        }
    }
}

impl DelayEstimator for AdaptiveDelayEstimator {
    fn begin(&mut self) {
        self.begin_us = self.clock.now_us();
    }

    fn estimate(&mut self) -> Duration {
        let elapsed = self.clock.now_us().saturating_sub(self.begin_us);
        let delay_us = self.target_us.saturating_sub(elapsed).max(USECS_PER_MSEC);
        Duration::from_micros(delay_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    #[test]
    fn constant_estimator_is_constant() {
        let mut estimator = ConstantDelayEstimator::new(Duration::from_millis(100));
        estimator.begin();
        assert_eq!(estimator.estimate(), Duration::from_millis(100));
        assert_eq!(estimator.estimate(), Duration::from_millis(100));
    }

    #[test]
    fn adaptive_estimator_subtracts_round_cost() {
        let clock = Arc::new(ManualClock::new());
        let mut estimator = AdaptiveDelayEstimator::new(clock.clone(), Duration::from_millis(100));
        estimator.begin();
        clock.advance_us(30 * USECS_PER_MSEC);
        assert_eq!(estimator.estimate(), Duration::from_millis(70));
    }

    #[test]
    fn adaptive_estimator_floors_on_slow_rounds() {
        let clock = Arc::new(ManualClock::new());
        let mut estimator = AdaptiveDelayEstimator::new(clock.clone(), Duration::from_millis(100));
        estimator.begin();
        clock.advance_us(250 * USECS_PER_MSEC);
        assert_eq!(estimator.estimate(), Duration::from_millis(1));
    }
}
