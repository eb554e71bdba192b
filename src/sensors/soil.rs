//! Resistive soil moisture sensor.
//!
//! Maps a raw ADC reading onto a moisture percentage and a coarse
//! [`SoilRegime`], then feeds the regime into the FSM block (which the
//! store commits on its own cadence) and into the per-regime state
//! counters. The ADC driver itself is behind [`AdcReader`]; on device it
//! wraps the ESP-IDF oneshot ADC, in tests a stub.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use log::debug;

use crate::counter::StateCounter;
use crate::error::Result;
use crate::fsm::{FsmBlock, State};
use crate::scheduler::Task;

/// Raw ADC access. `read_raw` returns the converted sample.
pub trait AdcReader {
    fn read_raw(&mut self) -> Result<u16>;
}

/// Coarse soil condition derived from the calibrated ADC range.
/// `0` stays reserved for "no reading yet" to match the FSM convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SoilRegime {
    None = 0,
    Saturated = 1,
    Wet = 2,
    Depletion = 3,
    Dry = 4,
}

impl SoilRegime {
    pub fn as_state(self) -> State {
        self as State
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Saturated => "saturated",
            Self::Wet => "wet",
            Self::Depletion => "depletion",
            Self::Dry => "dry",
        }
    }
}

/// ADC endpoints measured during probe calibration: `value_min` read in
/// water, `value_max` read in dry air. Higher raw value = drier soil.
#[derive(Debug, Clone, Copy)]
pub struct SoilCalibration {
    pub value_min: u16,
    pub value_max: u16,
}

impl SoilCalibration {
    fn span(&self) -> u16 {
        self.value_max - self.value_min
    }
}

/// Last published measurement.
#[derive(Debug, Clone, Copy)]
pub struct SoilData {
    pub raw: u16,
    pub moisture_pct: u8,
    pub prev_regime: SoilRegime,
    pub curr_regime: SoilRegime,
    /// Time spent in the current regime, in the FSM block's resolution.
    pub curr_regime_duration: u64,
}

impl Default for SoilData {
    fn default() -> Self {
        Self {
            raw: 0,
            moisture_pct: 0,
            prev_regime: SoilRegime::None,
            curr_regime: SoilRegime::None,
            curr_regime_duration: 0,
        }
    }
}

pub struct SoilSensor<R: AdcReader> {
    reader: R,
    block: Rc<RefCell<FsmBlock>>,
    calibration: SoilCalibration,
    regime_counters: Vec<Rc<RefCell<StateCounter>>>,
    data: SoilData,
}

impl<R: AdcReader> SoilSensor<R> {
    pub fn new(reader: R, block: Rc<RefCell<FsmBlock>>, calibration: SoilCalibration) -> Self {
        assert!(
            calibration.value_min < calibration.value_max,
            "calibration endpoints inverted"
        );
        Self {
            reader,
            block,
            calibration,
            regime_counters: Vec::new(),
            data: SoilData::default(),
        }
    }

    /// Registers a counter to be fed the regime on every reading.
    pub fn add_regime_counter(&mut self, counter: Rc<RefCell<StateCounter>>) {
        self.regime_counters.push(counter);
    }

    pub fn data(&self) -> SoilData {
        self.data
    }

    fn classify(&self, raw: u16) -> SoilRegime {
        let clamped = raw.clamp(self.calibration.value_min, self.calibration.value_max);
        let offset = u32::from(clamped - self.calibration.value_min);
        let span = u32::from(self.calibration.span());
        // Quarter bands across the calibrated range, wet to dry.
        match offset * 4 / span {
            0 => SoilRegime::Saturated,
            1 => SoilRegime::Wet,
            2 => SoilRegime::Depletion,
            _ => SoilRegime::Dry,
        }
    }

    fn moisture_pct(&self, raw: u16) -> u8 {
        let clamped = raw.clamp(self.calibration.value_min, self.calibration.value_max);
        let dry_side = u32::from(self.calibration.value_max - clamped);
        (dry_side * 100 / u32::from(self.calibration.span())) as u8
    }
}

impl<R: AdcReader> Task for SoilSensor<R> {
    fn run(&mut self) -> Result<()> {
        let raw = self.reader.read_raw()?;
        let regime = self.classify(raw);
        let state = regime.as_state();

        let mut block = self.block.borrow_mut();
        block.set_next(state);
        block.update();

        for counter in &self.regime_counters {
            counter.borrow_mut().update(state);
        }

        let prev_regime = if regime == self.data.curr_regime {
            self.data.prev_regime
        } else {
            self.data.curr_regime
        };
        self.data = SoilData {
            raw,
            moisture_pct: self.moisture_pct(raw),
            prev_regime,
            curr_regime: regime,
            curr_regime_duration: block.current_state_duration(),
        };
        debug!(
            "soil: raw={raw} moisture={}% regime={}",
            self.data.moisture_pct,
            regime.as_str()
        );
        Ok(())
    }
}
