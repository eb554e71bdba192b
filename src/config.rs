//! System configuration parameters.
//!
//! All tunable parameters for a Terranode sensor node. Values persist in
//! NVS as one postcard blob; every field is range-checked before a save
//! so a bad provisioning write can never brick the control loop.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::Storage;

const CONFIG_KEY: &str = "syscfg";
const CONFIG_BUF_LEN: usize = 128;

/// Core system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Soil probe calibration ---
    /// Raw ADC reading with the probe in water (fully saturated).
    pub soil_adc_min: u16,
    /// Raw ADC reading with the probe in dry air.
    pub soil_adc_max: u16,

    // --- Timing ---
    /// Soil probe read interval (milliseconds).
    pub soil_read_interval_ms: u32,
    /// FSM store round interval (milliseconds).
    pub control_interval_ms: u32,
    /// Counter checkpoint interval (seconds).
    pub counter_save_interval_secs: u32,
    /// FSM snapshot save interval (seconds).
    pub fsm_save_interval_secs: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Typical capacitive probe endpoints on a 12-bit ADC
            soil_adc_min: 1100,
            soil_adc_max: 2900,

            soil_read_interval_ms: 2_000,
            control_interval_ms: 1_000,
            counter_save_interval_secs: 3_600, // hourly
            fsm_save_interval_secs: 600,
        }
    }
}

impl SystemConfig {
    pub fn validate(&self) -> Result<()> {
        if self.soil_adc_min >= self.soil_adc_max {
            warn!("config: soil calibration endpoints inverted");
            return Err(Error::InvalidArg);
        }
        if !(100..=60_000).contains(&self.soil_read_interval_ms) {
            warn!("config: soil_read_interval_ms out of 100..=60000");
            return Err(Error::InvalidArg);
        }
        if !(100..=60_000).contains(&self.control_interval_ms) {
            warn!("config: control_interval_ms out of 100..=60000");
            return Err(Error::InvalidArg);
        }
        if !(10..=86_400).contains(&self.counter_save_interval_secs) {
            warn!("config: counter_save_interval_secs out of 10..=86400");
            return Err(Error::InvalidArg);
        }
        if !(10..=86_400).contains(&self.fsm_save_interval_secs) {
            warn!("config: fsm_save_interval_secs out of 10..=86400");
            return Err(Error::InvalidArg);
        }
        Ok(())
    }

    /// Loads the stored config; absent or undecodable blobs fall back to
    /// defaults so a corrupt cell never blocks boot.
    pub fn load(storage: &dyn Storage) -> Self {
        let mut buf = [0u8; CONFIG_BUF_LEN];
        match storage.read(CONFIG_KEY, &mut buf) {
            Ok(len) => match postcard::from_bytes(&buf[..len]) {
                Ok(config) => {
                    info!("config: loaded from storage");
                    config
                }
                Err(err) => {
                    warn!("config: stored blob undecodable, using defaults: {err}");
                    Self::default()
                }
            },
            Err(Error::NoData) => {
                info!("config: no stored config, using defaults");
                Self::default()
            }
            Err(err) => {
                warn!("config: load failed, using defaults: {err}");
                Self::default()
            }
        }
    }

    /// Validates, then persists as a postcard blob.
    pub fn save(&self, storage: &dyn Storage) -> Result<()> {
        self.validate()?;
        let bytes = postcard::to_allocvec(self).map_err(|err| {
            warn!("config: encode failed: {err}");
            Error::Failed
        })?;
        storage.write(CONFIG_KEY, &bytes)
    }
}
