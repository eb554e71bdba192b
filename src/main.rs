//! Terranode firmware entry point.
//!
//! Wires the storage, clock, counters, soil FSM and schedulers together
//! and drives the cooperative main loop. All component logic lives in
//! the library crate; this file is composition only.
#![deny(unused_must_use)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};

use terranode::adapters::nvs::NvsStorage;
use terranode::adapters::time::MonotonicClock;
use terranode::config::SystemConfig;
use terranode::counter::{PersistentCounter, StateCounter, TimeCounter};
use terranode::fsm::{FsmBlock, FsmStore};
use terranode::scheduler::{
    AdaptiveDelayEstimator, AsyncFuncScheduler, DelayEstimator, FuncTask, PeriodicScheduler,
};
use terranode::sensors::soil::{AdcReader, SoilCalibration, SoilRegime, SoilSensor};
use terranode::storage::Storage;
use terranode::system::{FanoutRebootHandler, SystemRebooter};

/// Planned maintenance restart cadence.
const REBOOT_AFTER_SECS: u64 = 7 * 24 * 3600;

// ── Soil probe ADC ────────────────────────────────────────────

/// Capacitive probe on ADC1 channel 6 (GPIO34).
struct OnboardAdc;

impl OnboardAdc {
    fn init() -> Self {
        #[cfg(target_os = "espidf")]
        unsafe {
            use esp_idf_svc::sys::*;
            adc1_config_width(adc_bits_width_t_ADC_WIDTH_BIT_12);
            adc1_config_channel_atten(adc1_channel_t_ADC1_CHANNEL_6, adc_atten_t_ADC_ATTEN_DB_11);
        }
        Self
    }
}

impl AdcReader for OnboardAdc {
    #[cfg(target_os = "espidf")]
    fn read_raw(&mut self) -> terranode::Result<u16> {
        let raw = unsafe {
            esp_idf_svc::sys::adc1_get_raw(esp_idf_svc::sys::adc1_channel_t_ADC1_CHANNEL_6)
        };
        if raw < 0 {
            return Err(terranode::Error::Failed);
        }
        Ok(raw as u16)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_raw(&mut self) -> terranode::Result<u16> {
        // Simulation stub: mid-range reading.
        Ok(2000)
    }
}

// ── Entry point ───────────────────────────────────────────────

fn main() -> Result<()> {
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }

    info!("terranode v{} starting", env!("CARGO_PKG_VERSION"));

    // ── 1. Platform services ──────────────────────────────────
    let storage: Arc<dyn Storage> = Arc::new(NvsStorage::open("terranode")?);
    let clock = Arc::new(MonotonicClock::new());

    let config = {
        let loaded = SystemConfig::load(&*storage);
        if loaded.validate().is_err() {
            warn!("stored config invalid, using defaults");
            SystemConfig::default()
        } else {
            loaded
        }
    };

    // ── 2. Diagnostic counters ────────────────────────────────
    let uptime = Rc::new(RefCell::new(PersistentCounter::fresh(
        Arc::clone(&storage),
        TimeCounter::new(clock.clone(), "c_sys_uptime", Duration::from_secs(1)),
    )));
    let lifetime = Rc::new(RefCell::new(PersistentCounter::accumulating(
        Arc::clone(&storage),
        TimeCounter::new(clock.clone(), "c_sys_lifetime", Duration::from_secs(1)),
    )));

    // ── 3. Soil FSM, regime counters, sensor ──────────────────
    let soil_block = Rc::new(RefCell::new(FsmBlock::new(
        Arc::clone(&storage),
        clock.clone(),
        "soil_fsm",
        Duration::from_secs(1),
    )));
    let soil_store = FsmStore::new(Rc::clone(&soil_block), "soil");

    let dry_counter = Rc::new(RefCell::new(StateCounter::new(
        Arc::clone(&storage),
        clock.clone(),
        "c_soil_dry",
        Duration::from_secs(1),
        SoilRegime::Dry.as_state(),
    )));
    let wet_counter = Rc::new(RefCell::new(StateCounter::new(
        Arc::clone(&storage),
        clock.clone(),
        "c_soil_wet",
        Duration::from_secs(1),
        SoilRegime::Wet.as_state(),
    )));

    let mut soil_sensor = SoilSensor::new(
        OnboardAdc::init(),
        Rc::clone(&soil_block),
        SoilCalibration {
            value_min: config.soil_adc_min,
            value_max: config.soil_adc_max,
        },
    );
    soil_sensor.add_regime_counter(Rc::clone(&dry_counter));
    soil_sensor.add_regime_counter(Rc::clone(&wet_counter));

    // ── 4. Reboot orchestration ───────────────────────────────
    let mut reboot_fanout = FanoutRebootHandler::new();
    reboot_fanout.add(Box::new(Rc::clone(&uptime)));
    reboot_fanout.add(Box::new(Rc::clone(&lifetime)));
    reboot_fanout.add(Box::new(Rc::clone(&dry_counter)));
    reboot_fanout.add(Box::new(Rc::clone(&wet_counter)));
    reboot_fanout.add(Box::new(Rc::clone(&soil_block)));
    let rebooter = Rc::new(RefCell::new(SystemRebooter::new(reboot_fanout)));

    let uptime_guard = Rc::clone(&uptime);
    let reboot_guard = Rc::clone(&rebooter);
    let maintenance_reboot = FuncTask::new(move || {
        if uptime_guard.borrow().get() >= REBOOT_AFTER_SECS {
            reboot_guard.borrow_mut().reboot();
        }
        Ok(())
    });

    // ── 5. Cross-context dispatch ─────────────────────────────
    let async_scheduler = Arc::new(AsyncFuncScheduler::new(8));

    // ── 6. Periodic schedule ──────────────────────────────────
    let read_interval = Duration::from_millis(u64::from(config.soil_read_interval_ms));
    let control_interval = Duration::from_millis(u64::from(config.control_interval_ms));
    let save_interval = Duration::from_secs(u64::from(config.counter_save_interval_secs));
    let fsm_save_interval = Duration::from_secs(u64::from(config.fsm_save_interval_secs));

    let mut scheduler: PeriodicScheduler<10> = PeriodicScheduler::new(clock.clone(), "main");
    scheduler.add(Box::new(soil_sensor), "soil_read", read_interval)?;
    scheduler.add(Box::new(soil_store), "soil_fsm", control_interval)?;
    scheduler.add(Box::new(Arc::clone(&async_scheduler)), "async", control_interval)?;
    scheduler.add(Box::new(Rc::clone(&uptime)), "save_uptime", save_interval)?;
    scheduler.add(Box::new(Rc::clone(&lifetime)), "save_lifetime", save_interval)?;
    scheduler.add(Box::new(Rc::clone(&dry_counter)), "save_dry", save_interval)?;
    scheduler.add(Box::new(Rc::clone(&wet_counter)), "save_wet", save_interval)?;
    scheduler.add(Box::new(Rc::clone(&soil_block)), "save_fsm", fsm_save_interval)?;
    scheduler.add(Box::new(maintenance_reboot), "sys_reboot", Duration::from_secs(60))?;
    scheduler.start();

    // ── 7. Main loop ──────────────────────────────────────────
    let mut estimator = AdaptiveDelayEstimator::new(clock, Duration::from_millis(100));
    loop {
        estimator.begin();
        scheduler.run();
        thread::sleep(estimator.estimate());
    }
}
