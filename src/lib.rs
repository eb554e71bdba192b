//! Terranode — soil/climate sensor node firmware core.
//!
//! FSM-driven persistent diagnostic counters plus a dual-mode task
//! scheduling core for ESP32-class nodes. The crate is host-first: the
//! whole core runs and tests on the development machine; the `espidf`
//! feature swaps in the ESP-IDF backends.
//!
//! ```text
//!                    ┌──────────────────────┐
//!   other contexts ─►│  AsyncFuncScheduler  │──┐
//!                    └──────────────────────┘  │ drain
//!                                              ▼
//!  ┌───────────┐  run   ┌────────────────────────────┐
//!  │ main loop │───────►│  PeriodicScheduler         │
//!  └───────────┘        │   ├─ SoilSensor ──┐        │
//!       ▲               │   ├─ FsmStore ◄───┘ next   │
//!       │ estimate      │   ├─ StateCounter saves    │
//!  DelayEstimator       │   └─ PersistentCounter     │
//!                       └─────────────┬──────────────┘
//!                                     │ u64 cells / postcard blobs
//!                              ┌──────▼──────┐
//!                              │   Storage   │ (NVS)
//!                              └─────────────┘
//! ```
//!
//! Error policy is liveness over strict correctness: a failed storage
//! write or handler is logged and retried on the next round; only
//! wiring-time programmer errors surface synchronously.

pub mod adapters;
pub mod config;
pub mod counter;
pub mod error;
pub mod fsm;
pub mod scheduler;
pub mod sensors;
pub mod storage;
pub mod sync;
pub mod system;
pub mod time;

pub use error::{Error, Result};
