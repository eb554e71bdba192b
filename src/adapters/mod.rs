//! Platform adapters behind the core's ports.
//!
//! Every adapter compiles for two targets: the real ESP-IDF peripheral
//! on `target_os = "espidf"` and a simulation backend for host tests.

pub mod nvs;
pub mod time;
