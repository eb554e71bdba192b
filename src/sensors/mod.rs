//! Sensor tasks built on the scheduling and FSM cores.

pub mod soil;
