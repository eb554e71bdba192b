//! Status codes shared by every Terranode subsystem.
//!
//! A single `Copy` status enum keeps the control loop's error handling
//! uniform. The taxonomy distinguishes *absence* (`NoData`), *didn't
//! finish* (`Timeout`) and *programmer error* (`InvalidArg`) from plain
//! failure, because callers react differently to each:
//!
//! - `NoData` from storage on a counter's first boot is normal, the
//!   counter starts from zero.
//! - `Timeout` from an async dispatch means the work may still complete
//!   later; its result is discarded.
//! - `InvalidArg` / `InvalidState` surface synchronously at wiring time
//!   and are the only codes callers usually treat as fatal.

use core::fmt;

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Generic, unspecified failure (storage I/O, peripheral fault).
    Failed,
    /// Requested data is absent. Expected and recoverable.
    NoData,
    /// Programmer/configuration error, e.g. a duplicate task id.
    InvalidArg,
    /// Operation is not valid in the current state, e.g. a full async
    /// queue or a second completion of a future.
    InvalidState,
    /// A blocking wait expired before the awaited event happened.
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed => write!(f, "operation failed"),
            Self::NoData => write!(f, "no data"),
            Self::InvalidArg => write!(f, "invalid argument"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::Timeout => write!(f, "timed out"),
        }
    }
}

impl std::error::Error for Error {}

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
