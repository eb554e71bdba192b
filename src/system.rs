//! Controlled reboot orchestration.
//!
//! A controlled restart must flush volatile state first: counters
//! checkpoint their totals, FSM blocks persist their snapshots. Each
//! flushable component registers a [`RebootHandler`]; the rebooter runs
//! the whole fanout exactly once, in registration order, before
//! restarting the chip.

use log::{info, warn};

use std::cell::RefCell;
use std::rc::Rc;

/// Pre-restart flush hook. Infallible by contract: a handler that
/// cannot flush logs and lets the restart proceed.
pub trait RebootHandler {
    fn handle_reboot(&mut self);
}

impl<T: RebootHandler + ?Sized> RebootHandler for Rc<RefCell<T>> {
    fn handle_reboot(&mut self) {
        self.borrow_mut().handle_reboot()
    }
}

/// Ordered group of reboot handlers.
pub struct FanoutRebootHandler {
    handlers: Vec<Box<dyn RebootHandler>>,
}

impl FanoutRebootHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn add(&mut self, handler: Box<dyn RebootHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for FanoutRebootHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RebootHandler for FanoutRebootHandler {
    fn handle_reboot(&mut self) {
        for handler in &mut self.handlers {
            handler.handle_reboot();
        }
    }
}

/// Flushes the registered handlers, then restarts the chip. On host
/// builds the restart is logged only, so integration tests can exercise
/// the flush path.
pub struct SystemRebooter {
    fanout: FanoutRebootHandler,
}

impl SystemRebooter {
    pub fn new(fanout: FanoutRebootHandler) -> Self {
        Self { fanout }
    }

    pub fn reboot(&mut self) {
        info!("rebooter: flushing {} handlers", self.fanout.len());
        self.fanout.handle_reboot();
        warn!("rebooter: restarting");
        #[cfg(target_os = "espidf")]
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }
    }
}
