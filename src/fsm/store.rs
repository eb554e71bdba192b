//! Handler dispatch around an [`FsmBlock`].
//!
//! The store runs per-state handler lists on every scheduling round and
//! commits pending transitions with a deliberate one-round straddle:
//! when a transition is requested in round N, round N+1 first lets the
//! old state's handlers finish (`handle_transit`), then commits. The
//! old state therefore sees exactly one extra `handle_state` round
//! between request and commit.

use std::rc::Rc;
use std::cell::RefCell;

use log::{info, warn};

use super::{FsmBlock, FsmHandler, State};
use crate::error::Result;
use crate::scheduler::Task;

/// Where the store stands in the transition protocol. `Finalizing` is
/// only ever observable from inside a handler callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitPhase {
    /// No transition in flight.
    Steady,
    /// A transition was requested last round; the next round commits it.
    Pending,
    /// Old-state handlers are being flushed before the commit.
    Finalizing,
}

struct StateHandlers {
    state: State,
    handlers: Vec<Box<dyn FsmHandler>>,
}

pub struct FsmStore {
    id: heapless::String<16>,
    block: Rc<RefCell<FsmBlock>>,
    registry: Vec<StateHandlers>,
    phase: TransitPhase,
}

impl FsmStore {
    pub fn new(block: Rc<RefCell<FsmBlock>>, id: &str) -> Self {
        let mut clipped = heapless::String::new();
        let mut end = id.len().min(16);
        while !id.is_char_boundary(end) {
            end -= 1;
        }
        let _ = clipped.push_str(&id[..end]);
        Self {
            id: clipped,
            block,
            registry: Vec::new(),
            phase: TransitPhase::Steady,
        }
    }

    /// Registers a handler for `state`. Handlers run in registration
    /// order; the same handler object may be registered for several
    /// states via an `Rc<RefCell<_>>` clone.
    pub fn add(&mut self, state: State, handler: Box<dyn FsmHandler>) {
        match self.registry.iter_mut().find(|entry| entry.state == state) {
            Some(entry) => entry.handlers.push(handler),
            None => self.registry.push(StateHandlers {
                state,
                handlers: vec![handler],
            }),
        }
    }

    pub fn phase(&self) -> TransitPhase {
        self.phase
    }

    fn dispatch_state(&mut self, state: State) {
        let Some(entry) = self
            .registry
            .iter_mut()
            .find(|entry| entry.state == state)
        else {
            return;
        };
        for handler in &mut entry.handlers {
            if let Err(err) = handler.handle_state() {
                warn!("fsm-store={}: state handler failed: {err}", self.id);
            }
        }
    }

    fn finalize_transit(&mut self, state: State) {
        self.phase = TransitPhase::Finalizing;
        if let Some(entry) = self
            .registry
            .iter_mut()
            .find(|entry| entry.state == state)
        {
            for handler in &mut entry.handlers {
                if let Err(err) = handler.handle_transit() {
                    warn!("fsm-store={}: transit handler failed: {err}", self.id);
                }
            }
        }
        if let Err(err) = self.block.borrow_mut().transit() {
            warn!("fsm-store={}: transit persist failed: {err}", self.id);
        }
        self.phase = TransitPhase::Steady;
    }
}

impl Task for FsmStore {
    fn run(&mut self) -> Result<()> {
        self.block.borrow_mut().update();

        if self.phase == TransitPhase::Pending {
            let old_state = self.block.borrow().current_state();
            self.finalize_transit(old_state);
        }

        let state = self.block.borrow().current_state();
        self.dispatch_state(state);

        if self.block.borrow().is_in_transit() {
            if self.phase == TransitPhase::Steady {
                info!(
                    "fsm-store={}: transit begun: {} -> {}",
                    self.id,
                    self.block.borrow().current_state(),
                    self.block.borrow().next_state()
                );
            }
            self.phase = TransitPhase::Pending;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsStorage;
    use crate::error::Error;
    use crate::storage::Storage;
    use crate::time::ManualClock;
    use std::sync::Arc;
    use std::time::Duration;

    struct Probe {
        calls: Vec<&'static str>,
        state_result: Result<()>,
    }

    impl Probe {
        fn new() -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                calls: Vec::new(),
                state_result: Ok(()),
            }))
        }
    }

    impl FsmHandler for Probe {
        fn handle_state(&mut self) -> Result<()> {
            self.calls.push("state");
            self.state_result
        }

        fn handle_transit(&mut self) -> Result<()> {
            self.calls.push("transit");
            Ok(())
        }
    }

    fn fixture() -> (Rc<RefCell<FsmBlock>>, FsmStore) {
        let clock = Arc::new(ManualClock::new());
        let storage: Arc<dyn Storage> = Arc::new(NvsStorage::open("test").unwrap());
        let block = Rc::new(RefCell::new(FsmBlock::new(
            storage,
            clock,
            "fsm",
            Duration::from_secs(1),
        )));
        let store = FsmStore::new(Rc::clone(&block), "store");
        (block, store)
    }

    #[test]
    fn steady_round_runs_current_state_handlers_in_order() {
        let (block, mut store) = fixture();
        block.borrow_mut().set_next(2);
        store.run().unwrap(); // commit pending next round
        store.run().unwrap(); // now in state 2

        let first = Probe::new();
        let second = Probe::new();
        store.add(2, Box::new(Rc::clone(&first)));
        store.add(2, Box::new(Rc::clone(&second)));

        store.run().unwrap();
        assert_eq!(first.borrow().calls, vec!["state"]);
        assert_eq!(second.borrow().calls, vec!["state"]);
    }

    #[test]
    fn transition_straddles_two_rounds() {
        let (block, mut store) = fixture();
        let old = Probe::new();
        let new = Probe::new();
        store.add(0, Box::new(Rc::clone(&old)));
        store.add(5, Box::new(Rc::clone(&new)));

        block.borrow_mut().set_next(5);
        store.run().unwrap();
        // Round N: transition only noticed; old state still runs.
        assert_eq!(old.borrow().calls, vec!["state"]);
        assert!(new.borrow().calls.is_empty());
        assert_eq!(store.phase(), TransitPhase::Pending);
        assert_eq!(block.borrow().current_state(), 0);

        store.run().unwrap();
        // Round N+1: old state flushed with handle_transit, commit,
        // then the new state's handlers run.
        assert_eq!(old.borrow().calls, vec!["state", "transit"]);
        assert_eq!(new.borrow().calls, vec!["state"]);
        assert_eq!(store.phase(), TransitPhase::Steady);
        assert_eq!(block.borrow().current_state(), 5);
    }

    #[test]
    fn handler_failure_does_not_stop_the_round() {
        let (block, mut store) = fixture();
        block.borrow_mut().set_next(2);
        store.run().unwrap();
        store.run().unwrap();

        let failing = Probe::new();
        failing.borrow_mut().state_result = Err(Error::Failed);
        let trailing = Probe::new();
        store.add(2, Box::new(Rc::clone(&failing)));
        store.add(2, Box::new(Rc::clone(&trailing)));

        store.run().unwrap();
        assert_eq!(
            trailing.borrow().calls,
            vec!["state"],
            "handlers after a failure must still run"
        );
    }

    #[test]
    fn states_without_handlers_are_skipped() {
        let (block, mut store) = fixture();
        block.borrow_mut().set_next(9);
        store.run().unwrap();
        store.run().unwrap();
        assert_eq!(block.borrow().current_state(), 9);
    }

    #[test]
    fn shared_handler_serves_multiple_states() {
        let (block, mut store) = fixture();
        let shared = Probe::new();
        store.add(0, Box::new(Rc::clone(&shared)));
        store.add(3, Box::new(Rc::clone(&shared)));

        store.run().unwrap(); // state 0
        block.borrow_mut().set_next(3);
        store.run().unwrap(); // pending
        store.run().unwrap(); // transit + state 3
        assert_eq!(
            shared.borrow().calls,
            vec!["state", "state", "transit", "state"]
        );
    }
}
