//! Crash-consistent finite state machine block.
//!
//! An [`FsmBlock`] tracks the previous/current/next state of one machine
//! together with how long each state was held, and persists the whole
//! picture as a single postcard snapshot. After an unplanned reset the
//! machine resumes from the last persisted snapshot instead of state
//! "unknown".
//!
//! State values are plain `u16`; `0` is reserved for "unset" so a fresh
//! block is distinguishable from any real state.

mod store;

pub use store::{FsmStore, TransitPhase};

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::{Storage, clip_key};
use crate::system::RebootHandler;
use crate::time::Clock;

/// FSM state value. `0` means unset.
pub type State = u16;

/// Per-state callback pair invoked by the [`FsmStore`].
pub trait FsmHandler {
    /// Called every scheduling round while the machine sits in a state
    /// this handler is registered for.
    fn handle_state(&mut self) -> Result<()>;

    /// Called once in the round that commits a transition away from the
    /// handler's state, before the commit.
    fn handle_transit(&mut self) -> Result<()>;
}

impl<T: FsmHandler + ?Sized> FsmHandler for Rc<std::cell::RefCell<T>> {
    fn handle_state(&mut self) -> Result<()> {
        self.borrow_mut().handle_state()
    }

    fn handle_transit(&mut self) -> Result<()> {
        self.borrow_mut().handle_transit()
    }
}

/// Persisted shape of a block. One blob per block keeps the snapshot
/// atomic at the storage layer.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct BlockSnapshot {
    write_count: u64,
    prev_state: State,
    prev_state_duration: u64,
    curr_state: State,
    curr_state_duration: u64,
}

const SNAPSHOT_BUF_LEN: usize = 64;

pub struct FsmBlock {
    id: heapless::String<{ crate::storage::MAX_KEY_LEN }>,
    clock: Arc<dyn Clock>,
    storage: Arc<dyn Storage>,
    resolution_us: u64,

    prev_state: State,
    prev_state_duration: u64,
    curr_state: State,
    curr_state_duration: u64,
    next_state: State,
    write_count: u64,

    // Duration carried over from the restored snapshot plus committed
    // checkpoints; the live part is measured from start_us.
    saved_duration: u64,
    start_us: u64,
}

impl FsmBlock {
    /// Restores the persisted snapshot; an absent or undecodable blob
    /// starts the block fresh.
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        id: &str,
        resolution: Duration,
    ) -> Self {
        let resolution_us = resolution.as_micros() as u64;
        assert!(resolution_us > 0, "block resolution must be non-zero");

        let id = clip_key(id);
        let snapshot = Self::restore(&storage, &id);
        let start_us = clock.now_us();
        Self {
            id,
            clock,
            storage,
            resolution_us,
            prev_state: snapshot.prev_state,
            prev_state_duration: snapshot.prev_state_duration,
            curr_state: snapshot.curr_state,
            saved_duration: snapshot.curr_state_duration,
            curr_state_duration: snapshot.curr_state_duration,
            next_state: 0,
            write_count: snapshot.write_count,
            start_us,
        }
    }

    fn restore(storage: &Arc<dyn Storage>, id: &str) -> BlockSnapshot {
        let mut buf = [0u8; SNAPSHOT_BUF_LEN];
        match storage.read(id, &mut buf) {
            Ok(len) => match postcard::from_bytes(&buf[..len]) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!("fsm={id}: snapshot undecodable, starting fresh: {err}");
                    BlockSnapshot::default()
                }
            },
            Err(Error::NoData) => BlockSnapshot::default(),
            Err(err) => {
                warn!("fsm={id}: snapshot restore failed, starting fresh: {err}");
                BlockSnapshot::default()
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn previous_state(&self) -> State {
        self.prev_state
    }

    pub fn previous_state_duration(&self) -> u64 {
        self.prev_state_duration
    }

    pub fn current_state(&self) -> State {
        self.curr_state
    }

    pub fn current_state_duration(&self) -> u64 {
        self.curr_state_duration
    }

    pub fn next_state(&self) -> State {
        self.next_state
    }

    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// Advances the current state's duration from the clock.
    pub fn update(&mut self) {
        let elapsed = self.clock.now_us().saturating_sub(self.start_us);
        self.curr_state_duration = self.saved_duration + elapsed / self.resolution_us;
    }

    /// Requests a transition; committed later by [`FsmBlock::transit`].
    pub fn set_next(&mut self, state: State) {
        self.next_state = state;
    }

    /// A transition is pending when a real next state differs from the
    /// current one.
    pub fn is_in_transit(&self) -> bool {
        self.next_state != 0 && self.next_state != self.curr_state
    }

    /// Commits the pending transition: the current state becomes
    /// previous, durations roll, the new state's clock starts from zero.
    /// The snapshot is persisted; a write failure is reported but the
    /// in-memory transition stands.
    pub fn transit(&mut self) -> Result<()> {
        self.update();
        self.prev_state = self.curr_state;
        self.prev_state_duration = self.curr_state_duration;
        self.curr_state = self.next_state;
        self.next_state = 0;
        self.curr_state_duration = 0;
        self.saved_duration = 0;
        self.start_us = self.clock.now_us();
        self.write()
    }

    /// Persists the snapshot. Duration keeps running across writes.
    pub fn write(&mut self) -> Result<()> {
        self.update();
        self.write_count += 1;
        let snapshot = BlockSnapshot {
            write_count: self.write_count,
            prev_state: self.prev_state,
            prev_state_duration: self.prev_state_duration,
            curr_state: self.curr_state,
            curr_state_duration: self.curr_state_duration,
        };
        let bytes = postcard::to_allocvec(&snapshot).map_err(|err| {
            warn!("fsm={}: snapshot encode failed: {err}", self.id);
            Error::Failed
        })?;
        self.storage.write(&self.id, &bytes)
    }
}

impl crate::scheduler::Task for FsmBlock {
    fn run(&mut self) -> Result<()> {
        self.write()
    }
}

impl RebootHandler for FsmBlock {
    fn handle_reboot(&mut self) {
        if let Err(err) = self.write() {
            warn!("fsm={}: reboot snapshot failed: {err}", self.id);
        }
    }
}
