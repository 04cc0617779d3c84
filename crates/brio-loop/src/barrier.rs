//! Rendezvous primitives: the reusable frame barrier and the physics-done
//! gate.
//!
//! Both primitives are condition-variable monitors with short bounded waits
//! (50 ms) so that blocked threads notice shutdown promptly; the timeout is
//! a responsiveness measure, never a functional cancellation.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::LoopError;

const WAIT_SLICE: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// FrameBarrier
// ---------------------------------------------------------------------------

struct BarrierState {
    arrived: usize,
    generation: u64,
    shut_down: bool,
}

/// A reusable rendezvous barrier for a fixed set of parties.
///
/// All parties must arrive before any proceeds; the barrier then resets for
/// the next cycle. A generation counter distinguishes cycles, so a party
/// re-arriving early for cycle N+1 cannot release stragglers of cycle N.
pub struct FrameBarrier {
    parties: usize,
    shared: Mutex<BarrierState>,
    cvar: Condvar,
}

impl FrameBarrier {
    /// Create a barrier for `parties` threads.
    ///
    /// # Panics
    ///
    /// Panics if `parties` is zero.
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "a barrier needs at least one party");
        Self {
            parties,
            shared: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                shut_down: false,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Arrive at the barrier and block until every party has arrived.
    ///
    /// Returns [`LoopError::ShutDown`] if the barrier is shut down before the
    /// rendezvous completes.
    pub fn wait(&self) -> Result<(), LoopError> {
        let mut state = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        if state.shut_down {
            return Err(LoopError::ShutDown);
        }
        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cvar.notify_all();
            return Ok(());
        }
        let generation = state.generation;
        while state.generation == generation && !state.shut_down {
            state = self
                .cvar
                .wait_timeout(state, WAIT_SLICE)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        if state.shut_down {
            Err(LoopError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Release every blocked party with [`LoopError::ShutDown`] and refuse
    /// all future arrivals.
    pub fn shut_down(&self) {
        let mut state = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        state.shut_down = true;
        self.cvar.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

struct GateState {
    open: bool,
    shut_down: bool,
}

/// A resettable one-way gate. The physics role opens it when its step
/// completes; the dispatcher waits on it before running any callback. The
/// master closes it again at the top of each frame.
pub struct Gate {
    shared: Mutex<GateState>,
    cvar: Condvar,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    /// Create a closed gate.
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(GateState {
                open: false,
                shut_down: false,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Open the gate, releasing all waiters.
    pub fn open(&self) {
        let mut state = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        state.open = true;
        self.cvar.notify_all();
    }

    /// Close the gate for the next cycle.
    pub fn close(&self) {
        let mut state = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        state.open = false;
    }

    /// Block until the gate opens (or shutdown).
    pub fn wait_open(&self) -> Result<(), LoopError> {
        let mut state = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        while !state.open && !state.shut_down {
            state = self
                .cvar
                .wait_timeout(state, WAIT_SLICE)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        if state.shut_down {
            Err(LoopError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Release all waiters with [`LoopError::ShutDown`].
    pub fn shut_down(&self) {
        let mut state = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        state.shut_down = true;
        self.cvar.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
