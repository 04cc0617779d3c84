//! Brio loop -- the concurrent frame pipeline.
//!
//! One master thread coordinates four roles, each on its own OS thread:
//!
//! - **render** draws the previous frame's stable state,
//! - **physics** steps the simulation by the frame delta,
//! - **dispatch** drains the event queue and runs gameplay callbacks,
//! - **producers** (input/UI polling) feed the queue throughout the frame.
//!
//! Two rendezvous barriers bracket every frame: all roles arrive at the start
//! barrier before any proceeds, and all arrive at the end barrier before the
//! master opens the next frame. Inside the frame, a [`Gate`](barrier::Gate)
//! holds the dispatcher back until the physics step completes. The resulting
//! ordering guarantee, the primary correctness property of this crate:
//!
//! > No gameplay callback executes concurrently with a physics step, and no
//! > physics step begins before the previous frame's dispatch queue has fully
//! > drained.
//!
//! There is no user-facing frame cancellation. Blocking waits use short
//! bounded timeouts purely to stay responsive to shutdown.

#![deny(unsafe_code)]

pub mod barrier;
pub mod pipeline;
pub mod queue;

/// Errors produced by pipeline primitives.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// The pipeline is shutting down; blocked waits unwind with this.
    #[error("frame pipeline is shutting down")]
    ShutDown,

    /// A role thread could not be spawned.
    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        /// The role whose thread failed to spawn.
        role: &'static str,
        /// The underlying OS error.
        source: std::io::Error,
    },
}

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::barrier::{FrameBarrier, Gate};
    pub use crate::pipeline::{FrameContext, FrameLoop, FrameLoopBuilder};
    pub use crate::queue::{DispatchQueue, Event};
    pub use crate::LoopError;
}
