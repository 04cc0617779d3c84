//! The frame loop: master-coordinated role threads with per-frame barriers.
//!
//! Per frame, the master:
//!
//! 1. opens the dispatch queue for this frame's producers and closes the
//!    physics-done gate,
//! 2. arrives at the start barrier, releasing all roles,
//! 3. arrives at the end barrier, which completes only after every role
//!    (render, physics, dispatcher, producers) has finished its frame work.
//!
//! Inside the frame: render and physics run in parallel (render draws the
//! previous frame's state; it must not touch anything physics mutates), the
//! dispatcher waits on the gate until physics opens it, then drains the
//! queue. Producers feed the queue throughout and signal done when their
//! input for the frame is exhausted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::barrier::{FrameBarrier, Gate};
use crate::queue::DispatchQueue;
use crate::LoopError;

/// Per-frame context handed to every role callback.
pub struct FrameContext<'a> {
    /// The frame index, starting at 0.
    pub frame: u64,
    /// The dispatch queue; any role may enqueue events for this frame.
    pub queue: &'a DispatchQueue,
}

type RoleFn = Box<dyn FnMut(&FrameContext<'_>) + Send>;

/// Builder for a [`FrameLoop`]. Roles default to no-ops when omitted.
pub struct FrameLoopBuilder {
    render: Option<RoleFn>,
    physics: Option<RoleFn>,
    producers: Vec<RoleFn>,
}

impl FrameLoopBuilder {
    fn new() -> Self {
        Self {
            render: None,
            physics: None,
            producers: Vec::new(),
        }
    }

    /// Set the render role: draws the previous frame's stable state.
    pub fn render(mut self, body: impl FnMut(&FrameContext<'_>) + Send + 'static) -> Self {
        self.render = Some(Box::new(body));
        self
    }

    /// Set the physics role: steps the simulation. The dispatcher is held
    /// back until this returns.
    pub fn physics(mut self, body: impl FnMut(&FrameContext<'_>) + Send + 'static) -> Self {
        self.physics = Some(Box::new(body));
        self
    }

    /// Add a producer role: enqueues this frame's events on the context's
    /// queue. The pipeline signals the producer done when the body returns.
    pub fn producer(mut self, body: impl FnMut(&FrameContext<'_>) + Send + 'static) -> Self {
        self.producers.push(Box::new(body));
        self
    }

    /// Spawn all role threads, parked at the start barrier of frame 0.
    pub fn start(self) -> Result<FrameLoop, LoopError> {
        let producer_count = self.producers.len();
        // Parties: master + render + physics + dispatcher + producers.
        let parties = 4 + producer_count;
        let start = Arc::new(FrameBarrier::new(parties));
        let end = Arc::new(FrameBarrier::new(parties));
        let queue = Arc::new(DispatchQueue::new());
        let gate = Arc::new(Gate::new());
        let frame = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::with_capacity(parties - 1);

        let render = self.render.unwrap_or_else(|| Box::new(|_| {}));
        handles.push(spawn_role(
            "render",
            Arc::clone(&start),
            Arc::clone(&end),
            Arc::clone(&frame),
            Arc::clone(&queue),
            {
                let mut body = render;
                move |ctx: &FrameContext<'_>| {
                    body(ctx);
                    Ok(())
                }
            },
        )?);

        let physics = self.physics.unwrap_or_else(|| Box::new(|_| {}));
        handles.push(spawn_role(
            "physics",
            Arc::clone(&start),
            Arc::clone(&end),
            Arc::clone(&frame),
            Arc::clone(&queue),
            {
                let mut body = physics;
                let gate = Arc::clone(&gate);
                move |ctx: &FrameContext<'_>| {
                    body(ctx);
                    gate.open();
                    Ok(())
                }
            },
        )?);

        handles.push(spawn_role(
            "dispatch",
            Arc::clone(&start),
            Arc::clone(&end),
            Arc::clone(&frame),
            Arc::clone(&queue),
            {
                let gate = Arc::clone(&gate);
                move |ctx: &FrameContext<'_>| {
                    gate.wait_open()?;
                    ctx.queue.drain()?;
                    Ok(())
                }
            },
        )?);

        for (index, mut body) in self.producers.into_iter().enumerate() {
            handles.push(spawn_role(
                if index == 0 { "producer" } else { "producer+" },
                Arc::clone(&start),
                Arc::clone(&end),
                Arc::clone(&frame),
                Arc::clone(&queue),
                move |ctx: &FrameContext<'_>| {
                    body(ctx);
                    ctx.queue.producer_done();
                    Ok(())
                },
            )?);
        }

        Ok(FrameLoop {
            start,
            end,
            queue,
            gate,
            frame,
            next_frame: 0,
            producer_count,
            handles,
        })
    }
}

/// Shuts both barriers down when a role thread exits -- by shutdown or by
/// panic -- so the master never blocks on a rendezvous that cannot complete.
struct RoleExitGuard {
    start: Arc<FrameBarrier>,
    end: Arc<FrameBarrier>,
}

impl Drop for RoleExitGuard {
    fn drop(&mut self) {
        self.start.shut_down();
        self.end.shut_down();
    }
}

fn spawn_role(
    role: &'static str,
    start: Arc<FrameBarrier>,
    end: Arc<FrameBarrier>,
    frame: Arc<AtomicU64>,
    queue: Arc<DispatchQueue>,
    mut body: impl FnMut(&FrameContext<'_>) -> Result<(), LoopError> + Send + 'static,
) -> Result<JoinHandle<()>, LoopError> {
    thread::Builder::new()
        .name(format!("brio-{role}"))
        .spawn(move || {
            let _guard = RoleExitGuard {
                start: Arc::clone(&start),
                end: Arc::clone(&end),
            };
            loop {
                if start.wait().is_err() {
                    break;
                }
                let ctx = FrameContext {
                    frame: frame.load(Ordering::SeqCst),
                    queue: &queue,
                };
                if body(&ctx).is_err() {
                    break;
                }
                if end.wait().is_err() {
                    break;
                }
            }
        })
        .map_err(|source| LoopError::Spawn { role, source })
}

/// A running frame pipeline. Call [`FrameLoop::shutdown`] when done; drop
/// performs the same teardown as a fallback.
pub struct FrameLoop {
    start: Arc<FrameBarrier>,
    end: Arc<FrameBarrier>,
    queue: Arc<DispatchQueue>,
    gate: Arc<Gate>,
    frame: Arc<AtomicU64>,
    next_frame: u64,
    producer_count: usize,
    handles: Vec<JoinHandle<()>>,
}

impl FrameLoop {
    /// Start building a pipeline.
    pub fn builder() -> FrameLoopBuilder {
        FrameLoopBuilder::new()
    }

    /// Run `frames` complete frames, blocking until each has fully finished
    /// (render done, physics done, queue drained, producers done).
    pub fn run_frames(&mut self, frames: u64) -> Result<(), LoopError> {
        for _ in 0..frames {
            self.frame.store(self.next_frame, Ordering::SeqCst);
            self.queue.open(self.producer_count);
            self.gate.close();
            self.start.wait()?;
            self.end.wait()?;
            debug!(frame = self.next_frame, "frame complete");
            self.next_frame += 1;
        }
        Ok(())
    }

    /// The dispatch queue, for enqueueing work from outside the role threads
    /// (only safe between frames or from within a frame's producers).
    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    /// Number of frames completed so far.
    pub fn frames_completed(&self) -> u64 {
        self.next_frame
    }

    /// Tear the pipeline down: release every blocked role and join the
    /// threads. A role that panicked is reported but does not panic the
    /// caller.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.start.shut_down();
        self.end.shut_down();
        self.queue.shut_down();
        self.gate.shut_down();
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("<role>").to_owned();
            if handle.join().is_err() {
                warn!(role = %name, "role thread panicked before shutdown");
            }
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[test]
    fn roles_run_once_per_frame() {
        let renders = Arc::new(AtomicUsize::new(0));
        let steps = Arc::new(AtomicUsize::new(0));
        let mut pipeline = FrameLoop::builder()
            .render({
                let renders = Arc::clone(&renders);
                move |_| {
                    renders.fetch_add(1, Ordering::SeqCst);
                }
            })
            .physics({
                let steps = Arc::clone(&steps);
                move |_| {
                    steps.fetch_add(1, Ordering::SeqCst);
                }
            })
            .start()
            .unwrap();

        pipeline.run_frames(5).unwrap();
        pipeline.shutdown();

        assert_eq!(renders.load(Ordering::SeqCst), 5);
        assert_eq!(steps.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn frame_indices_are_sequential() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = FrameLoop::builder()
            .physics({
                let seen = Arc::clone(&seen);
                move |ctx| {
                    seen.lock().unwrap().push(ctx.frame);
                }
            })
            .start()
            .unwrap();
        pipeline.run_frames(3).unwrap();
        pipeline.run_frames(2).unwrap();
        pipeline.shutdown();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn producer_events_run_within_their_frame() {
        let executed = Arc::new(AtomicUsize::new(0));
        let mut pipeline = FrameLoop::builder()
            .producer({
                let executed = Arc::clone(&executed);
                move |ctx| {
                    for _ in 0..3 {
                        let executed = Arc::clone(&executed);
                        ctx.queue
                            .push(Box::new(move || {
                                executed.fetch_add(1, Ordering::SeqCst);
                            }))
                            .unwrap();
                    }
                }
            })
            .start()
            .unwrap();

        pipeline.run_frames(1).unwrap();
        // run_frames returns only after the dispatcher drained the frame.
        assert_eq!(executed.load(Ordering::SeqCst), 3);
        pipeline.run_frames(1).unwrap();
        assert_eq!(executed.load(Ordering::SeqCst), 6);
        pipeline.shutdown();
    }

    #[test]
    fn panicking_role_shuts_the_pipeline_down() {
        let mut pipeline = FrameLoop::builder()
            .physics(|_| panic!("role failure"))
            .start()
            .unwrap();
        // The master must unwind with an error instead of blocking forever
        // on a barrier the dead role will never reach.
        assert!(matches!(pipeline.run_frames(1), Err(LoopError::ShutDown)));
        pipeline.shutdown();
    }
}
