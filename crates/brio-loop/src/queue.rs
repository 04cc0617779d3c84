//! The dispatch queue: a producer/consumer monitor for per-frame events.
//!
//! Producers (input polling, UI, the physics role scheduling callback
//! batches) may enqueue at any point during the frame. The dispatcher drains
//! the queue and exits its loop only after every producer has signalled "no
//! more input this frame" -- an empty queue alone is not a termination
//! condition, since a producer may still be working.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use tracing::trace;

use crate::LoopError;

const WAIT_SLICE: Duration = Duration::from_millis(50);

/// A dispatchable unit of work, executed on the dispatcher thread.
pub type Event = Box<dyn FnOnce() + Send>;

struct QueueState {
    events: VecDeque<Event>,
    open_producers: usize,
    shut_down: bool,
}

/// The per-frame event queue. See the module docs for the drain protocol.
pub struct DispatchQueue {
    shared: Mutex<QueueState>,
    cvar: Condvar,
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchQueue {
    /// Create an empty queue with no open producers.
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(QueueState {
                events: VecDeque::new(),
                open_producers: 0,
                shut_down: false,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Begin a frame: `producers` parties will each call
    /// [`DispatchQueue::producer_done`] once this frame.
    pub fn open(&self, producers: usize) {
        let mut state = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        state.open_producers = producers;
    }

    /// Enqueue an event. Permitted at any point during the frame, including
    /// from an event already being dispatched.
    pub fn push(&self, event: Event) -> Result<(), LoopError> {
        let mut state = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        if state.shut_down {
            return Err(LoopError::ShutDown);
        }
        state.events.push_back(event);
        self.cvar.notify_all();
        Ok(())
    }

    /// Signal that one producer has no more input this frame.
    pub fn producer_done(&self) {
        let mut state = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        state.open_producers = state.open_producers.saturating_sub(1);
        self.cvar.notify_all();
    }

    /// Pop the next event, blocking while the queue is empty but producers
    /// are still open. Returns `Ok(None)` when the frame's input is complete:
    /// the queue is empty and every producer has signalled done.
    pub fn next(&self) -> Result<Option<Event>, LoopError> {
        let mut state = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if state.shut_down {
                return Err(LoopError::ShutDown);
            }
            if let Some(event) = state.events.pop_front() {
                return Ok(Some(event));
            }
            if state.open_producers == 0 {
                return Ok(None);
            }
            state = self
                .cvar
                .wait_timeout(state, WAIT_SLICE)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Drain the frame: execute events until the queue is empty and closed.
    /// Returns the number of events executed.
    pub fn drain(&self) -> Result<usize, LoopError> {
        let mut executed = 0;
        while let Some(event) = self.next()? {
            event();
            executed += 1;
        }
        trace!(executed, "dispatch queue drained");
        Ok(executed)
    }

    /// Number of queued events (diagnostics only; racy by nature).
    pub fn len(&self) -> usize {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release all blocked callers with [`LoopError::ShutDown`] and drop any
    /// queued events.
    pub fn shut_down(&self) {
        let mut state = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        state.shut_down = true;
        state.events.clear();
        self.cvar.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn drain_executes_everything_then_stops_when_closed() {
        let queue = DispatchQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));
        queue.open(1);
        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            queue
                .push(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }
        queue.producer_done();
        assert_eq!(queue.drain().unwrap(), 5);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_waits_for_late_producers() {
        let queue = Arc::new(DispatchQueue::new());
        queue.open(1);

        let producer_queue = Arc::clone(&queue);
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            producer_queue.push(Box::new(|| {})).unwrap();
            producer_queue.producer_done();
        });

        // The queue is empty right now, but the producer is still open, so
        // drain must block and pick up the late event.
        assert_eq!(queue.drain().unwrap(), 1);
        producer.join().unwrap();
    }

    #[test]
    fn dispatched_event_may_enqueue_another() {
        let queue = Arc::new(DispatchQueue::new());
        let counter = Arc::new(AtomicUsize::new(0));
        queue.open(1);
        {
            let queue_inner = Arc::clone(&queue);
            let counter_inner = Arc::clone(&counter);
            queue
                .push(Box::new(move || {
                    counter_inner.fetch_add(1, Ordering::SeqCst);
                    let counter = Arc::clone(&counter_inner);
                    queue_inner
                        .push(Box::new(move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }))
                        .unwrap();
                }))
                .unwrap();
        }
        queue.producer_done();
        assert_eq!(queue.drain().unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shutdown_unblocks_the_dispatcher() {
        let queue = Arc::new(DispatchQueue::new());
        queue.open(1); // producer never finishes
        let drain_queue = Arc::clone(&queue);
        let dispatcher = thread::spawn(move || drain_queue.drain());
        thread::sleep(Duration::from_millis(20));
        queue.shut_down();
        assert!(matches!(
            dispatcher.join().unwrap(),
            Err(LoopError::ShutDown)
        ));
    }
}
