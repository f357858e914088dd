//! # Bounded Inference Concurrency
//!
//! A counting gate that caps how many inferences run at once. Each inference
//! may allocate large intermediate tensors, so the cap (2 in the default
//! configuration) bounds peak memory and thermal load.
//!
//! ## Design
//!
//! The gate is the only shared mutable state in the subsystem. It is a
//! counting semaphore with an explicit FIFO queue of suspended waiters,
//! guarded by one mutex:
//!
//! - `acquire` proceeds immediately while slots are free, otherwise it
//!   enqueues a oneshot and suspends
//! - a released slot is handed directly to the oldest live waiter; the count
//!   only decrements when no waiter accepts it
//! - waiters are served strictly FIFO; the uncontended fast path cannot
//!   overtake the queue head because waiters exist only while the gate is
//!   saturated
//!
//! Release is tied to [`SlotPermit`]'s `Drop`, so a slot is returned on every
//! exit path: success, inference error, or cancellation mid-call. A waiter
//! whose future is dropped before hand-off never occupies a slot, and a slot
//! handed to an already-gone waiter moves on to the next one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

/// FIFO-fair counting gate for inference slots.
#[derive(Debug)]
pub struct ConcurrencyGate {
    max_concurrent: usize,
    state: Mutex<GateState>,
}

#[derive(Debug)]
struct GateState {
    running: usize,
    waiters: VecDeque<oneshot::Sender<SlotPermit>>,
}

/// One unit of permission to run a single inference.
///
/// Dropping the permit returns the slot to the gate.
#[derive(Debug)]
pub struct SlotPermit {
    gate: Option<Arc<ConcurrencyGate>>,
}

impl SlotPermit {
    /// Detach the permit from its gate without releasing the slot. Only used
    /// internally when a hand-off target has disappeared and the slot is
    /// being re-offered.
    fn disarm(&mut self) {
        self.gate = None;
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.release();
        }
    }
}

impl ConcurrencyGate {
    /// Create a gate allowing at most `max_concurrent` simultaneous holders.
    /// A zero cap is clamped to 1 so the gate can always make progress.
    pub fn new(max_concurrent: usize) -> Arc<Self> {
        Arc::new(Self {
            max_concurrent: max_concurrent.max(1),
            state: Mutex::new(GateState {
                running: 0,
                waiters: VecDeque::new(),
            }),
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of slots currently held. Exposed for instrumentation.
    pub fn running(&self) -> usize {
        self.state.lock().unwrap().running
    }

    /// Number of callers currently queued.
    pub fn waiting(&self) -> usize {
        self.state.lock().unwrap().waiters.len()
    }

    /// Acquire a slot, suspending while the gate is saturated.
    pub async fn acquire(self: &Arc<Self>) -> SlotPermit {
        let rx = {
            let mut state = self.state.lock().unwrap();
            // Invariant: waiters is non-empty only while running == max, so
            // taking the fast path here cannot overtake a queued waiter.
            if state.running < self.max_concurrent {
                state.running += 1;
                return SlotPermit {
                    gate: Some(Arc::clone(self)),
                };
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        match rx.await {
            Ok(permit) => permit,
            // The gate was dropped while we waited; there is nothing left to
            // contend for, so construct an unattached permit.
            Err(_) => SlotPermit { gate: None },
        }
    }

    /// Return a slot: hand it to the oldest live waiter, or decrement the
    /// running count (clamped at 0) when the queue is empty.
    fn release(self: Arc<Self>) {
        loop {
            let waiter = {
                let mut state = self.state.lock().unwrap();
                match state.waiters.pop_front() {
                    Some(tx) => tx,
                    None => {
                        state.running = state.running.saturating_sub(1);
                        return;
                    }
                }
            };
            let permit = SlotPermit {
                gate: Some(Arc::clone(&self)),
            };
            match waiter.send(permit) {
                Ok(()) => return,
                Err(mut unclaimed) => {
                    // The waiter's future was dropped before hand-off. The
                    // returned permit was never observed; detach it and offer
                    // the slot to the next waiter.
                    unclaimed.disarm();
                }
            }
        }
    }
}
