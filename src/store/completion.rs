//! Completion signalling
//!
//! A store is complete once its producers have signalled that no more rows
//! will arrive and every queued row has been applied. Waiters block on a
//! condvar until then.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub trait CompletionState: Send + Sync {
    /// Producer side: no more rows will be added.
    fn signal_complete(&self);

    fn is_complete(&self) -> bool;

    /// Block until complete.
    fn await_completion(&self);

    /// Block until complete or `timeout` elapses. Returns whether complete.
    fn await_completion_timeout(&self, timeout: Duration) -> bool;
}

/// One-shot latch: false until released, then true forever.
#[derive(Debug, Default)]
pub struct CompletionLatch {
    complete: Mutex<bool>,
    condvar: Condvar,
}

impl CompletionLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&self) {
        let mut complete = self.complete.lock().unwrap_or_else(|e| e.into_inner());
        *complete = true;
        self.condvar.notify_all();
    }
}

impl CompletionState for CompletionLatch {
    fn signal_complete(&self) {
        self.release();
    }

    fn is_complete(&self) -> bool {
        *self.complete.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn await_completion(&self) {
        let mut complete = self.complete.lock().unwrap_or_else(|e| e.into_inner());
        while !*complete {
            complete = self.condvar.wait(complete).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn await_completion_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut complete = self.complete.lock().unwrap_or_else(|e| e.into_inner());
        while !*complete {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .condvar
                .wait_timeout(complete, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            complete = guard;
        }
        true
    }
}
