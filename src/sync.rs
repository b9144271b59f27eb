//! Run Synchronization Primitives
//!
//! The latency experiment needs two pieces of shared coordination state: a
//! counting barrier ("every replica has subscribed") and a single-fire start
//! gate ("the stopwatches may start"). Both waits must unblock promptly and
//! distinguishably when the shared deadline cancellation fires, so every wait
//! takes the run's `CancellationToken` and reports which way it woke up.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Outcome of a cancellation-aware wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The awaited condition was met
    Completed,
    /// The shared cancellation signal fired first
    Cancelled,
}

impl WaitOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, WaitOutcome::Completed)
    }
}

/// Counting barrier: `wait` completes once `arrive` has been called as many
/// times as the initial count
#[derive(Debug)]
pub struct Countdown {
    tx: watch::Sender<usize>,
}

impl Countdown {
    pub fn new(count: usize) -> Self {
        let (tx, _) = watch::channel(count);
        Self { tx }
    }

    /// Record one arrival; extra arrivals past zero are ignored
    pub fn arrive(&self) {
        self.tx.send_modify(|remaining| {
            *remaining = remaining.saturating_sub(1);
        });
    }

    /// Wait until every participant has arrived or the token is cancelled
    pub async fn wait(&self, cancel: &CancellationToken) -> WaitOutcome {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() == 0 {
                return WaitOutcome::Completed;
            }
            tokio::select! {
                _ = cancel.cancelled() => return WaitOutcome::Cancelled,
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Sender dropped without reaching zero
                        return WaitOutcome::Cancelled;
                    }
                }
            }
        }
    }
}

/// Single-fire broadcast gate: starts closed, opens exactly once, and every
/// past or future `wait` completes once it is open
#[derive(Debug)]
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Open the gate, releasing all waiters; idempotent
    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    /// Wait until the gate opens or the token is cancelled
    pub async fn wait(&self, cancel: &CancellationToken) -> WaitOutcome {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return WaitOutcome::Completed;
            }
            tokio::select! {
                _ = cancel.cancelled() => return WaitOutcome::Cancelled,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return WaitOutcome::Cancelled;
                    }
                }
            }
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
