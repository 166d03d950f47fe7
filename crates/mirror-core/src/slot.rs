//! Capacity-one handoff between a job's watcher and its worker.
//!
//! The slot holds at most one "sync requested" token. Depositing into a full
//! slot is a no-op, so any burst of change notifications that lands while a
//! sync is pending or running collapses into a single follow-up run. That is
//! enough because every run reconciles against the current on-disk state.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Single-token debounce slot.
///
/// Safe for any number of producers calling [`try_send`](Self::try_send) and
/// one consumer calling [`receive`](Self::receive). Share it through an `Arc`.
#[derive(Debug, Default)]
pub struct SignalSlot {
    pending: AtomicBool,
    notify: Notify,
}

impl SignalSlot {
    /// Create a slot, optionally holding a token already (sync on start).
    pub fn new(prefilled: bool) -> Self {
        Self {
            pending: AtomicBool::new(prefilled),
            notify: Notify::new(),
        }
    }

    /// Deposit a token without blocking.
    ///
    /// Returns `true` if the slot was empty and now holds the token, `false`
    /// if a token was already pending and this deposit was absorbed.
    pub fn try_send(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Stores a permit if the consumer isn't parked yet
        self.notify.notify_one();
        true
    }

    /// Wait for a token and consume it, leaving the slot empty.
    ///
    /// Cancel-safe: the token is only taken in the same poll that returns, so
    /// dropping this future inside `select!` never loses a pending token.
    pub async fn receive(&self) {
        loop {
            if self.pending.swap(false, Ordering::AcqRel) {
                return;
            }
            // A leftover permit from an already-consumed token only costs one
            // extra pass through the loop.
            self.notify.notified().await;
        }
    }

    /// Whether a token is currently waiting to be received.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}
