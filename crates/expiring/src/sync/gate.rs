//! Resettable async broadcast signal.
//!
//! [`AsyncGate`] is a manual-reset event for async code: any number of tasks
//! wait until the gate opens, and all of them wake together. Unlike a
//! `tokio::sync::OnceCell` or a oneshot channel, the gate can be closed again
//! with [`AsyncGate::reset`], and it can carry a failure that every waiter
//! observes.

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{CacheError, CacheResult};

/// Current gate state.
#[derive(Debug, Clone)]
enum GateState {
    Unset,
    Set,
    Faulted(CacheError),
}

/// Async-aware binary signal with broadcast wake-up and fault propagation.
///
/// State transitions:
///
/// | From | Operation | To |
/// |------|-----------|----|
/// | `Unset` | [`signal`](Self::signal) | `Set` |
/// | `Unset` | [`fault`](Self::fault) | `Faulted` |
/// | `Set` / `Faulted` | [`reset`](Self::reset) | `Unset` |
///
/// Resetting an `Unset` gate is a no-op, and faulting a resolved gate is
/// ignored; reset it first.
#[derive(Debug)]
pub struct AsyncGate {
    state: Mutex<GateState>,
    notify: Notify,
}

impl AsyncGate {
    /// Create a closed gate.
    pub fn new() -> Self {
        Self { state: Mutex::new(GateState::Unset), notify: Notify::new() }
    }

    /// Wait until the gate is set.
    ///
    /// Returns immediately if already set. Fails with the stored error if the
    /// gate is faulted, or with [`CacheError::Cancelled`] if `cancel` fires
    /// first.
    pub async fn wait(&self, cancel: &CancellationToken) -> CacheResult<()> {
        loop {
            // Register interest while holding the lock so a signal between the
            // state check and the await cannot be missed.
            let notified = match &*self.state.lock() {
                GateState::Set => return Ok(()),
                GateState::Faulted(err) => return Err(err.clone()),
                GateState::Unset => self.notify.notified(),
            };

            tokio::select! {
                () = notified => {}
                () = cancel.cancelled() => return Err(CacheError::Cancelled),
            }
        }
    }

    /// Open the gate and wake every waiter. Idempotent.
    pub fn signal(&self) {
        let mut state = self.state.lock();
        if matches!(*state, GateState::Set) {
            return;
        }
        *state = GateState::Set;
        self.notify.notify_waiters();
    }

    /// Fault the gate; current and future waiters fail with `error`.
    pub fn fault(&self, error: CacheError) {
        let mut state = self.state.lock();
        if !matches!(*state, GateState::Unset) {
            return;
        }
        *state = GateState::Faulted(error);
        self.notify.notify_waiters();
    }

    /// Close a resolved gate. No-op while the gate is still unset, so a
    /// pending signal is never lost.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if !matches!(*state, GateState::Unset) {
            *state = GateState::Unset;
        }
    }

    /// Returns `true` if the gate is open.
    pub fn is_set(&self) -> bool {
        matches!(*self.state.lock(), GateState::Set)
    }

    /// Returns `true` if the gate is open or faulted.
    pub fn is_resolved(&self) -> bool {
        !matches!(*self.state.lock(), GateState::Unset)
    }

    /// Returns the stored failure, if the gate is faulted.
    pub fn fault_error(&self) -> Option<CacheError> {
        match &*self.state.lock() {
            GateState::Faulted(err) => Some(err.clone()),
            _ => None,
        }
    }
}

impl Default for AsyncGate {
    fn default() -> Self {
        Self::new()
    }
}
