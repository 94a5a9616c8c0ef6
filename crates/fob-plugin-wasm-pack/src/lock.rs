//! Single-flight build lock
//!
//! Serializes wasm-pack invocations: one build runs, every other caller
//! waits in a FIFO queue and is woken in arrival order when the running
//! build finishes.
//!
//! ## Handoff
//!
//! ```text
//! acquire() ── free? ──────────────► locked = true, run
//!     │
//!     └─ busy ─► push waker ─► await ─► re-check ─► locked = true, run
//!                                 ▲
//! release() ─ locked = false ─────┘ wake front of queue (handoff)
//! ```
//!
//! While a woken waiter has not resumed yet, the lock is "handed off":
//! newcomers queue behind it instead of overtaking it.

use crate::error::{Result, WasmPackError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use tokio::sync::oneshot;
use tracing::{debug, error};

#[derive(Debug, Default)]
struct LockState {
    /// A build transaction is executing
    locked: bool,

    /// A waiter has been woken and has not taken the lock yet
    handoff: bool,

    /// Wakers of waiting callers, in arrival order
    pending: VecDeque<oneshot::Sender<()>>,
}

/// FIFO mutual exclusion for async build tasks
///
/// Each plugin instance owns one, so independent instances never block
/// each other.
#[derive(Debug, Default)]
pub struct SingleFlight {
    state: Mutex<LockState>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once every earlier caller has finished
    ///
    /// The lock is released when `task` completes, whether it succeeded or
    /// failed, and the oldest waiter is woken.
    pub async fn run<T, F, Fut>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.acquire().await?;
        task().await
    }

    /// Wait for the lock and return a guard that releases it on drop
    pub async fn acquire(&self) -> Result<SingleFlightGuard<'_>> {
        let rx = {
            let mut state = self.state.lock();
            if !state.locked && !state.handoff {
                state.locked = true;
                return Ok(SingleFlightGuard { lock: self });
            }

            let (tx, rx) = oneshot::channel();
            state.pending.push_back(tx);
            debug!(
                "[fob-wasm-pack] Build in progress, queued at position {}",
                state.pending.len()
            );
            rx
        };

        let mut ticket = Ticket {
            lock: self,
            rx: Some(rx),
        };
        ticket.wait().await?;

        let mut state = self.state.lock();
        if state.locked {
            error!("[fob-wasm-pack] Woken while another build still holds the lock");
            return Err(WasmPackError::InvalidLockState);
        }
        state.handoff = false;
        state.locked = true;
        Ok(SingleFlightGuard { lock: self })
    }

    /// Whether a build currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Number of callers waiting for the lock
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.locked = false;
        state.handoff = false;

        // Waiters whose future was dropped have a closed receiver; skip them.
        while let Some(tx) = state.pending.pop_front() {
            if tx.send(()).is_ok() {
                state.handoff = true;
                break;
            }
        }
    }

    #[cfg(test)]
    fn force_locked(&self) {
        self.state.lock().locked = true;
    }
}

/// Holds the lock; dropping it wakes the next waiter
#[derive(Debug)]
pub struct SingleFlightGuard<'a> {
    lock: &'a SingleFlight,
}

impl Drop for SingleFlightGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// A queued caller
///
/// If the caller is cancelled after being woken but before taking the lock,
/// the handoff is passed on to the next waiter.
struct Ticket<'a> {
    lock: &'a SingleFlight,
    rx: Option<oneshot::Receiver<()>>,
}

impl Ticket<'_> {
    async fn wait(&mut self) -> Result<()> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(WasmPackError::InvalidLockState);
        };
        let woken = rx.await;
        self.rx = None;
        woken.map_err(|_| WasmPackError::InvalidLockState)
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            if rx.try_recv().is_ok() {
                self.lock.release();
            }
        }
    }
}
