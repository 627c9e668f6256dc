//! One-shot deferred actions with a single-fire guard.
//!
//! A [`DeferredTask`] sleeps for a delay and then runs an action. It can be
//! cancelled at any point before the action commits. Cancellation and
//! firing race on a [`FireGuard`]: exactly one of them wins, so a cancel
//! that returns `true` guarantees the action has no effect, and an action
//! that wins `try_fire` can proceed knowing no cancel will undo it.
//!
//! The action receives the guard and must call [`FireGuard::try_fire`]
//! *after* taking whatever lock protects the state it mutates, and bail
//! out if that returns `false`. Cancellers call
//! [`DeferredTask::cancel`] under that same lock. That closes the window
//! where the timer elapses while a cancel is waiting for the lock.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Three-state latch: pending, then either fired or cancelled, never both.
#[derive(Debug)]
pub struct FireGuard {
    state: AtomicU8,
}

impl FireGuard {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
        }
    }

    /// Claims the right to run the action. `false` if already cancelled
    /// (or already fired).
    pub fn try_fire(&self) -> bool {
        self.state
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claims the right to cancel. `false` if the action already fired.
    pub fn try_cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    pub fn is_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }
}

impl Default for FireGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// A spawned timer that runs an action once after a delay unless
/// cancelled first.
///
/// Dropping a `DeferredTask` does **not** cancel it; call
/// [`cancel`](Self::cancel).
#[derive(Debug)]
pub struct DeferredTask {
    guard: Arc<FireGuard>,
    handle: JoinHandle<()>,
}

impl DeferredTask {
    /// Spawns `action` to run after `delay` on the current runtime.
    pub fn spawn<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: FnOnce(Arc<FireGuard>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let guard = Arc::new(FireGuard::new());
        let task_guard = Arc::clone(&guard);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if task_guard.is_cancelled() {
                return;
            }
            trace!("deferred task elapsed");
            action(task_guard).await;
        });

        Self { guard, handle }
    }

    /// Cancels the task. Returns `true` if this call stopped the action,
    /// `false` if the action had already claimed the guard.
    pub fn cancel(&self) -> bool {
        if self.guard.try_cancel() {
            self.handle.abort();
            true
        } else {
            false
        }
    }

    /// `true` while neither fired nor cancelled.
    pub fn is_pending(&self) -> bool {
        self.guard.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_guard_fire_then_cancel_fails() {
        let g = FireGuard::new();
        assert!(g.try_fire());
        assert!(!g.try_cancel());
        assert!(g.is_fired());
    }

    #[test]
    fn test_fire_guard_cancel_then_fire_fails() {
        let g = FireGuard::new();
        assert!(g.try_cancel());
        assert!(!g.try_fire());
        assert!(g.is_cancelled());
    }

    #[test]
    fn test_fire_guard_only_fires_once() {
        let g = FireGuard::new();
        assert!(g.try_fire());
        assert!(!g.try_fire());
    }
}
