// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// One-shot completion handles for recovery requests, plus the cooperative
// stop token used by waiters and by the daemon loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::config::COMPLETION_POLL_INTERVAL;
use crate::error::ExecError;

/// Result delivered through a completion handle.
pub type Outcome = Result<(), ExecError>;

// ---------------------------------------------------------------------------
// StopToken
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    outcome: Option<Outcome>,
    waker: Option<Waker>,
    /// The future side was dropped; nobody will read the outcome.
    detached: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Promise
// ---------------------------------------------------------------------------

/// Write side of a completion. Dropping an unfulfilled promise fails the
/// future with [`ExecError::General`].
pub struct Promise {
    shared: Arc<Shared>,
}

impl Promise {
    /// A connected promise/future pair.
    pub fn new() -> (Promise, RecoveryFuture) {
        let shared = Arc::new(Shared::default());
        let future = RecoveryFuture {
            shared: Arc::clone(&shared),
        };
        (Promise { shared }, future)
    }

    pub fn set_value(&self) -> bool {
        self.complete(Ok(()))
    }

    pub fn set_error(&self, error: ExecError) -> bool {
        self.complete(Err(error))
    }

    /// Whether the future side is still alive to observe the outcome.
    pub fn is_observed(&self) -> bool {
        !self.shared.lock().detached
    }

    /// Store `outcome` unless one is already set. Returns `true` when the
    /// outcome was stored and a future is still listening.
    fn complete(&self, outcome: Outcome) -> bool {
        let waker = {
            let mut st = self.shared.lock();
            if st.outcome.is_some() {
                return false;
            }
            st.outcome = Some(outcome);
            if st.detached {
                return false;
            }
            st.waker.take()
        };
        self.shared.ready.notify_all();
        if let Some(w) = waker {
            w.wake();
        }
        true
    }
}

impl Drop for Promise {
    fn drop(&mut self) {
        self.complete(Err(ExecError::General));
    }
}

// ---------------------------------------------------------------------------
// CompletionCell
// ---------------------------------------------------------------------------

/// Reusable backing for one promise/future pair at a time.
///
/// Arming reuses the allocation once the previous promise and future are
/// both gone. A future still held by its requester keeps the old cell, and
/// the slot moves on to a fresh one.
pub(crate) struct CompletionCell {
    shared: Arc<Shared>,
}

impl CompletionCell {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
        }
    }

    pub(crate) fn arm(&mut self) -> (Promise, RecoveryFuture) {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => {
                *shared.state.get_mut().unwrap_or_else(PoisonError::into_inner) = State::default();
            }
            None => self.shared = Arc::new(Shared::default()),
        }
        let future = RecoveryFuture {
            shared: Arc::clone(&self.shared),
        };
        (
            Promise {
                shared: Arc::clone(&self.shared),
            },
            future,
        )
    }
}

// ---------------------------------------------------------------------------
// RecoveryFuture
// ---------------------------------------------------------------------------

/// Read side of a completion.
///
/// Can be waited on from a thread ([`wait`](Self::wait),
/// [`wait_timeout`](Self::wait_timeout), [`wait_until`](Self::wait_until)) or
/// awaited from async code.
pub struct RecoveryFuture {
    shared: Arc<Shared>,
}

impl RecoveryFuture {
    /// A future that is already resolved.
    pub fn ready(outcome: Outcome) -> Self {
        let shared = Arc::new(Shared::default());
        shared.lock().outcome = Some(outcome);
        Self { shared }
    }

    pub fn is_ready(&self) -> bool {
        self.shared.lock().outcome.is_some()
    }

    /// The outcome, if already available.
    pub fn try_result(&self) -> Option<Outcome> {
        self.shared.lock().outcome
    }

    /// Block until the outcome is available.
    pub fn wait(&self) -> Outcome {
        let mut st = self.shared.lock();
        loop {
            if let Some(outcome) = st.outcome {
                return outcome;
            }
            st = self
                .shared
                .ready
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most `timeout`. `None` if the deadline passed first.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = Instant::now() + timeout;
        let mut st = self.shared.lock();
        loop {
            if let Some(outcome) = st.outcome {
                return Some(outcome);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            st = self
                .shared
                .ready
                .wait_timeout(st, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Block until the outcome is available or `stop` fires, in which case
    /// the wait ends with [`ExecError::Cancelled`].
    ///
    /// Cancelling only ends this wait; the correlation slot stays claimed
    /// until the recovery consumer answers the request.
    pub fn wait_until(&self, stop: &StopToken) -> Outcome {
        let mut st = self.shared.lock();
        loop {
            if let Some(outcome) = st.outcome {
                return outcome;
            }
            if stop.stop_requested() {
                return Err(ExecError::Cancelled);
            }
            st = self
                .shared
                .ready
                .wait_timeout(st, COMPLETION_POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl Future for RecoveryFuture {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        let mut st = self.shared.lock();
        match st.outcome {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                match &st.waker {
                    Some(w) if w.will_wake(cx.waker()) => {}
                    _ => st.waker = Some(cx.waker().clone()),
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for RecoveryFuture {
    fn drop(&mut self) {
        let mut st = self.shared.lock();
        st.detached = true;
        st.waker = None;
    }
}

impl std::fmt::Debug for RecoveryFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryFuture")
            .field("outcome", &self.try_result())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn value_reaches_waiter_on_other_thread() {
        let (promise, future) = Promise::new();
        let t = thread::spawn(move || future.wait());
        thread::sleep(Duration::from_millis(10));
        assert!(promise.set_value());
        assert_eq!(t.join().unwrap(), Ok(()));
    }

    #[test]
    fn first_outcome_wins() {
        let (promise, future) = Promise::new();
        assert!(promise.set_error(ExecError::Failed));
        assert!(!promise.set_value());
        assert_eq!(future.try_result(), Some(Err(ExecError::Failed)));
    }

    #[test]
    fn dropped_promise_breaks_future() {
        let (promise, future) = Promise::new();
        drop(promise);
        assert_eq!(future.wait(), Err(ExecError::General));
    }

    #[test]
    fn timeout_without_outcome() {
        let (_promise, future) = Promise::new();
        assert_eq!(future.wait_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn stop_token_cancels_wait() {
        let (promise, future) = Promise::new();
        let stop = StopToken::new();
        let s2 = stop.clone();
        let t = thread::spawn(move || future.wait_until(&s2));
        thread::sleep(Duration::from_millis(20));
        stop.request_stop();
        assert_eq!(t.join().unwrap(), Err(ExecError::Cancelled));
        // The future is gone; fulfilling now reports nobody listened.
        assert!(!promise.set_value());
        assert!(!promise.is_observed());
    }

    #[test]
    fn cell_is_reused_once_both_sides_are_gone() {
        let mut cell = CompletionCell::new();
        let (promise, future) = cell.arm();
        let first = Arc::as_ptr(&future.shared);
        assert!(promise.set_error(ExecError::Failed));
        drop(promise);
        drop(future);

        let (_promise, future) = cell.arm();
        assert_eq!(Arc::as_ptr(&future.shared), first);
        assert_eq!(future.try_result(), None);
    }

    #[test]
    fn held_future_keeps_its_outcome_across_rearm() {
        let mut cell = CompletionCell::new();
        let (promise, old) = cell.arm();
        assert!(promise.set_value());
        drop(promise);

        let (_promise, fresh) = cell.arm();
        assert!(!Arc::ptr_eq(&old.shared, &fresh.shared));
        assert_eq!(old.try_result(), Some(Ok(())));
        assert_eq!(fresh.try_result(), None);
    }
}
