//! Cooperative cancellation and search outcome.
//!
//! The signal is one atomic state word:
//!
//! ```text
//!              finish()               (counter observed zero)
//!   Running ───────────────► Finished
//!      │
//!      └─────────────────────► Stopped  (request_stop, time limit, violation,
//!               stop(reason)             resource exhaustion, failure)
//! ```
//!
//! Both transitions are a single CAS out of `Running`, so a search is never
//! both finished and stopped. Workers poll [`StopSignal::is_tripped`] at the
//! top of every step; tripping unparks every registered waiter so parked
//! workers notice promptly.
//!
//! The signal also collects the first stop reason, the first state found for
//! each [`ViolationKind`], and the first worker panic payload.

use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crossbeam_utils::sync::Unparker;

use super::error::{StopReason, ViolationKind};
use crate::store::StateId;

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const STOPPED: u8 = 2;

fn lock_or_recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Shared run state. See the module docs.
#[derive(Default)]
pub struct StopSignal {
    state: AtomicU8,
    reason: OnceLock<StopReason>,
    first_error: OnceLock<StateId>,
    first_deadlock: OnceLock<StateId>,
    panic: Mutex<Option<Box<dyn Any + Send + 'static>>>,
    waiters: Mutex<Vec<Unparker>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once the search finished or was stopped.
    #[inline]
    pub fn is_tripped(&self) -> bool {
        self.state.load(Ordering::Acquire) != RUNNING
    }

    /// `true` if the search ran to completion.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire) == FINISHED
    }

    /// Mark the search complete. Returns `false` if it had already been
    /// stopped (or finished).
    pub fn finish(&self) -> bool {
        let won = self.transition(FINISHED);
        if won {
            self.wake_all();
        }
        won
    }

    /// Stop the search. Only the first reason is kept; later calls are no-ops.
    /// Returns `true` for the call that stopped the search.
    pub fn stop(&self, reason: StopReason) -> bool {
        if self.transition(STOPPED) {
            let _ = self.reason.set(reason);
            self.wake_all();
            true
        } else {
            false
        }
    }

    /// Why the search was stopped, if it was.
    pub fn reason(&self) -> Option<&StopReason> {
        self.reason.get()
    }

    /// Record a property violation. The first one of each kind wins.
    pub fn record_violation(&self, kind: ViolationKind, state: StateId) -> bool {
        self.slot(kind).set(state).is_ok()
    }

    /// First recorded state of `kind`.
    pub fn first_violation(&self, kind: ViolationKind) -> Option<StateId> {
        self.slot(kind).get().copied()
    }

    /// The violation to report: the kind that stopped the search if one did,
    /// otherwise the first error state, otherwise the first deadlock.
    pub fn violation(&self) -> Option<(ViolationKind, StateId)> {
        if let Some(StopReason::PropertyViolation(kind)) = self.reason() {
            return self.first_violation(*kind).map(|s| (*kind, s));
        }
        [ViolationKind::Error, ViolationKind::Deadlock]
            .into_iter()
            .find_map(|kind| self.first_violation(kind).map(|s| (kind, s)))
    }

    fn slot(&self, kind: ViolationKind) -> &OnceLock<StateId> {
        match kind {
            ViolationKind::Error => &self.first_error,
            ViolationKind::Deadlock => &self.first_deadlock,
        }
    }

    /// Keep the first worker panic payload and stop the search.
    pub fn record_panic(&self, worker: usize, payload: Box<dyn Any + Send + 'static>) {
        {
            let mut guard = lock_or_recover(&self.panic);
            if guard.is_none() {
                *guard = Some(payload);
            }
        }
        self.stop(StopReason::Failed(super::SearchError::WorkerPanicked { worker }));
    }

    pub(crate) fn take_panic(&self) -> Option<Box<dyn Any + Send + 'static>> {
        lock_or_recover(&self.panic).take()
    }

    /// Register a thread to be unparked when the signal trips.
    pub(crate) fn register_waiter(&self, unparker: Unparker) {
        let mut waiters = lock_or_recover(&self.waiters);
        waiters.push(unparker);
        // A trip that happened before registration must still wake it.
        if self.is_tripped() {
            for u in waiters.iter() {
                u.unpark();
            }
        }
    }

    pub(crate) fn clear_waiters(&self) {
        lock_or_recover(&self.waiters).clear();
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(RUNNING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn wake_all(&self) {
        for u in lock_or_recover(&self.waiters).iter() {
            u.unpark();
        }
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("tripped", &self.is_tripped())
            .field("finished", &self.is_finished())
            .field("reason", &self.reason())
            .finish()
    }
}

/// Cloneable handle for stopping a search from any thread.
#[derive(Clone, Debug)]
pub struct StopHandle {
    signal: Arc<StopSignal>,
}

impl StopHandle {
    pub(crate) fn new(signal: Arc<StopSignal>) -> Self {
        Self { signal }
    }

    /// Ask the search to stop. Workers drain to `Done` at their next step.
    pub fn request_stop(&self) {
        if self.signal.stop(StopReason::Requested) {
            tracing::info!("search stop requested");
        }
    }

    /// `true` once the search has finished or stopped.
    pub fn is_tripped(&self) -> bool {
        self.signal.is_tripped()
    }
}
