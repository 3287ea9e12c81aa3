use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use scrutin_contracts::StatusObserver;
use scrutin_model::{RunId, RunState};
use tracing::debug;

/// Per-project mutual exclusion for user visible runs.
///
/// Every transition that actually happens is reported to the registered
/// observers after the state lock has been released. Callers that change
/// the status while holding a lock of their own use the `*_deferred`
/// variants and [`RunStatus::publish`] the change once that lock is gone.
pub struct RunStatus {
    state: Mutex<RunState>,
    observers: RwLock<Vec<Arc<dyn StatusObserver>>>,
}

impl fmt::Debug for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunStatus")
            .field("state", &*self.state.lock())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

/// A transition already applied to the state whose observers have not been
/// notified yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "observers only learn about the change once it is published"]
pub struct PendingStatusChange {
    state: RunState,
}

impl PendingStatusChange {
    pub fn state(&self) -> RunState {
        self.state
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStatus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Stopped),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn StatusObserver>) {
        self.observers.write().push(observer);
    }

    /// Claims the status for `run_id`. Returns `false` without side effects
    /// when another run holds it.
    pub fn try_run(&self, run_id: RunId) -> bool {
        self.notify_if(self.try_run_deferred(run_id))
    }

    /// Like [`RunStatus::try_run`] but leaves observer notification to the
    /// caller.
    pub fn try_run_deferred(&self, run_id: RunId) -> Option<PendingStatusChange> {
        self.apply(|state| match state {
            RunState::Stopped => Some(RunState::Running { owner: run_id }),
            _ => None,
        })
    }

    /// Releases the status if `run_id` owns it.
    pub fn stop_run(&self, run_id: RunId) -> bool {
        self.notify_if(self.stop_run_deferred(run_id))
    }

    pub fn stop_run_deferred(&self, run_id: RunId) -> Option<PendingStatusChange> {
        self.apply(|state| match state.owner() {
            Some(owner) if owner == run_id => Some(RunState::Stopped),
            _ => None,
        })
    }

    /// Unconditional release, used on host shutdown.
    pub fn force_stop(&self) -> bool {
        self.notify_if(self.apply(|state| match state {
            RunState::Stopped => None,
            _ => Some(RunState::Stopped),
        }))
    }

    /// Hands the status from a finishing run to its successor without passing
    /// through `Stopped`. A pending cancellation request is not inherited.
    pub fn transfer(&self, from: RunId, to: RunId) -> bool {
        self.notify_if(self.transfer_deferred(from, to))
    }

    pub fn transfer_deferred(
        &self,
        from: RunId,
        to: RunId,
    ) -> Option<PendingStatusChange> {
        self.apply(|state| match state.owner() {
            Some(owner) if owner == from => Some(RunState::Running { owner: to }),
            _ => None,
        })
    }

    /// Asks the owning run to stop at its next cancellation check.
    pub fn cancel(&self) -> bool {
        self.notify_if(self.apply(|state| match state {
            RunState::Running { owner } => {
                Some(RunState::Cancelling { owner: *owner })
            }
            _ => None,
        }))
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().is_running()
    }

    pub fn is_canceled(&self) -> bool {
        self.state.lock().is_cancelling()
    }

    /// Whether `run_id` owns the status and cancellation was requested.
    pub fn is_cancel_requested_for(&self, run_id: RunId) -> bool {
        matches!(*self.state.lock(), RunState::Cancelling { owner } if owner == run_id)
    }

    pub fn owner(&self) -> Option<RunId> {
        self.state.lock().owner()
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Tells every observer about `change`. Must not be called while a lock
    /// an observer might take is held.
    pub fn publish(&self, change: PendingStatusChange) {
        let state = change.state;
        debug!(target: "analysis::status", %state, "run status changed");
        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_status_changed(state);
        }
    }

    fn notify_if(&self, change: Option<PendingStatusChange>) -> bool {
        match change {
            Some(change) => {
                self.publish(change);
                true
            }
            None => false,
        }
    }

    fn apply(
        &self,
        next: impl FnOnce(&RunState) -> Option<RunState>,
    ) -> Option<PendingStatusChange> {
        let mut state = self.state.lock();
        match next(&state) {
            Some(new_state) if new_state != *state => {
                *state = new_state;
                Some(PendingStatusChange { state: new_state })
            }
            _ => None,
        }
    }
}
