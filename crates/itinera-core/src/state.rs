//! Lifecycle vocabulary shared by every search component.
//!
//! A [`ResultState`] starts [`Idle`](ResultState::Idle), becomes
//! [`Running`](ResultState::Running) when work begins, passes through a
//! `Stopping*` state when asked to stop, and settles in a `Stopped*` state
//! once the owning task acknowledges the request with
//! [`finalize`](ResultState::finalize). Transitions that are not listed are
//! no-ops.
//!
//! [`StateCell`] wraps a state in a mutex + condvar so that a worker thread
//! and a timeout callback can both write it while a caller blocks on the
//! eventual terminal value.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a task ended (or intends to end).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    Successful,
    Failed,
    Canceled,
    Error,
}

// ---------------------------------------------------------------------------
// ResultState
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResultState {
    #[default]
    Idle,
    Running,
    /// Still running, but a candidate solution is already known.
    RunningSuccessful,
    StoppingCanceled,
    StoppingFailed,
    StoppingSuccessful,
    StoppingError,
    StoppedFailed,
    StoppedSuccessful,
    StoppedCanceled,
    StoppedError,
}

impl ResultState {
    #[inline]
    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }

    #[inline]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::RunningSuccessful)
    }

    #[inline]
    pub fn is_stopping(self) -> bool {
        matches!(
            self,
            Self::StoppingCanceled
                | Self::StoppingFailed
                | Self::StoppingSuccessful
                | Self::StoppingError
        )
    }

    #[inline]
    pub fn is_stopped(self) -> bool {
        matches!(
            self,
            Self::StoppedFailed | Self::StoppedSuccessful | Self::StoppedCanceled | Self::StoppedError
        )
    }

    /// True for every `Stopping*` and `Stopped*` state.
    #[inline]
    pub fn should_stop(self) -> bool {
        self.is_stopping() || self.is_stopped()
    }

    #[inline]
    pub fn is_successful(self) -> bool {
        matches!(self, Self::RunningSuccessful | Self::StoppedSuccessful)
    }

    /// The outcome this state ends (or is ending) with, if it is stopping or
    /// stopped.
    pub fn outcome(self) -> Option<Outcome> {
        match self {
            Self::StoppingSuccessful | Self::StoppedSuccessful => Some(Outcome::Successful),
            Self::StoppingFailed | Self::StoppedFailed => Some(Outcome::Failed),
            Self::StoppingCanceled | Self::StoppedCanceled => Some(Outcome::Canceled),
            Self::StoppingError | Self::StoppedError => Some(Outcome::Error),
            _ => None,
        }
    }

    /// `Idle → Running`.
    pub fn start(&mut self) {
        if *self == Self::Idle {
            *self = Self::Running;
        }
    }

    /// `Running → RunningSuccessful`.
    pub fn mark_successful(&mut self) {
        if *self == Self::Running {
            *self = Self::RunningSuccessful;
        }
    }

    /// Ask a running task to stop.
    ///
    /// `cancel` selects the intent for a task without a solution:
    /// `Running → StoppingCanceled` when true, `Running → StoppingFailed` when
    /// false. A task that already found something always moves to
    /// `StoppingSuccessful`.
    pub fn request_stop(&mut self, cancel: bool) {
        *self = match *self {
            Self::Running if cancel => Self::StoppingCanceled,
            Self::Running => Self::StoppingFailed,
            Self::RunningSuccessful => Self::StoppingSuccessful,
            other => other,
        };
    }

    /// `Stopping* → Stopped*`. Idempotent.
    pub fn finalize(&mut self) {
        *self = match *self {
            Self::StoppingCanceled => Self::StoppedCanceled,
            Self::StoppingFailed => Self::StoppedFailed,
            Self::StoppingSuccessful => Self::StoppedSuccessful,
            Self::StoppingError => Self::StoppedError,
            other => other,
        };
    }

    /// Move straight to the terminal state for `outcome`, passing through the
    /// matching `Stopping*` state. Already-stopped states are left alone.
    pub fn conclude(&mut self, outcome: Outcome) {
        if self.is_stopped() {
            return;
        }
        *self = match outcome {
            Outcome::Successful => Self::StoppingSuccessful,
            Outcome::Failed => Self::StoppingFailed,
            Outcome::Canceled => Self::StoppingCanceled,
            Outcome::Error => Self::StoppingError,
        };
        self.finalize();
    }

    /// Combine the states of several concurrent sub-results.
    ///
    /// Precedence: error > canceled > failed. If none of those apply and at
    /// least one sub-result succeeded, the result is `StoppedSuccessful`;
    /// otherwise `current` is returned unchanged.
    pub fn combine<I>(current: Self, parts: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let (mut error, mut canceled, mut failed, mut success) = (false, false, false, false);
        for part in parts {
            match part.outcome() {
                Some(Outcome::Error) => error = true,
                Some(Outcome::Canceled) => canceled = true,
                Some(Outcome::Failed) => failed = true,
                Some(Outcome::Successful) => success = true,
                None => success |= part.is_successful(),
            }
        }
        if error {
            Self::StoppedError
        } else if canceled {
            Self::StoppedCanceled
        } else if failed {
            Self::StoppedFailed
        } else if success {
            Self::StoppedSuccessful
        } else {
            current
        }
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::RunningSuccessful => "RUNNING_SUCCESSFUL",
            Self::StoppingCanceled => "STOPPING_CANCELED",
            Self::StoppingFailed => "STOPPING_FAILED",
            Self::StoppingSuccessful => "STOPPING_SUCCESSFUL",
            Self::StoppingError => "STOPPING_ERROR",
            Self::StoppedFailed => "STOPPED_FAILED",
            Self::StoppedSuccessful => "STOPPED_SUCCESSFUL",
            Self::StoppedCanceled => "STOPPED_CANCELED",
            Self::StoppedError => "STOPPED_ERROR",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// StateCell
// ---------------------------------------------------------------------------

/// A lock-guarded [`ResultState`] that waiters can block on.
#[derive(Debug, Default)]
pub struct StateCell {
    state: Mutex<ResultState>,
    changed: Condvar,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    pub fn get(&self) -> ResultState {
        *self.lock()
    }

    /// Apply `f` to the state under the lock and wake waiters if it changed.
    /// Returns the new state.
    pub fn update(&self, f: impl FnOnce(&mut ResultState)) -> ResultState {
        let mut guard = self.lock();
        let before = *guard;
        f(&mut guard);
        let after = *guard;
        if before != after {
            self.changed.notify_all();
        }
        after
    }

    /// Block until the state is `Stopped*`.
    pub fn wait_stopped(&self) -> ResultState {
        let mut guard = self.lock();
        while !guard.is_stopped() {
            guard = self
                .changed
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *guard
    }

    /// Block until the state is `Stopped*` or `timeout` elapses. Returns the
    /// state observed last.
    pub fn wait_stopped_timeout(&self, timeout: Duration) -> ResultState {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock();
        while !guard.is_stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (g, _) = self
                .changed
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = g;
        }
        *guard
    }
}
