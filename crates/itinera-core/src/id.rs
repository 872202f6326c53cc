//! Identifiers for owners (sessions) and path trials.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static OWNER_COUNTER: AtomicU64 = AtomicU64::new(1);
static TRIAL_COUNTER: AtomicU64 = AtomicU64::new(1);

/// The session that requested a piece of work.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OwnerId(pub u64);

impl OwnerId {
    /// A fresh, process-unique id.
    pub fn next() -> Self {
        Self(OWNER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner-{}", self.0)
    }
}

/// One path trial.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrialId(pub u64);

impl TrialId {
    /// A fresh, process-unique id.
    pub fn next() -> Self {
        Self(TRIAL_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trial-{}", self.0)
    }
}
