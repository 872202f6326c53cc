//! Stored results of path trials.
//!
//! A [`PathCache`] maps `(origin, destination, modes)` to either the steps
//! of a found path or a negative result. Trials write to it when they reach
//! a cacheable terminal state; the route composer reads from it to seed its
//! graph.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use itinera_core::{DomainId, Position};

use crate::mode::{ModeSet, Step};

/// Identity of a cached search.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheKey {
    pub origin: Position,
    pub destination: Position,
    pub modes: ModeSet,
}

impl CacheKey {
    pub fn new(origin: Position, destination: Position, modes: ModeSet) -> Self {
        Self {
            origin,
            destination,
            modes,
        }
    }
}

/// A stored result.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CachedPath {
    Found { steps: Vec<Step>, length: f64 },
    Failed,
}

impl CachedPath {
    /// Path length; infinite for a negative result.
    pub fn length(&self) -> f64 {
        match self {
            Self::Found { length, .. } => *length,
            Self::Failed => f64::INFINITY,
        }
    }
}

/// Storage for path results.
pub trait PathCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CachedPath>;

    fn put(&self, key: CacheKey, path: CachedPath);

    fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }
}

/// A mutex-guarded in-memory [`PathCache`].
#[derive(Debug, Default)]
pub struct MemoryPathCache {
    entries: Mutex<HashMap<CacheKey, CachedPath>>,
}

impl MemoryPathCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CachedPath>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Forget every entry whose search ran in `domain`. Returns how many were
    /// removed.
    pub fn invalidate_domain(&self, domain: DomainId) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|k, _| k.origin.domain != domain);
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!("invalidated {removed} cached paths in {domain}");
        }
        removed
    }
}

impl PathCache for MemoryPathCache {
    fn get(&self, key: &CacheKey) -> Option<CachedPath> {
        self.lock().get(key).cloned()
    }

    fn put(&self, key: CacheKey, path: CachedPath) {
        log::trace!(
            "caching {} -> {} {}: {}",
            key.origin,
            key.destination,
            key.modes,
            match &path {
                CachedPath::Found { length, .. } => format!("length {length}"),
                CachedPath::Failed => "failed".to_string(),
            }
        );
        self.lock().insert(key, path);
    }

    fn contains(&self, key: &CacheKey) -> bool {
        self.lock().contains_key(key)
    }
}
