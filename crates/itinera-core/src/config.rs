//! Tunable limits shared by the engine's components.

use std::time::Duration;

use crate::error::{Result, SearchError};

/// Default per-increment node budget.
pub const CELLS_PER_EXECUTION_CYCLE: usize = 2_000;

/// Default cap on a single path trial's visited set.
pub const DEFAULT_MAX_CELLS: usize = 200_000;

/// Configuration for an engine and the searches it runs.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SearchConfig {
    /// Nodes a path trial may expand per increment before yielding.
    pub cells_per_cycle: usize,
    /// Visited-set cap for one path trial.
    pub max_cells: usize,
    /// Optional pause between expansions (used to animate a search).
    pub expansion_delay: Option<Duration>,
    /// Work items allowed to be active across the whole scheduler.
    pub max_active_work_items: usize,
    /// Default session timeout.
    pub timeout: Option<Duration>,
    /// Drop unverified cache-derived edges once cache trust has loosened.
    pub require_verification: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            cells_per_cycle: CELLS_PER_EXECUTION_CYCLE,
            max_cells: DEFAULT_MAX_CELLS,
            expansion_delay: None,
            max_active_work_items: workers.max(1),
            timeout: None,
            require_verification: false,
        }
    }
}

impl SearchConfig {
    /// Reject settings that would stall every search.
    pub fn validate(&self) -> Result<()> {
        if self.cells_per_cycle == 0 {
            return Err(SearchError::InvalidConfig(
                "cells_per_cycle must be > 0".into(),
            ));
        }
        if self.max_cells == 0 {
            return Err(SearchError::InvalidConfig("max_cells must be > 0".into()));
        }
        if self.max_active_work_items == 0 {
            return Err(SearchError::InvalidConfig(
                "max_active_work_items must be > 0".into(),
            ));
        }
        Ok(())
    }
}


#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: SearchConfig = serde_json::from_str(r#"{"max_cells": 10}"#).unwrap();
        assert_eq!(cfg.max_cells, 10);
        assert_eq!(cfg.cells_per_cycle, CELLS_PER_EXECUTION_CYCLE);
    }
}
