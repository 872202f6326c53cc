//! Error taxonomy for searches.

use std::fmt;

use crate::state::Outcome;

/// Why a search (or one segment of it) did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchError {
    /// The visited set reached its cap.
    MemoryExceeded { cells: usize },
    /// The frontier ran dry without reaching the goal.
    Unreachable,
    /// A cancellation request was observed.
    Canceled,
    /// The geometry provider failed.
    Platform(String),
    /// No tunnel sequence exists even with every cached result distrusted.
    NoRouteExists,
    /// A configuration value was rejected.
    InvalidConfig(String),
}

impl SearchError {
    /// The terminal outcome this error produces.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::MemoryExceeded { .. } | Self::Unreachable | Self::NoRouteExists => {
                Outcome::Failed
            }
            Self::Canceled => Outcome::Canceled,
            Self::Platform(_) | Self::InvalidConfig(_) => Outcome::Error,
        }
    }

    /// Whether the failure may be stored as a negative cache entry.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::MemoryExceeded { .. } | Self::Unreachable)
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemoryExceeded { cells } => {
                write!(f, "search exceeded its cap of {cells} visited cells")
            }
            Self::Unreachable => f.write_str("destination unreachable"),
            Self::Canceled => f.write_str("search canceled"),
            Self::Platform(msg) => write!(f, "block provider failure: {msg}"),
            Self::NoRouteExists => f.write_str("no route exists"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for SearchError {}

pub type Result<T> = std::result::Result<T, SearchError>;
