//! **itinera-core**: shared vocabulary for the itinerary search engine.
//!
//! This crate provides the types every other *itinera* crate builds on:
//! geometry, the result-state machine, cooperative cancellation, observational
//! events, the error taxonomy and the engine configuration.

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod geom;
pub mod id;
pub mod state;

pub use config::{CELLS_PER_EXECUTION_CYCLE, SearchConfig};
pub use context::Context;
pub use error::{Result, SearchError};
pub use event::{Event, EventBus, EventLog, EventSink};
pub use geom::{DomainId, Point, Position};
pub use id::{OwnerId, TrialId};
pub use state::{Outcome, ResultState, StateCell};
