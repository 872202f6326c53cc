//! Single-domain path search for the itinerary engine.
//!
//! The centrepiece is [`PathTrial`], a resumable A* search that runs in
//! bounded increments and can be driven by the fair-share work manager
//! through [`TrialWork`]. Around it:
//!
//! - [`Mode`]s turn a position into [`MoveOption`]s; [`Walk`], [`Swim`],
//!   [`Climb`], [`Fly`] and [`Dig`] are built in.
//! - A [`BlockProvider`] answers geometry queries; [`Terrain`] is an
//!   in-memory provider built from ASCII layers.
//! - A [`Goal`] supplies the heuristic, tie-break and completion test.
//! - A [`PathCache`] stores results keyed by origin, destination and
//!   [`ModeSet`].
//!
//! # Trait hierarchy
//!
//! | Trait | Used by |
//! |---|---|
//! | [`BlockProvider`] | modes, path verification |
//! | [`Mode`] | node expansion |
//! | [`Goal`] | frontier ordering, completion |
//! | [`PathCache`] | trial results, route seeding |

mod block;
mod cache;
mod goal;
mod mode;
mod modes;
mod node;
mod terrain;
mod trial;

pub use block::{Block, BlockProvider};
pub use cache::{CacheKey, CachedPath, MemoryPathCache, PathCache};
pub use goal::{Goal, ReachDomain, ReachPosition};
pub use mode::{Mode, ModeList, ModeSet, ModeType, MoveOption, Step, mode_set};
pub use modes::{Climb, Dig, Fly, Swim, Walk};
pub use terrain::{Terrain, TerrainError};
pub use trial::{Listener, PathTrial, SharedTrial, TrialEnv, TrialStats, TrialWork};
