//! Multi-domain routes for the itinerary engine.
//!
//! A route alternates [`Tunnel`]s with single-domain path segments. The
//! [`SearchGraph`] connects every tunnel exit to every tunnel entrance in the
//! same domain and weighs each connection with a
//! [`PathTrial`](itinera_paths::PathTrial), cached or estimated. The
//! [`RelaxationDriver`] keeps solving that graph and attempting the cheapest
//! [`ItineraryTrial`], trusting the cache less each time nothing changes,
//! until the answer is stable.
//!
//! Most callers only need an [`Engine`] and its [`Session`]s:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use itinera_core::{Position, SearchConfig};
//! use itinera_paths::{Terrain, Walk};
//! use itinera_route::{Destination, Engine, Tunnel};
//! use itinera_sched::ThreadPool;
//!
//! let terrain = Terrain::new()
//!     .with_layer(0, 0, ".....")?
//!     .with_layer(1, 0, ".....")?;
//! let pool = Arc::new(ThreadPool::new(2, Duration::from_millis(10))?);
//! let engine = Engine::new(pool, Arc::new(terrain), SearchConfig::default())?;
//!
//! let session = engine.session(
//!     Position::at(0, 0, 0),
//!     Destination::Position(Position::at(1, 4, 0)),
//! );
//! session.register_mode(Arc::new(Walk::default()))?;
//! session.register_tunnel(Tunnel::new(Position::at(0, 4, 0), Position::at(1, 0, 0), 8.0))?;
//! let state = session.search(Some(Duration::from_secs(5)))?.wait();
//! println!("{state}: {:?}", session.itinerary());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod graph;
mod itinerary;
mod relax;
mod session;
mod tunnel;

pub use graph::{Destination, SearchGraph};
pub use itinerary::{Itinerary, ItineraryTrial, TrialResult};
pub use relax::{Action, Phase, RelaxationDriver, TrustPolicy};
pub use session::{Engine, SearchHandle, Session};
pub use tunnel::Tunnel;
