//! Observational events.
//!
//! Every notification the engine produces is one variant of [`Event`],
//! delivered through the [`EventSink`]s registered on an [`EventBus`]. Sinks
//! only observe: nothing they do feeds back into a search.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::geom::Position;
use crate::id::{OwnerId, TrialId};
use crate::state::ResultState;

/// Something that happened during a search.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A session began searching.
    SearchStarted {
        owner: OwnerId,
        origin: Position,
    },
    /// A session reached a terminal state.
    SearchStopped {
        owner: OwnerId,
        state: ResultState,
        length: Option<f64>,
    },
    /// The session's cache trust was loosened.
    TrustLoosened {
        owner: OwnerId,
        policy: &'static str,
    },
    /// A path trial began (or resumed from scratch).
    TrialStarted {
        trial: TrialId,
        origin: Position,
        destination: Position,
    },
    /// A path trial popped a node off its frontier.
    TrialVisit { trial: TrialId, position: Position },
    /// A path trial stopped.
    TrialStopped {
        trial: TrialId,
        state: ResultState,
        length: f64,
        expansions: usize,
    },
    /// An itinerary trial's segments were dispatched.
    ItineraryStarted {
        owner: OwnerId,
        segments: usize,
        estimate: f64,
    },
    /// An itinerary trial settled.
    ItineraryStopped {
        owner: OwnerId,
        state: ResultState,
        length: Option<f64>,
        changed_problem: bool,
    },
}

/// Receives [`Event`]s.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

impl EventSink for Mutex<Sender<Event>> {
    fn emit(&self, event: &Event) {
        let tx = self.lock().unwrap_or_else(PoisonError::into_inner);
        // A hung-up receiver just stops observing.
        tx.send(event.clone()).ok();
    }
}

/// A sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything recorded so far.
    pub fn snapshot(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| pred(e))
            .count()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// A cloneable registry of sinks. Emitting with no sinks is free.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    /// Whether anything is listening.
    pub fn is_observed(&self) -> bool {
        !self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Deliver `event` to every sink.
    pub fn emit(&self, event: Event) {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        for sink in sinks.iter() {
            sink.emit(&event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("EventBus").field("sinks", &n).finish()
    }
}
