//! Iterative cache relaxation.
//!
//! The driver repeatedly asks the [`SearchGraph`] for its cheapest candidate,
//! hands the candidate back to the caller to attempt, and inspects the result.
//! An attempt that changed nothing means the graph would answer the same way
//! again, so the driver trusts cached results one notch less. Once nothing is
//! trusted and still nothing changes, the search is over.
//!
//! The driver is a poll-based state machine: [`RelaxationDriver::step`] says
//! what to do next and [`RelaxationDriver::complete`] feeds an attempt's
//! result back in. It never blocks and never schedules anything itself.

use std::fmt;

use itinera_core::{Context, Event, EventBus, Outcome, OwnerId, SearchError};

use crate::graph::SearchGraph;
use crate::itinerary::{Itinerary, ItineraryTrial, TrialResult};

/// How far cached path results are trusted when solving the graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrustPolicy {
    /// Cached results are taken at face value, failures included.
    AlwaysUse,
    /// Cached successes are used; cached failures only count as estimates.
    UseIfPossible,
    /// Every cached result is treated as an estimate and re-run.
    NeverUse,
}

impl TrustPolicy {
    /// One notch less trusting. Saturates at [`NeverUse`](Self::NeverUse).
    pub fn loosen(self) -> Self {
        match self {
            Self::AlwaysUse => Self::UseIfPossible,
            Self::UseIfPossible | Self::NeverUse => Self::NeverUse,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AlwaysUse => "ALWAYS_USE",
            Self::UseIfPossible => "USE_IF_POSSIBLE",
            Self::NeverUse => "NEVER_USE",
        }
    }
}

impl fmt::Display for TrustPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Ready to solve the graph.
    Solving,
    /// An attempt is out; waiting for [`RelaxationDriver::complete`].
    Awaiting,
    Finished(Outcome),
}

/// What the caller should do next.
pub enum Action {
    /// Attempt this candidate under this policy, then call
    /// [`RelaxationDriver::complete`].
    Attempt(ItineraryTrial, TrustPolicy),
    /// An attempt is in flight.
    Wait,
    Finished(Outcome),
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attempt(trial, policy) => f
                .debug_tuple("Attempt")
                .field(&trial.trials().len())
                .field(policy)
                .finish(),
            Self::Wait => f.write_str("Wait"),
            Self::Finished(o) => f.debug_tuple("Finished").field(o).finish(),
        }
    }
}

pub struct RelaxationDriver {
    owner: OwnerId,
    graph: SearchGraph,
    events: EventBus,
    policy: TrustPolicy,
    phase: Phase,
    require_verification: bool,
    best: Option<Itinerary>,
    error: Option<SearchError>,
    solves: usize,
    attempts: usize,
}

impl RelaxationDriver {
    /// Start at [`TrustPolicy::AlwaysUse`]. With `require_verification`,
    /// cache-derived edges that were never revalidated are kept out of every
    /// solve after the first loosening.
    pub fn new(graph: SearchGraph, events: EventBus, require_verification: bool) -> Self {
        Self {
            owner: graph.owner(),
            graph,
            events,
            policy: TrustPolicy::AlwaysUse,
            phase: Phase::Solving,
            require_verification,
            best: None,
            error: None,
            solves: 0,
            attempts: 0,
        }
    }

    pub fn policy(&self) -> TrustPolicy {
        self.policy
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished(_))
    }

    /// Cheapest itinerary found so far.
    pub fn best(&self) -> Option<&Itinerary> {
        self.best.as_ref()
    }

    /// Why the search failed, if it ended with no route at all.
    pub fn error(&self) -> Option<&SearchError> {
        self.error.as_ref()
    }

    /// Graph solves performed.
    pub fn solves(&self) -> usize {
        self.solves
    }

    /// Attempts handed out.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn graph(&self) -> &SearchGraph {
        &self.graph
    }

    /// Advance the state machine.
    pub fn step(&mut self, ctx: &Context) -> Action {
        if let Phase::Finished(o) = self.phase {
            return Action::Finished(o);
        }
        if ctx.is_done() {
            return self.finish(Outcome::Canceled);
        }
        if self.phase == Phase::Awaiting {
            return Action::Wait;
        }
        loop {
            let exclude = self.require_verification && self.policy != TrustPolicy::AlwaysUse;
            let candidate = self.graph.calculate(self.policy, exclude);
            self.solves += 1;
            if ctx.is_done() {
                return self.finish(Outcome::Canceled);
            }
            match candidate {
                Some(trial) => {
                    self.phase = Phase::Awaiting;
                    self.attempts += 1;
                    return Action::Attempt(trial, self.policy);
                }
                // The cache may be hiding a route.
                None if self.policy == TrustPolicy::AlwaysUse => self.loosen(),
                None => {
                    if self.best.is_none() {
                        log::debug!("{}: {}", self.owner, SearchError::NoRouteExists);
                        self.error = Some(SearchError::NoRouteExists);
                    }
                    return self.finish(self.settled_outcome());
                }
            }
        }
    }

    /// Feed back the result of the last [`Action::Attempt`]. Returns whether
    /// it produced a new best itinerary.
    pub fn complete(&mut self, result: TrialResult, ctx: &Context) -> bool {
        if self.phase != Phase::Awaiting {
            return false;
        }
        self.phase = Phase::Solving;
        if ctx.is_done() {
            self.finish(Outcome::Canceled);
            return false;
        }
        let improved = match result.itinerary {
            Some(it) if result.state.is_successful() => {
                let better = self.best.as_ref().is_none_or(|b| it.length < b.length);
                if better {
                    log::debug!(
                        "{}: new best itinerary, length {} ({} steps)",
                        self.owner,
                        it.length,
                        it.steps.len()
                    );
                    self.best = Some(it);
                }
                better
            }
            _ => false,
        };
        if !result.changed_problem {
            if self.policy == TrustPolicy::NeverUse {
                self.finish(self.settled_outcome());
            } else {
                self.loosen();
            }
        }
        improved
    }

    fn settled_outcome(&self) -> Outcome {
        if self.best.is_some() {
            Outcome::Successful
        } else {
            Outcome::Failed
        }
    }

    fn loosen(&mut self) {
        let next = self.policy.loosen();
        if next == self.policy {
            return;
        }
        self.policy = next;
        log::debug!("{}: cache trust loosened to {next}", self.owner);
        if self.require_verification {
            let n = self.graph.forget_unverified();
            if n > 0 {
                log::debug!("{}: dropped {n} unverified cached segments", self.owner);
            }
        }
        self.events.emit(Event::TrustLoosened {
            owner: self.owner,
            policy: next.name(),
        });
    }

    fn finish(&mut self, outcome: Outcome) -> Action {
        log::debug!(
            "{}: relaxation finished {outcome:?} after {} solves at {}",
            self.owner,
            self.solves,
            self.policy
        );
        self.phase = Phase::Finished(outcome);
        Action::Finished(outcome)
    }
}
