//! Itinerary trials: one candidate tunnel sequence, executed.

use std::fmt;
use std::sync::Arc;

use itinera_core::{Event, EventBus, OwnerId, ResultState};
use itinera_paths::{ModeType, PathTrial, SharedTrial, Step, TrialWork};
use itinera_sched::{DistributedWorkManager, Join};

use crate::graph::lock;
use crate::relax::TrustPolicy;
use crate::tunnel::Tunnel;

/// A complete route: every step from the origin to the destination, tunnel
/// jumps included.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Itinerary {
    pub steps: Vec<Step>,
    /// Tunnel costs plus segment lengths.
    pub length: f64,
}

impl Itinerary {
    pub fn origin(&self) -> Option<Step> {
        self.steps.first().copied()
    }

    pub fn destination(&self) -> Option<Step> {
        self.steps.last().copied()
    }

    /// Tunnel jumps taken, in order.
    pub fn jumps(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .skip(1)
            .filter(|s| s.mode == ModeType::Tunnel)
    }
}

impl fmt::Display for Itinerary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} steps, length {}", self.steps.len(), self.length)
    }
}

/// What an [`ItineraryTrial::attempt`] produced.
#[derive(Clone, Debug, PartialEq)]
pub struct TrialResult {
    pub state: ResultState,
    /// Present only when every segment succeeded.
    pub itinerary: Option<Itinerary>,
    /// Whether at least one segment actually searched. If not, solving the
    /// graph again would give the same answer.
    pub changed_problem: bool,
}

/// Tunnels alternating with the path trials between them:
/// `tunnels[i] -> trials[i] -> tunnels[i + 1]`.
pub struct ItineraryTrial {
    owner: OwnerId,
    events: EventBus,
    tunnels: Vec<Tunnel>,
    trials: Vec<SharedTrial>,
    estimate: f64,
}

impl ItineraryTrial {
    pub fn new(
        owner: OwnerId,
        events: EventBus,
        tunnels: Vec<Tunnel>,
        trials: Vec<SharedTrial>,
        estimate: f64,
    ) -> Self {
        debug_assert_eq!(tunnels.len(), trials.len() + 1);
        Self {
            owner,
            events,
            tunnels,
            trials,
            estimate,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn tunnels(&self) -> &[Tunnel] {
        &self.tunnels
    }

    pub fn trials(&self) -> &[SharedTrial] {
        &self.trials
    }

    /// Length the graph computed for this sequence when it was chosen.
    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Whether `trial` must be searched before it can be used.
    fn needs_run(trial: &mut PathTrial, policy: TrustPolicy) -> bool {
        let state = trial.state();
        if !state.is_stopped() {
            return true;
        }
        if !trial.is_from_cache() {
            return false;
        }
        if state.is_successful() && policy != TrustPolicy::NeverUse {
            return !trial.revalidate();
        }
        true
    }

    /// Execute every segment that cannot be trusted as it is, concurrently
    /// through `work`, and call `done` once all of them are terminal. With
    /// nothing to execute, `done` runs before this returns.
    pub fn attempt(
        self,
        policy: TrustPolicy,
        work: &DistributedWorkManager,
        done: impl FnOnce(TrialResult) + Send + 'static,
    ) {
        let mut pending = Vec::new();
        for t in &self.trials {
            let mut trial = lock(t);
            if Self::needs_run(&mut trial, policy) {
                if trial.state().is_stopped() {
                    log::trace!("{}: re-running {} under {policy}", self.owner, trial.id());
                    trial.reset();
                }
                pending.push(Arc::clone(t));
            }
        }
        let changed = !pending.is_empty();
        self.events.emit(Event::ItineraryStarted {
            owner: self.owner,
            segments: self.trials.len(),
            estimate: self.estimate,
        });
        log::trace!(
            "{}: attempting {} segments, {} to run",
            self.owner,
            self.trials.len(),
            pending.len()
        );

        let owner = self.owner;
        let join = Join::new(pending.len(), move || done(self.settle(changed)));
        for t in pending {
            let j = Arc::clone(&join);
            work.submit(Box::new(TrialWork::new(owner, t).on_done(move || j.arrive())));
        }
    }

    fn settle(self, changed_problem: bool) -> TrialResult {
        let states: Vec<ResultState> = self.trials.iter().map(|t| lock(t).state()).collect();
        let state = ResultState::combine(ResultState::StoppedSuccessful, states);
        let itinerary = state.is_successful().then(|| self.flatten());
        self.events.emit(Event::ItineraryStopped {
            owner: self.owner,
            state,
            length: itinerary.as_ref().map(|i| i.length),
            changed_problem,
        });
        TrialResult {
            state,
            itinerary,
            changed_problem,
        }
    }

    fn flatten(&self) -> Itinerary {
        let mut steps = Vec::new();
        let mut length = 0.0;
        for (i, tunnel) in self.tunnels.iter().enumerate() {
            length += tunnel.cost;
            if i == 0 || !tunnel.is_stationary() {
                steps.push(Step {
                    position: tunnel.destination,
                    cost: tunnel.cost,
                    mode: ModeType::Tunnel,
                });
            }
            if let Some(t) = self.trials.get(i) {
                let trial = lock(t);
                length += trial.length();
                steps.extend(trial.path().iter().skip(1).copied());
            }
        }
        Itinerary { steps, length }
    }
}

impl fmt::Debug for ItineraryTrial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItineraryTrial")
            .field("owner", &self.owner)
            .field("tunnels", &self.tunnels)
            .field("segments", &self.trials.len())
            .field("estimate", &self.estimate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itinera_core::{EventLog, Position};
    use itinera_paths::{
        CachedPath, MemoryPathCache, Mode, ModeList, PathCache, Terrain, TrialEnv, Walk, mode_set,
    };
    use itinera_sched::ManualScheduler;
    use std::sync::Mutex;

    use crate::graph::{Destination, SearchGraph};

    fn modes() -> ModeList {
        let v: Vec<Arc<dyn Mode>> = vec![Arc::new(Walk::default())];
        v.into()
    }

    fn terrain() -> Arc<Terrain> {
        Arc::new(
            Terrain::new()
                .with_layer(0, 0, "......\n......")
                .unwrap()
                .with_layer(1, 0, "......\n......")
                .unwrap(),
        )
    }

    fn attempt(trial: ItineraryTrial, policy: TrustPolicy) -> TrialResult {
        let sched = Arc::new(ManualScheduler::new());
        let mgr = DistributedWorkManager::new(sched.clone(), 2);
        let slot = Arc::new(Mutex::new(None));
        let s = Arc::clone(&slot);
        trial.attempt(policy, &mgr, move |r| *s.lock().unwrap() = Some(r));
        sched.run_until_idle();
        let r = slot.lock().unwrap().take();
        r.unwrap()
    }

    #[test]
    fn two_domain_itinerary_is_flattened() {
        let tunnels = [Tunnel::new(Position::at(0, 3, 0), Position::at(1, 0, 1), 8.0)];
        let events = EventBus::new();
        let log = Arc::new(EventLog::new());
        events.subscribe(log.clone());
        let g = SearchGraph::build(
            OwnerId(3),
            TrialEnv::new(terrain()).with_events(events),
            Position::at(0, 0, 0),
            Destination::Position(Position::at(1, 4, 0)),
            &tunnels,
            modes(),
        );
        let it = g.calculate(TrustPolicy::AlwaysUse, false).unwrap();
        let r = attempt(it, TrustPolicy::AlwaysUse);
        assert_eq!(r.state, ResultState::StoppedSuccessful);
        assert!(r.changed_problem);
        let itinerary = r.itinerary.unwrap();
        assert_eq!(itinerary.length, 3.0 + 8.0 + 5.0);
        let sum: f64 = itinerary.steps.iter().map(|s| s.cost).sum();
        assert_eq!(sum, itinerary.length);
        assert_eq!(itinerary.origin().unwrap().position, Position::at(0, 0, 0));
        assert_eq!(itinerary.destination().unwrap().position, Position::at(1, 4, 0));
        let jumps: Vec<_> = itinerary.jumps().collect();
        assert_eq!(jumps.len(), 1);
        assert_eq!(jumps[0].position, Position::at(1, 0, 1));
        assert_eq!(jumps[0].cost, 8.0);
        // Origin step, 3 walks, the jump, 5 walks.
        assert_eq!(itinerary.steps.len(), 10);

        let events = log.snapshot();
        assert!(matches!(events.first(), Some(Event::ItineraryStarted { segments: 2, .. })));
        assert!(matches!(
            events.last(),
            Some(Event::ItineraryStopped {
                changed_problem: true,
                ..
            })
        ));
    }

    #[test]
    fn second_attempt_changes_nothing() {
        let g = SearchGraph::build(
            OwnerId(3),
            TrialEnv::new(terrain()),
            Position::at(0, 0, 0),
            Destination::Position(Position::at(0, 5, 1)),
            &[],
            modes(),
        );
        let first = attempt(
            g.calculate(TrustPolicy::AlwaysUse, false).unwrap(),
            TrustPolicy::AlwaysUse,
        );
        let expansions = lock(&g.trial(0, 1).unwrap()).stats().expansions;
        let second = attempt(
            g.calculate(TrustPolicy::AlwaysUse, false).unwrap(),
            TrustPolicy::AlwaysUse,
        );
        assert!(!second.changed_problem);
        assert_eq!(first.itinerary, second.itinerary);
        assert_eq!(lock(&g.trial(0, 1).unwrap()).stats().expansions, expansions);
    }

    #[test]
    fn cached_segment_is_revalidated_not_rerun() {
        let cache = Arc::new(MemoryPathCache::new());
        let env = TrialEnv::new(terrain()).with_cache(cache.clone());
        let (a, b) = (Position::at(0, 0, 0), Position::at(0, 2, 0));
        let mut live = PathTrial::approximate(env.clone(), a, b, modes());
        while !live.run() {}
        assert_eq!(cache.len(), 1);

        let g = SearchGraph::build(OwnerId(4), env, a, Destination::Position(b), &[], modes());
        let r = attempt(
            g.calculate(TrustPolicy::AlwaysUse, false).unwrap(),
            TrustPolicy::AlwaysUse,
        );
        assert!(!r.changed_problem);
        assert_eq!(r.itinerary.unwrap().length, 2.0);
        let t = g.trial(0, 1).unwrap();
        assert!(lock(&t).is_verified());
        assert_eq!(lock(&t).stats().expansions, 0);
    }

    #[test]
    fn stale_cache_entry_triggers_a_live_run() {
        let cache = Arc::new(MemoryPathCache::new());
        let env = TrialEnv::new(terrain()).with_cache(cache.clone());
        let (a, b) = (Position::at(0, 0, 0), Position::at(0, 2, 0));
        // A made-up path that teleports; it cannot verify.
        cache.put(
            itinera_paths::CacheKey::new(a, b, mode_set(&modes())),
            CachedPath::Found {
                steps: vec![
                    Step::start(a),
                    Step {
                        position: b,
                        cost: 1.0,
                        mode: ModeType::Walk,
                    },
                ],
                length: 1.0,
            },
        );
        let g = SearchGraph::build(OwnerId(4), env, a, Destination::Position(b), &[], modes());
        let r = attempt(
            g.calculate(TrustPolicy::AlwaysUse, false).unwrap(),
            TrustPolicy::AlwaysUse,
        );
        assert!(r.changed_problem);
        assert_eq!(r.itinerary.unwrap().length, 2.0);
        let t = g.trial(0, 1).unwrap();
        assert!(!lock(&t).is_from_cache());
    }

    #[test]
    fn failed_segment_fails_the_attempt() {
        let terrain = Arc::new(
            Terrain::new()
                .with_layer(0, 0, "..#..\n..#..")
                .unwrap(),
        );
        let g = SearchGraph::build(
            OwnerId(5),
            TrialEnv::new(terrain),
            Position::at(0, 0, 0),
            Destination::Position(Position::at(0, 4, 0)),
            &[],
            modes(),
        );
        let r = attempt(
            g.calculate(TrustPolicy::AlwaysUse, false).unwrap(),
            TrustPolicy::AlwaysUse,
        );
        assert_eq!(r.state, ResultState::StoppedFailed);
        assert!(r.itinerary.is_none());
        assert!(r.changed_problem);
    }

    #[test]
    fn empty_sequence_completes_synchronously() {
        let g = SearchGraph::build(
            OwnerId(6),
            TrialEnv::new(terrain()),
            Position::at(1, 2, 1),
            Destination::Domain(itinera_core::DomainId(1)),
            &[],
            modes(),
        );
        let it = g.calculate(TrustPolicy::AlwaysUse, false).unwrap();
        let sched = Arc::new(ManualScheduler::new());
        let mgr = DistributedWorkManager::new(sched, 1);
        let slot = Arc::new(Mutex::new(None));
        let s = Arc::clone(&slot);
        it.attempt(TrustPolicy::NeverUse, &mgr, move |r| *s.lock().unwrap() = Some(r));
        let r = slot.lock().unwrap().take().unwrap();
        assert_eq!(r.state, ResultState::StoppedSuccessful);
        assert!(!r.changed_problem);
        let itinerary = r.itinerary.unwrap();
        assert_eq!(itinerary.length, 0.0);
        assert_eq!(itinerary.steps, vec![Step {
            position: Position::at(1, 2, 1),
            cost: 0.0,
            mode: ModeType::Tunnel
        }]);
    }
}

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;
    use crate::graph::Destination;
    use itinera_core::{DomainId, Position};

    #[test]
    fn itinerary_json() {
        let it = Itinerary {
            steps: vec![
                Step::start(Position::at(0, 0, 0)),
                Step {
                    position: Position::at(1, 0, 0),
                    cost: 8.0,
                    mode: ModeType::Tunnel,
                },
            ],
            length: 8.0,
        };
        let json = serde_json::to_string(&it).unwrap();
        let back: Itinerary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, it);
        assert_eq!(back.jumps().count(), 1);
    }

    #[test]
    fn destination_json() {
        let d = Destination::Domain(DomainId(4));
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(serde_json::from_str::<Destination>(&json).unwrap(), d);
    }
}
