//! Resumable single-domain A* search.
//!
//! A [`PathTrial`] searches from an origin towards a [`Goal`] in bounded
//! increments: every [`run`](PathTrial::run) expands at most
//! `cells_per_cycle` nodes and returns `false` if it needs another turn.
//! Between increments the whole search lives inside the trial, so it can be
//! handed from one worker thread to the next.
//!
//! No closed set is kept. A node that already left the frontier is
//! re-queued when a strictly cheaper route to it turns up; such relaxations
//! are counted in [`TrialStats::reopened`].
//!
//! Trials are created in one of four ways: [`approximate`](PathTrial::approximate)
//! (unsearched, length is the heuristic estimate), [`cached`](PathTrial::cached)
//! (terminal, from a stored result), and [`successful`](PathTrial::successful)
//! / [`failed`](PathTrial::failed) (terminal, pre-determined).

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use itinera_core::config::DEFAULT_MAX_CELLS;
use itinera_core::{
    CELLS_PER_EXECUTION_CYCLE, Context, Event, EventBus, OwnerId, Outcome, Position, ResultState,
    SearchConfig, SearchError, TrialId,
};
use itinera_sched::{Task, WorkItem};

use crate::block::BlockProvider;
use crate::cache::{CacheKey, CachedPath, PathCache};
use crate::goal::{Goal, ReachPosition};
use crate::mode::{ModeList, ModeSet, Step, mode_set};
use crate::node::{Offer, SearchSpace};

// ---------------------------------------------------------------------------
// TrialEnv
// ---------------------------------------------------------------------------

/// Collaborators and limits shared by the trials of one session.
#[derive(Clone)]
pub struct TrialEnv {
    pub blocks: Arc<dyn BlockProvider>,
    pub cache: Option<Arc<dyn PathCache>>,
    pub events: EventBus,
    pub ctx: Context,
    pub cells_per_cycle: usize,
    pub max_cells: usize,
    pub expansion_delay: Option<Duration>,
}

impl TrialEnv {
    /// Default limits, no cache, no observers.
    pub fn new(blocks: Arc<dyn BlockProvider>) -> Self {
        Self {
            blocks,
            cache: None,
            events: EventBus::new(),
            ctx: Context::new(),
            cells_per_cycle: CELLS_PER_EXECUTION_CYCLE,
            max_cells: DEFAULT_MAX_CELLS,
            expansion_delay: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn PathCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_context(mut self, ctx: Context) -> Self {
        self.ctx = ctx;
        self
    }

    /// Take the limits from `config`.
    pub fn with_config(mut self, config: &SearchConfig) -> Self {
        self.cells_per_cycle = config.cells_per_cycle.max(1);
        self.max_cells = config.max_cells;
        self.expansion_delay = config.expansion_delay;
        self
    }

    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells;
        self
    }
}

// ---------------------------------------------------------------------------
// PathTrial
// ---------------------------------------------------------------------------

/// Counters for one trial since its last reset.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TrialStats {
    /// Nodes popped and expanded.
    pub expansions: usize,
    /// Relaxations of nodes that had already been expanded.
    pub reopened: usize,
    /// Block provider failures absorbed during expansion.
    pub platform_errors: usize,
}

/// Called once when a trial reaches a terminal state.
pub type Listener = Box<dyn FnOnce(&PathTrial) + Send>;

enum Progress {
    Yield,
    Found { path: Vec<Step>, length: f64 },
    Stopped(SearchError),
}

/// One origin→destination search inside a single domain.
pub struct PathTrial {
    id: TrialId,
    origin: Position,
    destination: Position,
    modes: ModeList,
    modes_set: ModeSet,
    goal: Arc<dyn Goal>,
    env: TrialEnv,
    state: ResultState,
    path: Vec<Step>,
    length: f64,
    estimate: f64,
    from_cache: bool,
    verified: bool,
    error: Option<SearchError>,
    search: Option<SearchSpace>,
    pause: Option<Duration>,
    stats: TrialStats,
    listeners: Vec<Listener>,
}

/// A trial shared between the route composer and the scheduler.
pub type SharedTrial = Arc<Mutex<PathTrial>>;

impl PathTrial {
    fn build(env: TrialEnv, origin: Position, destination: Position, modes: ModeList) -> Self {
        let goal: Arc<dyn Goal> = Arc::new(ReachPosition::new(destination));
        let estimate = goal.estimate(origin);
        Self {
            id: TrialId::next(),
            origin,
            destination,
            modes_set: mode_set(&modes),
            modes,
            goal,
            env,
            state: ResultState::Idle,
            path: Vec::new(),
            length: estimate,
            estimate,
            from_cache: false,
            verified: false,
            error: None,
            search: None,
            pause: None,
            stats: TrialStats::default(),
            listeners: Vec::new(),
        }
    }

    /// An unsearched trial whose length is the heuristic estimate.
    pub fn approximate(
        env: TrialEnv,
        origin: Position,
        destination: Position,
        modes: ModeList,
    ) -> Self {
        Self::build(env, origin, destination, modes)
    }

    /// A terminal trial seeded from a stored result.
    pub fn cached(
        env: TrialEnv,
        origin: Position,
        destination: Position,
        modes: ModeList,
        cached: CachedPath,
    ) -> Self {
        let mut t = match cached {
            CachedPath::Found { steps, length } => {
                Self::successful(env, origin, destination, modes, steps, length)
            }
            CachedPath::Failed => Self::failed(env, origin, destination, modes),
        };
        t.from_cache = true;
        t
    }

    /// A terminal successful trial with a known path.
    pub fn successful(
        env: TrialEnv,
        origin: Position,
        destination: Position,
        modes: ModeList,
        path: Vec<Step>,
        length: f64,
    ) -> Self {
        let mut t = Self::build(env, origin, destination, modes);
        t.state = ResultState::StoppedSuccessful;
        t.path = path;
        t.length = length;
        t
    }

    /// A terminal failed trial.
    pub fn failed(env: TrialEnv, origin: Position, destination: Position, modes: ModeList) -> Self {
        let mut t = Self::build(env, origin, destination, modes);
        t.state = ResultState::StoppedFailed;
        t.length = f64::INFINITY;
        t
    }

    /// Replace the default [`ReachPosition`] goal (builder).
    pub fn with_goal(mut self, goal: Arc<dyn Goal>) -> Self {
        self.estimate = goal.estimate(self.origin);
        if !self.state.is_stopped() {
            self.length = self.estimate;
        }
        self.goal = goal;
        self
    }

    /// Wrap for sharing with the scheduler.
    pub fn share(self) -> SharedTrial {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> TrialId {
        self.id
    }

    pub fn origin(&self) -> Position {
        self.origin
    }

    pub fn destination(&self) -> Position {
        self.destination
    }

    pub fn modes(&self) -> ModeSet {
        self.modes_set
    }

    pub fn state(&self) -> ResultState {
        self.state
    }

    /// Steps from origin to destination. Empty unless successful.
    pub fn path(&self) -> &[Step] {
        &self.path
    }

    /// Path length once successful, infinite once failed, the heuristic
    /// estimate before that.
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Whether the current result came from the cache rather than a search.
    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    /// Whether a cached result has passed [`revalidate`](Self::revalidate).
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Why the last search stopped without a path.
    pub fn error(&self) -> Option<&SearchError> {
        self.error.as_ref()
    }

    /// Delay requested by the last unfinished [`run`](Self::run).
    pub fn pause(&self) -> Option<Duration> {
        self.pause
    }

    pub fn stats(&self) -> TrialStats {
        self.stats
    }

    /// Nodes currently in the visited set (zero when no search is live).
    pub fn visited(&self) -> usize {
        self.search.as_ref().map_or(0, SearchSpace::visited)
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.origin, self.destination, self.modes_set)
    }

    /// Register `f` to run when the trial stops. Runs immediately if it
    /// already has.
    pub fn on_stop(&mut self, f: impl FnOnce(&PathTrial) + Send + 'static) {
        if self.state.is_stopped() {
            f(self);
        } else {
            self.listeners.push(Box::new(f));
        }
    }

    /// Forget any result or progress so the next [`run`](Self::run) starts
    /// from scratch.
    pub fn reset(&mut self) {
        self.state = ResultState::Idle;
        self.path.clear();
        self.length = self.estimate;
        self.from_cache = false;
        self.verified = false;
        self.error = None;
        self.search = None;
        self.pause = None;
        self.stats = TrialStats::default();
    }

    /// Run one bounded increment. Returns `true` once the trial is terminal.
    ///
    /// With an expansion delay configured, every increment ends after a
    /// single expansion and [`pause`](Self::pause) reports the delay; the
    /// caller decides when to run again.
    pub fn run(&mut self) -> bool {
        if self.state.is_stopped() {
            return true;
        }
        self.pause = None;
        if self.search.is_none() {
            if let Err(err) = self.begin() {
                return self.finish(Err(err));
            }
        }
        match self.advance() {
            Progress::Yield => false,
            Progress::Found { path, length } => self.finish(Ok((path, length))),
            Progress::Stopped(err) => self.finish(Err(err)),
        }
    }

    /// Stop with `err` unless already terminal.
    pub fn abort(&mut self, err: SearchError) {
        if !self.state.is_stopped() {
            self.finish(Err(err));
        }
    }

    /// Check a successful result against current geometry without searching:
    /// every step must still be offered, at the same cost, by a mode with
    /// the step's tag from the step before it.
    pub fn verify(&self) -> bool {
        if !self.state.is_successful() {
            return false;
        }
        let (Some(first), Some(last)) = (self.path.first(), self.path.last()) else {
            return false;
        };
        if first.position != self.origin || !self.goal.is_complete(last.position) {
            return false;
        }
        let mut options = Vec::new();
        for (i, pair) in self.path.windows(2).enumerate() {
            let (from, step) = (pair[0].position, pair[1]);
            let mut offered = false;
            for mode in self.modes.iter().filter(|m| m.mode_type() == step.mode) {
                options.clear();
                if let Err(err) = mode.options(from, self.env.blocks.as_ref(), &mut options) {
                    log::warn!("{}: verification query at {from} failed: {err}", self.id);
                    return false;
                }
                if options
                    .iter()
                    .any(|o| o.to == step.position && (o.cost - step.cost).abs() < 1e-9)
                {
                    offered = true;
                    break;
                }
            }
            if !offered {
                log::warn!(
                    "{}: cached path {} -> {} no longer valid at step {}",
                    self.id,
                    self.origin,
                    self.destination,
                    i + 1
                );
                return false;
            }
        }
        true
    }

    /// [`verify`](Self::verify) and remember a pass.
    pub fn revalidate(&mut self) -> bool {
        self.verified = self.verify();
        self.verified
    }

    fn begin(&mut self) -> Result<(), SearchError> {
        self.state.start();
        self.stats = TrialStats::default();
        log::trace!("{}: searching {} -> {}", self.id, self.origin, self.destination);
        self.env.events.emit(Event::TrialStarted {
            trial: self.id,
            origin: self.origin,
            destination: self.destination,
        });
        let mut space = SearchSpace::default();
        let root = Step::start(self.origin);
        let offer = space.offer(
            root,
            None,
            0.0,
            self.estimate,
            self.goal.tie_break(self.origin),
            self.env.max_cells,
        );
        self.search = Some(space);
        match offer {
            Offer::Full => Err(SearchError::MemoryExceeded {
                cells: self.env.max_cells,
            }),
            _ => Ok(()),
        }
    }

    fn advance(&mut self) -> Progress {
        let Self {
            id,
            modes,
            goal,
            env,
            search,
            pause,
            stats,
            ..
        } = self;
        let Some(space) = search.as_mut() else {
            return Progress::Stopped(SearchError::Unreachable);
        };
        let mut options = Vec::new();
        let mut expanded = 0;
        loop {
            if env.ctx.is_done() {
                return Progress::Stopped(SearchError::Canceled);
            }
            if expanded >= env.cells_per_cycle {
                return Progress::Yield;
            }
            let Some(idx) = space.pop() else {
                return Progress::Stopped(SearchError::Unreachable);
            };
            let (pos, score) = {
                let node = space.node(idx);
                (node.step.position, node.score)
            };
            if env.events.is_observed() {
                env.events.emit(Event::TrialVisit {
                    trial: *id,
                    position: pos,
                });
            }
            if goal.is_complete(pos) {
                return Progress::Found {
                    path: space.path_to(idx),
                    length: score,
                };
            }
            expanded += 1;
            stats.expansions += 1;

            if let Err(err) = env.blocks.prefetch(pos) {
                log::warn!("{id}: prefetch at {pos} failed: {err}");
                stats.platform_errors += 1;
                continue;
            }
            for mode in modes.iter() {
                options.clear();
                if let Err(err) = mode.options(pos, env.blocks.as_ref(), &mut options) {
                    log::warn!("{id}: {} options at {pos} failed: {err}", mode.mode_type());
                    stats.platform_errors += 1;
                    continue;
                }
                for opt in &options {
                    if !opt.to.same_domain(pos) {
                        continue;
                    }
                    let step = Step {
                        position: opt.to,
                        cost: opt.cost,
                        mode: opt.mode,
                    };
                    let offer = space.offer(
                        step,
                        Some(idx),
                        score + opt.cost,
                        goal.estimate(opt.to),
                        goal.tie_break(opt.to),
                        env.max_cells,
                    );
                    match offer {
                        Offer::Full => {
                            return Progress::Stopped(SearchError::MemoryExceeded {
                                cells: env.max_cells,
                            });
                        }
                        Offer::Relaxed { was_popped: true } => stats.reopened += 1,
                        _ => {}
                    }
                }
            }

            if let Some(delay) = env.expansion_delay {
                *pause = Some(delay);
                return Progress::Yield;
            }
        }
    }

    fn finish(&mut self, result: Result<(Vec<Step>, f64), SearchError>) -> bool {
        self.search = None;
        self.pause = None;
        self.from_cache = false;
        self.verified = false;
        let key = self.cache_key();
        match result {
            Ok((path, length)) => {
                self.state.conclude(Outcome::Successful);
                self.path = path;
                self.length = length;
                self.error = None;
                if let Some(cache) = &self.env.cache {
                    cache.put(
                        key,
                        CachedPath::Found {
                            steps: self.path.clone(),
                            length,
                        },
                    );
                }
            }
            Err(err) => {
                // A failure after swallowed provider errors proves nothing.
                let err = if err.is_cacheable() && self.stats.platform_errors > 0 {
                    SearchError::Platform(format!(
                        "{} block provider failures during search",
                        self.stats.platform_errors
                    ))
                } else {
                    err
                };
                self.state.conclude(err.outcome());
                self.path.clear();
                self.length = f64::INFINITY;
                if err.is_cacheable() {
                    if let Some(cache) = &self.env.cache {
                        cache.put(key, CachedPath::Failed);
                    }
                }
                self.error = Some(err);
            }
        }
        log::debug!(
            "{}: {} -> {} {} (length {}, {} expansions)",
            self.id,
            self.origin,
            self.destination,
            self.state,
            self.length,
            self.stats.expansions
        );
        self.env.events.emit(Event::TrialStopped {
            trial: self.id,
            state: self.state,
            length: self.length,
            expansions: self.stats.expansions,
        });
        for listener in std::mem::take(&mut self.listeners) {
            listener(self);
        }
        true
    }
}

impl fmt::Debug for PathTrial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathTrial")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("destination", &self.destination)
            .field("modes", &self.modes_set)
            .field("state", &self.state)
            .field("length", &self.length)
            .field("from_cache", &self.from_cache)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// TrialWork
// ---------------------------------------------------------------------------

/// A shared trial submitted to the work manager on behalf of `owner`.
///
/// The optional completion callback runs after the trial's lock is released,
/// so it may lock the trial again.
pub struct TrialWork {
    owner: OwnerId,
    trial: SharedTrial,
    on_done: Option<Task>,
}

impl TrialWork {
    pub fn new(owner: OwnerId, trial: SharedTrial) -> Self {
        Self {
            owner,
            trial,
            on_done: None,
        }
    }

    /// Run `f` once the trial is terminal (builder).
    pub fn on_done(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_done = Some(Box::new(f));
        self
    }
}

impl WorkItem for TrialWork {
    fn owner(&self) -> OwnerId {
        self.owner
    }

    fn run(&mut self) -> bool {
        let done = self
            .trial
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .run();
        if done {
            if let Some(f) = self.on_done.take() {
                f();
            }
        }
        done
    }

    fn reset(&mut self) {
        self.trial
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }

    fn resume_after(&self) -> Option<Duration> {
        self.trial
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pause()
    }

    fn abandon(&mut self) {
        self.trial
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .abort(SearchError::Platform("path search panicked".into()));
        if let Some(f) = self.on_done.take() {
            f();
        }
    }
}
