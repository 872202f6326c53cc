//! Engines and search sessions.
//!
//! An [`Engine`] is the explicit handle every session is created from: it
//! owns the scheduler, the fair-share work manager, the path cache, the
//! block provider, the event bus and the configuration. A [`Session`] is one
//! origin-to-destination request. Registering tunnels and modes is only
//! allowed before [`Session::search`]; afterwards the session drives its
//! [`RelaxationDriver`] through the scheduler until it settles.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use itinera_core::{
    Context, Event, EventBus, Outcome, OwnerId, Position, ResultState, Result, SearchConfig,
    SearchError, StateCell,
};
use itinera_paths::{BlockProvider, MemoryPathCache, Mode, PathCache, TrialEnv};
use itinera_sched::{DistributedWorkManager, TaskHandle, TaskScheduler};

use crate::graph::{Destination, SearchGraph};
use crate::itinerary::{Itinerary, TrialResult};
use crate::relax::{Action, RelaxationDriver};
use crate::tunnel::Tunnel;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Shared services for searches. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    scheduler: Arc<dyn TaskScheduler>,
    work: Arc<DistributedWorkManager>,
    cache: Arc<dyn PathCache>,
    blocks: Arc<dyn BlockProvider>,
    events: EventBus,
    config: SearchConfig,
}

impl Engine {
    /// Create an engine with an empty [`MemoryPathCache`]. Fails if `config`
    /// does not validate.
    pub fn new(
        scheduler: Arc<dyn TaskScheduler>,
        blocks: Arc<dyn BlockProvider>,
        config: SearchConfig,
    ) -> Result<Self> {
        config.validate()?;
        let work = Arc::new(DistributedWorkManager::new(
            Arc::clone(&scheduler),
            config.max_active_work_items,
        ));
        Ok(Self {
            scheduler,
            work,
            cache: Arc::new(MemoryPathCache::new()),
            blocks,
            events: EventBus::new(),
            config,
        })
    }

    /// Use `cache` instead of the default in-memory cache (builder).
    pub fn with_cache(mut self, cache: Arc<dyn PathCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn scheduler(&self) -> &Arc<dyn TaskScheduler> {
        &self.scheduler
    }

    pub fn work(&self) -> &DistributedWorkManager {
        &self.work
    }

    pub fn cache(&self) -> &Arc<dyn PathCache> {
        &self.cache
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// A new idle session from `origin` to `destination`.
    pub fn session(&self, origin: Position, destination: Destination) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                owner: OwnerId::next(),
                engine: self.clone(),
                origin,
                destination,
                ctx: Context::new(),
                state: StateCell::new(),
                core: Mutex::new(Core::default()),
            }),
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("events", &self.events)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Core {
    tunnels: Vec<Tunnel>,
    modes: Vec<Arc<dyn Mode>>,
    driver: Option<RelaxationDriver>,
    timeout: Option<TaskHandle>,
    settled: bool,
}

struct SessionInner {
    owner: OwnerId,
    engine: Engine,
    origin: Position,
    destination: Destination,
    ctx: Context,
    state: StateCell,
    core: Mutex<Core>,
}

/// One itinerary request.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn owner(&self) -> OwnerId {
        self.inner.owner
    }

    pub fn origin(&self) -> Position {
        self.inner.origin
    }

    pub fn destination(&self) -> Destination {
        self.inner.destination
    }

    /// Make `tunnel` available to the search.
    pub fn register_tunnel(&self, tunnel: Tunnel) -> Result<()> {
        let mut core = self.inner.lock();
        self.inner.ensure_idle()?;
        core.tunnels.push(tunnel);
        Ok(())
    }

    /// Make `mode` available to every segment of the search.
    pub fn register_mode(&self, mode: Arc<dyn Mode>) -> Result<()> {
        let mut core = self.inner.lock();
        self.inner.ensure_idle()?;
        core.modes.push(mode);
        Ok(())
    }

    /// Start searching. `timeout` overrides the engine's default; when it
    /// fires the session stops with whatever it has found.
    pub fn search(&self, timeout: Option<Duration>) -> Result<SearchHandle> {
        let inner = &self.inner;
        let engine = &inner.engine;
        {
            let mut core = inner.lock();
            inner.ensure_idle()?;
            if core.modes.is_empty() {
                return Err(SearchError::InvalidConfig(
                    "no movement modes registered".into(),
                ));
            }
            let env = TrialEnv::new(Arc::clone(&engine.blocks))
                .with_cache(Arc::clone(&engine.cache))
                .with_events(engine.events.clone())
                .with_context(inner.ctx.clone())
                .with_config(&engine.config);
            let graph = SearchGraph::build(
                inner.owner,
                env,
                inner.origin,
                inner.destination,
                &core.tunnels,
                core.modes.clone().into(),
            );
            core.driver = Some(RelaxationDriver::new(
                graph,
                engine.events.clone(),
                engine.config.require_verification,
            ));
            inner.state.update(ResultState::start);

            if let Some(d) = timeout.or(engine.config.timeout) {
                let session = Arc::clone(inner);
                let ticks = engine.scheduler.ticks_for(d);
                core.timeout = Some(engine.scheduler.schedule_delayed(
                    Box::new(move || {
                        log::debug!("{}: timed out", session.owner);
                        session.stop(false);
                    }),
                    ticks,
                ));
            }
        }
        engine.events.emit(Event::SearchStarted {
            owner: inner.owner,
            origin: inner.origin,
        });
        log::info!(
            "{}: searching {} -> {}",
            inner.owner,
            inner.origin,
            inner.destination
        );
        inner.schedule_drive();
        Ok(SearchHandle {
            inner: Arc::clone(inner),
        })
    }

    /// Ask the search to stop. `cancel` selects the outcome when nothing has
    /// been found yet: canceled rather than failed.
    pub fn stop(&self, cancel: bool) {
        self.inner.stop(cancel);
    }

    pub fn state(&self) -> ResultState {
        self.inner.state.get()
    }

    /// The best itinerary found so far.
    pub fn itinerary(&self) -> Option<Itinerary> {
        self.inner.itinerary()
    }

    /// Why the search failed, when no route exists at all.
    pub fn error(&self) -> Option<SearchError> {
        let core = self.inner.lock();
        core.driver.as_ref().and_then(|d| d.error().cloned())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("owner", &self.inner.owner)
            .field("origin", &self.inner.origin)
            .field("destination", &self.inner.destination)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_idle(&self) -> Result<()> {
        let state = self.state.get();
        if state.is_idle() {
            Ok(())
        } else {
            Err(SearchError::InvalidConfig(format!(
                "session {} is already {state}",
                self.owner
            )))
        }
    }

    fn itinerary(&self) -> Option<Itinerary> {
        let core = self.lock();
        core.driver.as_ref().and_then(|d| d.best().cloned())
    }

    fn schedule_drive(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.engine
            .scheduler
            .schedule(Box::new(move || inner.drive()), false);
    }

    fn stop(self: &Arc<Self>, cancel: bool) {
        {
            let core = self.lock();
            if core.settled || core.driver.is_none() {
                return;
            }
            self.state.update(|s| s.request_stop(cancel));
            // Under the lock, so no result is recorded after the request.
            self.ctx.cancel();
        }
        self.schedule_drive();
    }

    /// One step of the driver. The core lock is never held while an attempt
    /// is dispatched, since an attempt with nothing to run reports back
    /// synchronously.
    fn drive(self: &Arc<Self>) {
        let action = {
            let mut core = self.lock();
            if core.settled {
                return;
            }
            match core.driver.as_mut() {
                Some(d) => d.step(&self.ctx),
                None => return,
            }
        };
        match action {
            Action::Wait => {}
            Action::Finished(outcome) => self.settle(outcome),
            Action::Attempt(trial, policy) => {
                let inner = Arc::clone(self);
                trial.attempt(policy, &self.engine.work, move |r| inner.attempted(r));
            }
        }
    }

    fn attempted(self: &Arc<Self>, result: TrialResult) {
        {
            let mut core = self.lock();
            let improved = match core.driver.as_mut() {
                Some(d) => d.complete(result, &self.ctx),
                None => false,
            };
            if improved {
                self.state.update(ResultState::mark_successful);
            }
        }
        self.schedule_drive();
    }

    fn settle(&self, outcome: Outcome) {
        let (state, timeout, length) = {
            let mut core = self.lock();
            if core.settled {
                return;
            }
            core.settled = true;
            let state = self.state.update(|s| {
                if s.is_stopping() {
                    s.finalize();
                } else if outcome == Outcome::Canceled {
                    s.request_stop(true);
                    s.finalize();
                } else {
                    s.conclude(outcome);
                }
            });
            let length = core
                .driver
                .as_ref()
                .and_then(|d| d.best())
                .map(|b| b.length);
            (state, core.timeout.take(), length)
        };
        if let Some(h) = timeout {
            self.engine.scheduler.cancel(h);
        }
        self.engine.events.emit(Event::SearchStopped {
            owner: self.owner,
            state,
            length,
        });
        match length {
            Some(l) => log::info!("{}: search {state}, length {l}", self.owner),
            None => log::info!("{}: search {state}", self.owner),
        }
    }
}

// ---------------------------------------------------------------------------
// SearchHandle
// ---------------------------------------------------------------------------

/// The eventual result of [`Session::search`].
#[derive(Clone)]
pub struct SearchHandle {
    inner: Arc<SessionInner>,
}

impl SearchHandle {
    /// Block until the search is stopped.
    pub fn wait(&self) -> ResultState {
        self.inner.state.wait_stopped()
    }

    /// Block until the search is stopped or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> ResultState {
        self.inner.state.wait_stopped_timeout(timeout)
    }

    pub fn state(&self) -> ResultState {
        self.inner.state.get()
    }

    pub fn itinerary(&self) -> Option<Itinerary> {
        self.inner.itinerary()
    }
}

impl fmt::Debug for SearchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchHandle")
            .field("owner", &self.inner.owner)
            .field("state", &self.inner.state.get())
            .finish()
    }
}
