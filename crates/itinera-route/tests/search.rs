use std::sync::Arc;
use std::time::{Duration, Instant};

use itinera_core::{DomainId, Event, EventLog, Position, ResultState, SearchConfig};
use itinera_paths::{
    CacheKey, CachedPath, MemoryPathCache, ModeSet, ModeType, PathCache, Swim, Terrain, Walk,
};
use itinera_route::{Destination, Engine, Session, Tunnel};
use itinera_sched::{ManualScheduler, ThreadPool};

fn two_domains() -> Terrain {
    Terrain::new()
        .with_layer(0, 0, "......\n......")
        .unwrap()
        .with_layer(1, 0, "......\n......")
        .unwrap()
}

fn config(slots: usize) -> SearchConfig {
    SearchConfig {
        max_active_work_items: slots,
        cells_per_cycle: 2,
        ..SearchConfig::default()
    }
}

fn walker(engine: &Engine, origin: Position, destination: Destination) -> Session {
    let s = engine.session(origin, destination);
    s.register_mode(Arc::new(Walk::default())).unwrap();
    s
}

/// Origin to tunnel entrance costs 3, the tunnel 8, exit to destination 5.
fn tunnel_session(engine: &Engine) -> Session {
    let s = walker(
        engine,
        Position::at(0, 0, 0),
        Destination::Position(Position::at(1, 5, 0)),
    );
    s.register_tunnel(Tunnel::new(Position::at(0, 3, 0), Position::at(1, 0, 0), 8.0))
        .unwrap();
    s
}

#[test]
fn uniform_grid_matches_manhattan_distance() {
    let sched = Arc::new(ManualScheduler::new());
    let terrain = Terrain::new()
        .with_layer(0, 0, "......\n......\n......\n......\n......")
        .unwrap();
    let engine = Engine::new(sched.clone(), Arc::new(terrain), config(2)).unwrap();
    let s = walker(
        &engine,
        Position::at(0, 0, 0),
        Destination::Position(Position::at(0, 3, 4)),
    );
    let handle = s.search(None).unwrap();
    sched.run_until_idle();
    assert_eq!(handle.state(), ResultState::StoppedSuccessful);
    let it = s.itinerary().unwrap();
    assert_eq!(it.length, 7.0);
    assert_eq!(it.steps.len(), 8);
    assert_eq!(it.jumps().count(), 0);
}

#[test]
fn tunnel_cost_adds_to_both_segments() {
    let sched = Arc::new(ManualScheduler::new());
    let engine = Engine::new(sched.clone(), Arc::new(two_domains()), config(2)).unwrap();
    let s = tunnel_session(&engine);
    let handle = s.search(None).unwrap();
    sched.run_until_idle();

    assert_eq!(handle.state(), ResultState::StoppedSuccessful);
    let it = handle.itinerary().unwrap();
    assert_eq!(it.length, 3.0 + 8.0 + 5.0);
    let sum: f64 = it.steps.iter().map(|s| s.cost).sum();
    assert_eq!(sum, it.length);
    assert_eq!(it.destination().unwrap().position, Position::at(1, 5, 0));
    for pair in it.steps.windows(2) {
        if pair[1].mode != ModeType::Tunnel {
            assert_eq!(pair[0].position.manhattan(pair[1].position), Some(1));
        }
    }
}

#[test]
fn cheaper_tunnel_chain_wins_for_a_domain_target() {
    let sched = Arc::new(ManualScheduler::new());
    let row = "..........";
    let terrain = Terrain::new()
        .with_layer(0, 0, row)
        .unwrap()
        .with_layer(1, 0, row)
        .unwrap()
        .with_layer(2, 0, row)
        .unwrap();
    let engine = Engine::new(sched.clone(), Arc::new(terrain), config(2)).unwrap();
    let s = walker(&engine, Position::at(0, 0, 0), Destination::Domain(DomainId(2)));
    // Direct: 8 + 1. Through domain 1: 1 + 1 + 2 + 1.
    s.register_tunnel(Tunnel::new(Position::at(0, 8, 0), Position::at(2, 0, 0), 1.0))
        .unwrap();
    s.register_tunnel(Tunnel::new(Position::at(0, 1, 0), Position::at(1, 0, 0), 1.0))
        .unwrap();
    s.register_tunnel(Tunnel::new(Position::at(1, 2, 0), Position::at(2, 9, 0), 1.0))
        .unwrap();
    let handle = s.search(None).unwrap();
    sched.run_until_idle();

    assert_eq!(handle.state(), ResultState::StoppedSuccessful);
    let it = s.itinerary().unwrap();
    assert_eq!(it.length, 5.0);
    assert_eq!(it.jumps().count(), 2);
    assert_eq!(it.destination().unwrap().position, Position::at(2, 9, 0));
}

#[test]
fn no_route_fails() {
    let sched = Arc::new(ManualScheduler::new());
    let engine = Engine::new(sched.clone(), Arc::new(two_domains()), config(2)).unwrap();
    let s = walker(
        &engine,
        Position::at(0, 0, 0),
        Destination::Position(Position::at(1, 5, 0)),
    );
    let handle = s.search(None).unwrap();
    sched.run_until_idle();
    assert_eq!(handle.state(), ResultState::StoppedFailed);
    assert!(s.itinerary().is_none());
    assert_eq!(s.error(), Some(itinera_core::SearchError::NoRouteExists));
}

#[test]
fn cancel_never_leaves_a_session_stopping() {
    let mut outcomes = Vec::new();
    for k in [0, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 5000] {
        let sched = Arc::new(ManualScheduler::new());
        let terrain = Terrain::new()
            .with_layer(0, 0, &[".".repeat(40), ".".repeat(40), ".".repeat(40)].join("\n"))
            .unwrap();
        let engine = Engine::new(sched.clone(), Arc::new(terrain), config(1)).unwrap();
        let s = walker(
            &engine,
            Position::at(0, 0, 0),
            Destination::Position(Position::at(0, 39, 2)),
        );
        let handle = s.search(None).unwrap();
        for _ in 0..k {
            if !sched.run_next() {
                break;
            }
        }
        s.stop(true);
        sched.run_until_idle();

        let state = handle.state();
        assert!(
            matches!(state, ResultState::StoppedSuccessful | ResultState::StoppedCanceled),
            "k={k}: {state}"
        );
        assert_eq!(state.is_successful(), s.itinerary().is_some(), "k={k}");
        outcomes.push(state);
    }
    assert_eq!(outcomes[0], ResultState::StoppedCanceled);
    assert_eq!(outcomes.last(), Some(&ResultState::StoppedSuccessful));
}

#[test]
fn warm_cache_is_trusted_then_distrusted_once() {
    let sched = Arc::new(ManualScheduler::new());
    let engine = Engine::new(sched.clone(), Arc::new(two_domains()), config(2)).unwrap();
    tunnel_session(&engine).search(None).unwrap();
    sched.run_until_idle();
    assert!(engine.cache().contains(&CacheKey::new(
        Position::at(0, 0, 0),
        Position::at(0, 3, 0),
        ModeSet::of(ModeType::Walk),
    )));

    let log = Arc::new(EventLog::new());
    engine.events().subscribe(log.clone());
    let s = tunnel_session(&engine);
    let handle = s.search(None).unwrap();
    sched.run_until_idle();
    assert_eq!(handle.state(), ResultState::StoppedSuccessful);
    assert_eq!(s.itinerary().unwrap().length, 16.0);

    let loosened: Vec<&str> = log
        .snapshot()
        .iter()
        .filter_map(|e| match e {
            Event::TrustLoosened { policy, .. } => Some(*policy),
            _ => None,
        })
        .collect();
    assert_eq!(loosened, vec!["USE_IF_POSSIBLE", "NEVER_USE"]);
    // Cached segments only search again once nothing is trusted.
    assert_eq!(
        log.count(|e| matches!(e, Event::TrialStarted { .. })),
        2
    );
    assert_eq!(
        log.count(|e| matches!(e, Event::ItineraryStarted { .. })),
        4
    );
}

#[test]
fn stale_negative_cache_entry_is_recovered() {
    let sched = Arc::new(ManualScheduler::new());
    let cache = Arc::new(MemoryPathCache::new());
    let (a, b) = (Position::at(0, 0, 0), Position::at(0, 5, 1));
    cache.put(
        CacheKey::new(a, b, ModeSet::of(ModeType::Walk)),
        CachedPath::Failed,
    );
    let cfg = SearchConfig {
        require_verification: true,
        ..config(2)
    };
    let engine = Engine::new(sched.clone(), Arc::new(two_domains()), cfg)
        .unwrap()
        .with_cache(cache.clone());
    let s = walker(&engine, a, Destination::Position(b));
    let handle = s.search(None).unwrap();
    sched.run_until_idle();
    assert_eq!(handle.state(), ResultState::StoppedSuccessful);
    assert_eq!(s.itinerary().unwrap().length, 6.0);
    assert!(matches!(
        cache.get(&CacheKey::new(a, b, ModeSet::of(ModeType::Walk))),
        Some(CachedPath::Found { .. })
    ));
}

#[test]
fn modes_are_combined_per_segment() {
    let sched = Arc::new(ManualScheduler::new());
    let terrain = Terrain::new().with_layer(0, 0, "..~~..").unwrap();
    let engine = Engine::new(sched.clone(), Arc::new(terrain), config(2)).unwrap();
    let s = walker(
        &engine,
        Position::at(0, 0, 0),
        Destination::Position(Position::at(0, 5, 0)),
    );
    s.register_mode(Arc::new(Swim::default())).unwrap();
    let handle = s.search(None).unwrap();
    sched.run_until_idle();
    assert_eq!(handle.state(), ResultState::StoppedSuccessful);
    let it = s.itinerary().unwrap();
    assert_eq!(it.length, 1.0 + 2.0 + 2.0 + 1.0 + 1.0);
    assert_eq!(
        it.steps.iter().filter(|s| s.mode == ModeType::Swim).count(),
        2
    );
}

#[test]
fn thread_pool_sessions_share_the_slots() {
    let pool = Arc::new(ThreadPool::new(4, Duration::from_millis(5)).unwrap());
    let engine = Engine::new(pool, Arc::new(two_domains()), config(2)).unwrap();
    let sessions: Vec<Session> = (0..6).map(|_| tunnel_session(&engine)).collect();
    let handles: Vec<_> = sessions.iter().map(|s| s.search(None).unwrap()).collect();
    for h in &handles {
        assert_eq!(
            h.wait_timeout(Duration::from_secs(30)),
            ResultState::StoppedSuccessful
        );
        assert_eq!(h.itinerary().unwrap().length, 16.0);
    }
    assert!(engine.work().peak_active() <= 2);
}

#[test]
fn thread_pool_timeout_fires_after_the_requested_time() {
    let pool = Arc::new(ThreadPool::new(2, Duration::from_millis(10)).unwrap());
    let terrain = Terrain::new().with_layer(0, 0, &".".repeat(200)).unwrap();
    let cfg = SearchConfig {
        expansion_delay: Some(Duration::from_millis(10)),
        ..config(2)
    };
    let engine = Engine::new(pool, Arc::new(terrain), cfg).unwrap();
    let s = walker(
        &engine,
        Position::at(0, 0, 0),
        Destination::Position(Position::at(0, 199, 0)),
    );
    let started = Instant::now();
    let handle = s.search(Some(Duration::from_millis(300))).unwrap();
    assert_eq!(
        handle.wait_timeout(Duration::from_secs(30)),
        ResultState::StoppedFailed
    );
    // One tick of slack for where the clock stood when the timer was set.
    assert!(started.elapsed() >= Duration::from_millis(290));
    assert!(s.itinerary().is_none());
}
