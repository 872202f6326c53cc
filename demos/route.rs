//! Two-domain itinerary search on a thread pool.
//!
//! Run: cargo run --bin route-demo [seed]

use std::sync::Arc;
use std::time::{Duration, Instant};

use itinera_core::SearchConfig;
use itinera_demos::Scenario;
use itinera_paths::{Swim, Walk};
use itinera_route::{Destination, Engine};
use itinera_sched::{DEFAULT_TICK, ThreadPool};

fn main() {
    let seed = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0xC0FFEE);
    if let Err(e) = run(seed) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(seed: u64) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::generate(seed)?;
    let config = SearchConfig::default();
    let pool = Arc::new(ThreadPool::new(config.max_active_work_items, DEFAULT_TICK)?);
    let engine = Engine::new(pool, scenario.terrain.clone(), config)?;

    let session = engine.session(
        scenario.origin,
        Destination::Position(scenario.destination),
    );
    session.register_mode(Arc::new(Walk::default()))?;
    session.register_mode(Arc::new(Swim::default()))?;
    for t in &scenario.tunnels {
        println!("tunnel: {t}");
        session.register_tunnel(*t)?;
    }

    println!("seed {seed}: {} -> {}", scenario.origin, scenario.destination);
    let started = Instant::now();
    let state = session.search(Some(Duration::from_secs(10)))?.wait();
    println!("{state} in {:?}", started.elapsed());

    let itinerary = session.itinerary();
    match &itinerary {
        Some(it) => println!("itinerary: {it}"),
        None => println!("no itinerary"),
    }
    print!("{}", scenario.render(itinerary.as_ref()));
    Ok(())
}
