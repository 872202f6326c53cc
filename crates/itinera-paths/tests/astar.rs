use std::collections::{BinaryHeap, HashMap};
use std::cmp::Reverse;
use std::sync::Arc;

use itinera_core::{OwnerId, Point, Position, ResultState};
use itinera_paths::{
    CachedPath, Goal, MemoryPathCache, Mode, ModeList, ModeType, PathCache, PathTrial, Swim,
    Terrain, TrialEnv, TrialWork, Walk,
};
use itinera_sched::{DistributedWorkManager, ManualScheduler};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

fn walk_and_swim(swim_cost: f64) -> ModeList {
    let modes: Vec<Arc<dyn Mode>> = vec![
        Arc::new(Walk::default()),
        Arc::new(Swim { cost: swim_cost }),
    ];
    modes.into()
}

fn run_to_end(t: &mut PathTrial) {
    while !t.run() {}
}

/// Reference costs from `from` on a single-layer map: open cells cost 1 to
/// enter, water costs `swim`.
fn reference_cost(rows: &[Vec<char>], from: (i32, i32), to: (i32, i32), swim: u32) -> Option<u32> {
    let h = rows.len() as i32;
    let w = rows[0].len() as i32;
    let mut best: HashMap<(i32, i32), u32> = HashMap::new();
    let mut heap = BinaryHeap::new();
    best.insert(from, 0);
    heap.push(Reverse((0u32, from)));
    while let Some(Reverse((d, (x, y)))) = heap.pop() {
        if (x, y) == to {
            return Some(d);
        }
        if best.get(&(x, y)).is_some_and(|&b| b < d) {
            continue;
        }
        for (dx, dy) in [(0, -1), (1, 0), (0, 1), (-1, 0)] {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let step = match rows[ny as usize][nx as usize] {
                '#' => continue,
                '~' => swim,
                _ => 1,
            };
            let nd = d + step;
            if best.get(&(nx, ny)).is_none_or(|&b| nd < b) {
                best.insert((nx, ny), nd);
                heap.push(Reverse((nd, (nx, ny))));
            }
        }
    }
    None
}

fn random_map(rng: &mut StdRng, w: usize, h: usize) -> Vec<Vec<char>> {
    (0..h)
        .map(|_| {
            (0..w)
                .map(|_| match rng.random_range(0..100) {
                    0..60 => '.',
                    60..75 => '~',
                    _ => '#',
                })
                .collect()
        })
        .collect()
}

fn open_cells(rows: &[Vec<char>]) -> Vec<(i32, i32)> {
    let mut out = Vec::new();
    for (y, row) in rows.iter().enumerate() {
        for (x, &c) in row.iter().enumerate() {
            if c == '.' {
                out.push((x as i32, y as i32));
            }
        }
    }
    out
}

#[test]
fn consistent_heuristic_never_reopens_and_finds_optimum() {
    let mut rng = StdRng::seed_from_u64(0x17);
    let mut solved = 0;
    for round in 0..60 {
        let rows = random_map(&mut rng, 16, 12);
        let open = open_cells(&rows);
        if open.len() < 2 {
            continue;
        }
        let a = open[rng.random_range(0..open.len())];
        let b = open[rng.random_range(0..open.len())];
        let ascii: Vec<String> = rows.iter().map(|r| r.iter().collect()).collect();
        let terrain = Arc::new(Terrain::new().with_layer(0, 0, &ascii.join("\n")).unwrap());
        let mut env = TrialEnv::new(terrain);
        env.cells_per_cycle = 7;
        let mut t = PathTrial::approximate(
            env,
            Position::at(0, a.0, a.1),
            Position::at(0, b.0, b.1),
            walk_and_swim(2.0),
        );
        run_to_end(&mut t);

        assert_eq!(t.stats().reopened, 0, "round {round}: popped node improved");
        match reference_cost(&rows, a, b, 2) {
            Some(d) => {
                assert_eq!(t.state(), ResultState::StoppedSuccessful, "round {round}");
                assert_eq!(t.length(), d as f64, "round {round}");
                let sum: f64 = t.path().iter().map(|s| s.cost).sum();
                assert_eq!(sum, t.length());
                for pair in t.path().windows(2) {
                    assert_eq!(pair[0].position.point.manhattan(pair[1].position.point), 1);
                }
                solved += 1;
            }
            None => {
                assert_eq!(t.state(), ResultState::StoppedFailed, "round {round}");
                assert_eq!(t.length(), f64::INFINITY);
            }
        }
    }
    assert!(solved > 10);
}

/// Fixed per-cell estimates, deliberately inconsistent.
struct Scripted {
    target: Position,
    estimates: HashMap<Point, f64>,
}

impl Goal for Scripted {
    fn estimate(&self, p: Position) -> f64 {
        self.estimates.get(&p.point).copied().unwrap_or(0.0)
    }

    fn is_complete(&self, p: Position) -> bool {
        p == self.target
    }
}

#[test]
fn inconsistent_heuristic_reopens_popped_nodes_and_still_finds_optimum() {
    // A ~ X T
    // B D E #
    let terrain = Arc::new(Terrain::new().with_layer(0, 0, ".~..\n...#").unwrap());
    let target = Position::at(0, 3, 0);
    let estimates: HashMap<Point, f64> = [
        (Point::flat(0, 1), 10.0),
        (Point::flat(1, 1), 10.0),
        (Point::flat(3, 0), 20.0),
    ]
    .into_iter()
    .collect();
    let mut t = PathTrial::approximate(
        TrialEnv::new(terrain),
        Position::at(0, 0, 0),
        target,
        walk_and_swim(5.0),
    )
    .with_goal(Arc::new(Scripted { target, estimates }));
    run_to_end(&mut t);

    assert_eq!(t.state(), ResultState::StoppedSuccessful);
    assert_eq!(t.length(), 5.0);
    assert_eq!(t.stats().reopened, 2);
    assert_eq!(t.stats().expansions, 8);
    let route: Vec<Point> = t.path().iter().map(|s| s.position.point).collect();
    assert_eq!(
        route,
        vec![
            Point::flat(0, 0),
            Point::flat(0, 1),
            Point::flat(1, 1),
            Point::flat(2, 1),
            Point::flat(2, 0),
            Point::flat(3, 0),
        ]
    );
    assert!(t.path()[1..].iter().all(|s| s.mode == ModeType::Walk));
}

#[test]
fn trials_driven_by_the_work_manager() {
    let terrain = Arc::new(
        Terrain::new()
            .with_layer(0, 0, "\
..........
.########.
..........
.########.
..........")
            .unwrap(),
    );
    let cache = Arc::new(MemoryPathCache::new());
    let mut env = TrialEnv::new(terrain).with_cache(cache.clone());
    env.cells_per_cycle = 4;
    let sched = Arc::new(ManualScheduler::new());
    let mgr = DistributedWorkManager::new(sched.clone(), 2);

    let mut trials = Vec::new();
    for owner in 1..=4u64 {
        let trial = PathTrial::approximate(
            env.clone(),
            Position::at(0, 0, 0),
            Position::at(0, 9, 4),
            walk_and_swim(2.0),
        )
        .share();
        mgr.submit(Box::new(TrialWork::new(OwnerId(owner), trial.clone())));
        trials.push(trial);
    }
    sched.run_until_idle();

    assert_eq!(mgr.pending(), 0);
    assert!(mgr.peak_active() <= 2);
    for t in &trials {
        let t = t.lock().unwrap();
        assert_eq!(t.state(), ResultState::StoppedSuccessful);
        assert_eq!(t.length(), 13.0);
    }
    assert_eq!(cache.len(), 1);
}

#[test]
fn cache_idempotence() {
    let terrain = Arc::new(Terrain::new().with_layer(0, 0, ".....\n.....\n.....").unwrap());
    let cache = Arc::new(MemoryPathCache::new());
    let env = TrialEnv::new(terrain).with_cache(cache.clone());
    let (a, b) = (Position::at(0, 0, 0), Position::at(0, 4, 2));
    let mut live = PathTrial::approximate(env.clone(), a, b, walk_and_swim(2.0));
    run_to_end(&mut live);
    let expansions = live.stats().expansions;
    assert!(expansions > 0);

    for _ in 0..3 {
        assert!(live.verify());
        assert!(live.run());
        assert_eq!(live.stats().expansions, expansions);
    }

    let stored = cache.get(&live.cache_key()).unwrap();
    assert!(matches!(stored, CachedPath::Found { .. }));
    let mut cached = PathTrial::cached(env, a, b, walk_and_swim(2.0), stored);
    assert!(cached.verify());
    assert!(cached.run());
    assert_eq!(cached.path(), live.path());
    assert_eq!(cached.stats().expansions, 0);
}
