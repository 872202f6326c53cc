//! Shared scenario used by the demos.
//!
//! Generates two random cave domains joined by a single tunnel, plus an
//! origin in the first and a destination in the second.

use std::fmt::Write as _;
use std::sync::Arc;

use itinera_core::{DomainId, Point, Position};
use itinera_paths::{Terrain, TerrainError};
use itinera_route::{Itinerary, Tunnel};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

pub const WIDTH: usize = 48;
pub const HEIGHT: usize = 14;
/// Percentage of wall cells.
const WALLS: u32 = 22;
/// Percentage of water cells.
const WATER: u32 = 8;
const TUNNEL_COST: f64 = 8.0;

/// One random layer of `width` by `height` cells.
pub fn random_layer(rng: &mut StdRng, width: usize, height: usize) -> String {
    let mut s = String::with_capacity((width + 1) * height);
    for y in 0..height {
        if y > 0 {
            s.push('\n');
        }
        for _ in 0..width {
            let roll = rng.random_range(0..100);
            s.push(if roll < WALLS {
                '#'
            } else if roll < WALLS + WATER {
                '~'
            } else {
                '.'
            });
        }
    }
    s
}

pub struct Scenario {
    pub terrain: Arc<Terrain>,
    pub origin: Position,
    pub destination: Position,
    pub tunnels: Vec<Tunnel>,
}

impl Scenario {
    /// Build the scenario for `seed`. The same seed always gives the same
    /// scenario.
    pub fn generate(seed: u64) -> Result<Self, TerrainError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let terrain = Terrain::new()
            .with_layer(0, 0, &random_layer(&mut rng, WIDTH, HEIGHT))?
            .with_layer(1, 0, &random_layer(&mut rng, WIDTH, HEIGHT))?;
        let first = terrain.open_cells(DomainId(0));
        let second = terrain.open_cells(DomainId(1));
        if first.len() < 2 || second.len() < 2 {
            return Err(TerrainError::Empty);
        }
        let pick = |rng: &mut StdRng, cells: &[Position]| cells[rng.random_range(0..cells.len())];
        let origin = pick(&mut rng, &first);
        let entrance = pick(&mut rng, &first);
        let exit = pick(&mut rng, &second);
        let destination = pick(&mut rng, &second);
        Ok(Self {
            terrain: Arc::new(terrain),
            origin,
            destination,
            tunnels: vec![Tunnel::new(entrance, exit, TUNNEL_COST)],
        })
    }

    /// Both domains as ASCII, with the itinerary's steps marked `*`.
    pub fn render(&self, itinerary: Option<&Itinerary>) -> String {
        let mut out = String::new();
        for d in [DomainId(0), DomainId(1)] {
            let marks: Vec<Point> = itinerary
                .map(|it| {
                    it.steps
                        .iter()
                        .filter(|s| s.position.domain == d)
                        .map(|s| s.position.point)
                        .collect()
                })
                .unwrap_or_default();
            let _ = writeln!(out, "{d}:");
            if let Some(map) = self.terrain.render(d, 0, &marks) {
                let _ = writeln!(out, "{map}");
            }
        }
        out
    }
}
