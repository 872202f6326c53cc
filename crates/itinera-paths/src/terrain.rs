//! An in-memory [`BlockProvider`] built from ASCII art.
//!
//! Each domain is a stack of layers, one per elevation. A layer is parsed
//! from text where every line has the same width:
//!
//! | Char | Block |
//! |---|---|
//! | `#` | [`Block::SOLID`] |
//! | `~` | [`Block::WATER`] |
//! | `H` | [`Block::LADDER`] |
//! | anything else | [`Block::AIR`] |
//!
//! Anything outside every layer is solid.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use itinera_core::{DomainId, Point, Position, Result};

use crate::block::{Block, BlockProvider};

#[derive(Clone, Debug)]
struct Layer {
    width: i32,
    height: i32,
    cells: Vec<Block>,
}

impl Layer {
    fn parse(s: &str) -> std::result::Result<Self, TerrainError> {
        let s = s.trim();
        let mut width = -1;
        let mut height = 0;
        let mut cells = Vec::with_capacity(s.len());
        for line in s.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let w = line.chars().count() as i32;
            if width >= 0 && w != width {
                return Err(TerrainError::InconsistentSize {
                    line: height,
                    expected: width,
                    found: w,
                });
            }
            width = w;
            cells.extend(line.chars().map(block_for));
            height += 1;
        }
        if width <= 0 {
            return Err(TerrainError::Empty);
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    fn idx(&self, x: i32, y: i32) -> Option<usize> {
        (x >= 0 && y >= 0 && x < self.width && y < self.height)
            .then(|| (y * self.width + x) as usize)
    }
}

fn block_for(ch: char) -> Block {
    match ch {
        '#' => Block::SOLID,
        '~' => Block::WATER,
        'H' => Block::LADDER,
        _ => Block::AIR,
    }
}

fn char_for(b: Block) -> char {
    match b {
        Block::SOLID => '#',
        Block::WATER => '~',
        Block::LADDER => 'H',
        _ => '.',
    }
}

/// Layered ASCII terrain. Layers can be edited after construction through
/// [`set`](Self::set), which is how tests simulate changing geometry.
#[derive(Debug, Default)]
pub struct Terrain {
    layers: RwLock<HashMap<(DomainId, i32), Layer>>,
}

impl Terrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the layer at elevation `z` of `domain` (builder).
    pub fn with_layer(
        self,
        domain: u32,
        z: i32,
        ascii: &str,
    ) -> std::result::Result<Self, TerrainError> {
        self.add_layer(DomainId(domain), z, ascii)?;
        Ok(self)
    }

    /// Add or replace the layer at elevation `z` of `domain`.
    pub fn add_layer(
        &self,
        domain: DomainId,
        z: i32,
        ascii: &str,
    ) -> std::result::Result<(), TerrainError> {
        let layer = Layer::parse(ascii)?;
        self.layers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((domain, z), layer);
        Ok(())
    }

    /// Overwrite one cell. Returns `false` if `pos` lies outside every layer.
    pub fn set(&self, pos: Position, block: Block) -> bool {
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(layer) = layers.get_mut(&(pos.domain, pos.point.z)) else {
            return false;
        };
        match layer.idx(pos.point.x, pos.point.y) {
            Some(i) => {
                layer.cells[i] = block;
                true
            }
            None => false,
        }
    }

    /// Block at `pos`, solid when outside every layer.
    pub fn block(&self, pos: Position) -> Block {
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        layers
            .get(&(pos.domain, pos.point.z))
            .and_then(|l| l.idx(pos.point.x, pos.point.y).map(|i| l.cells[i]))
            .unwrap_or(Block::SOLID)
    }

    /// (width, height) of a layer.
    pub fn layer_size(&self, domain: DomainId, z: i32) -> Option<(i32, i32)> {
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        layers.get(&(domain, z)).map(|l| (l.width, l.height))
    }

    /// Every open cell of `domain`, in elevation-major order.
    pub fn open_cells(&self, domain: DomainId) -> Vec<Position> {
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = Vec::new();
        for (&(d, z), layer) in layers.iter() {
            if d != domain {
                continue;
            }
            for y in 0..layer.height {
                for x in 0..layer.width {
                    if layer.cells[(y * layer.width + x) as usize].is_open() {
                        out.push(Position::new(d, Point::new(x, y, z)));
                    }
                }
            }
        }
        out.sort();
        out
    }

    /// Render a layer back to text, marking `marks` with `*`.
    pub fn render(&self, domain: DomainId, z: i32, marks: &[Point]) -> Option<String> {
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        let layer = layers.get(&(domain, z))?;
        let mut s = String::with_capacity(layer.cells.len() + layer.height as usize);
        for y in 0..layer.height {
            if y > 0 {
                s.push('\n');
            }
            for x in 0..layer.width {
                if marks.contains(&Point::new(x, y, z)) {
                    s.push('*');
                } else {
                    s.push(char_for(layer.cells[(y * layer.width + x) as usize]));
                }
            }
        }
        Some(s)
    }
}

impl BlockProvider for Terrain {
    fn query(&self, pos: Position) -> Result<Block> {
        Ok(self.block(pos))
    }
}

/// Errors that can occur when parsing a terrain layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerrainError {
    /// The text holds no cells.
    Empty,
    /// A line's width differs from the first line's.
    InconsistentSize { line: i32, expected: i32, found: i32 },
}

impl fmt::Display for TerrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("terrain: empty layer"),
            Self::InconsistentSize {
                line,
                expected,
                found,
            } => write!(
                f,
                "terrain: line {line} is {found} cells wide, expected {expected}"
            ),
        }
    }
}

impl std::error::Error for TerrainError {}
