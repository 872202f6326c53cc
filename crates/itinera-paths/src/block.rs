//! Terrain facts and the provider trait modes query them through.

use itinera_core::{Position, Result};

/// What occupies one cell of a domain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block(pub u8);

impl Block {
    pub const AIR: Self = Self(0);
    pub const SOLID: Self = Self(1);
    pub const WATER: Self = Self(2);
    pub const LADDER: Self = Self(3);

    /// Air or ladder: something a body can stand in.
    #[inline]
    pub const fn is_open(self) -> bool {
        self.0 == Self::AIR.0 || self.0 == Self::LADDER.0
    }

    #[inline]
    pub const fn is_solid(self) -> bool {
        self.0 == Self::SOLID.0
    }

    #[inline]
    pub const fn is_water(self) -> bool {
        self.0 == Self::WATER.0
    }

    #[inline]
    pub const fn is_climbable(self) -> bool {
        self.0 == Self::LADDER.0
    }
}

/// Answers geometry queries for the modes.
///
/// Implementations may be backed by anything (a live world, a snapshot, a
/// test fixture) and may fail; a failure is reported as
/// [`SearchError::Platform`](itinera_core::SearchError::Platform).
pub trait BlockProvider: Send + Sync {
    /// The block at `pos`.
    fn query(&self, pos: Position) -> Result<Block>;

    /// Hint that the neighbourhood of `pos` is about to be queried.
    fn prefetch(&self, _pos: Position) -> Result<()> {
        Ok(())
    }
}
