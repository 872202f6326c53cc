//! Movement modes: [`ModeType`], [`ModeSet`], [`MoveOption`], [`Step`] and
//! the [`Mode`] trait.

use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::sync::Arc;

use itinera_core::{Position, Result};

use crate::block::BlockProvider;

// ---------------------------------------------------------------------------
// ModeType
// ---------------------------------------------------------------------------

/// Tag identifying how a step was taken.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModeType {
    Walk,
    Swim,
    Climb,
    Fly,
    Dig,
    /// A jump along a tunnel, or the standing start of a path.
    Tunnel,
}

impl ModeType {
    pub const ALL: [ModeType; 6] = [
        ModeType::Walk,
        ModeType::Swim,
        ModeType::Climb,
        ModeType::Fly,
        ModeType::Dig,
        ModeType::Tunnel,
    ];

    #[inline]
    const fn bit(self) -> u8 {
        1 << self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Walk => "walk",
            Self::Swim => "swim",
            Self::Climb => "climb",
            Self::Fly => "fly",
            Self::Dig => "dig",
            Self::Tunnel => "tunnel",
        }
    }
}

impl fmt::Display for ModeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// ModeSet
// ---------------------------------------------------------------------------

/// Bitmask of [`ModeType`]s. Part of every cache key: a path found with one
/// set of modes says nothing about another.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModeSet(pub u8);

impl ModeSet {
    pub const NONE: Self = Self(0);

    /// A set holding a single mode.
    #[inline]
    pub const fn of(mode: ModeType) -> Self {
        Self(mode.bit())
    }

    #[inline]
    pub const fn contains(self, mode: ModeType) -> bool {
        self.0 & mode.bit() != 0
    }

    #[inline]
    pub const fn with(self, mode: ModeType) -> Self {
        Self(self.0 | mode.bit())
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The modes in declaration order.
    pub fn iter(self) -> impl Iterator<Item = ModeType> {
        ModeType::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl FromIterator<ModeType> for ModeSet {
    fn from_iter<I: IntoIterator<Item = ModeType>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

impl BitOr for ModeSet {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for ModeSet {
    type Output = Self;
    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for ModeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        f.write_str("[")?;
        for m in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            f.write_str(m.name())?;
        }
        f.write_str("]")
    }
}

// ---------------------------------------------------------------------------
// MoveOption / Step
// ---------------------------------------------------------------------------

/// A neighbour reachable from some position.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MoveOption {
    pub to: Position,
    pub cost: f64,
    pub mode: ModeType,
}

/// One step of a path or itinerary: where, what it cost to get there, and
/// how.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Step {
    pub position: Position,
    pub cost: f64,
    pub mode: ModeType,
}

impl Step {
    /// A zero-cost tunnel-tagged step: the standing start of a path.
    #[inline]
    pub const fn start(position: Position) -> Self {
        Self {
            position,
            cost: 0.0,
            mode: ModeType::Tunnel,
        }
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// A movement style.
pub trait Mode: Send + Sync {
    fn mode_type(&self) -> ModeType;

    /// Append the moves available from `from` to `out`. The caller clears
    /// `out` first.
    fn options(
        &self,
        from: Position,
        blocks: &dyn BlockProvider,
        out: &mut Vec<MoveOption>,
    ) -> Result<()>;
}

/// The modes a trial may use, shared between trials.
pub type ModeList = Arc<[Arc<dyn Mode>]>;

/// The tags of `modes`.
pub fn mode_set(modes: &[Arc<dyn Mode>]) -> ModeSet {
    modes.iter().map(|m| m.mode_type()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_set_membership() {
        let set: ModeSet = [ModeType::Walk, ModeType::Swim].into_iter().collect();
        assert!(set.contains(ModeType::Walk));
        assert!(set.contains(ModeType::Swim));
        assert!(!set.contains(ModeType::Fly));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![ModeType::Walk, ModeType::Swim]);
        assert_eq!(set & ModeSet::of(ModeType::Swim), ModeSet::of(ModeType::Swim));
        assert_eq!(set | ModeSet::of(ModeType::Dig), set.with(ModeType::Dig));
        assert!(ModeSet::NONE.is_empty());
    }

    #[test]
    fn mode_set_display() {
        let set = ModeSet::of(ModeType::Fly).with(ModeType::Walk);
        assert_eq!(set.to_string(), "[walk,fly]");
        assert_eq!(ModeSet::NONE.to_string(), "[]");
    }

    #[test]
    fn start_step_is_free() {
        let s = Step::start(Position::at(0, 1, 2));
        assert_eq!(s.cost, 0.0);
        assert_eq!(s.mode, ModeType::Tunnel);
    }
}
