//! Geometry primitives: [`Point`], [`DomainId`] and [`Position`].
//!
//! A [`Point`] is a plain integer coordinate. A [`Position`] pins a point to a
//! domain; positions in different domains have no meaningful distance.

use std::fmt;
use std::ops::Sub;

// ---------------------------------------------------------------------------
// Point
// ---------------------------------------------------------------------------

/// A 3D integer point. `z` is elevation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Point {
    /// Origin (0, 0, 0).
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    /// Create a new point.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// A point on the ground plane (`z == 0`).
    #[inline]
    pub const fn flat(x: i32, y: i32) -> Self {
        Self { x, y, z: 0 }
    }

    /// Return a point shifted by (dx, dy, dz).
    #[inline]
    pub const fn shift(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// The four planar neighbours (north, east, south, west).
    #[inline]
    pub fn neighbors_4(self) -> [Point; 4] {
        [
            self.shift(0, -1, 0),
            self.shift(1, 0, 0),
            self.shift(0, 1, 0),
            self.shift(-1, 0, 0),
        ]
    }

    /// The six face neighbours: the planar four plus above and below.
    #[inline]
    pub fn neighbors_6(self) -> [Point; 6] {
        [
            self.shift(0, -1, 0),
            self.shift(1, 0, 0),
            self.shift(0, 1, 0),
            self.shift(-1, 0, 0),
            self.shift(0, 0, 1),
            self.shift(0, 0, -1),
        ]
    }

    /// Euclidean distance to `other`.
    #[inline]
    pub fn euclidean(self, other: Point) -> f64 {
        let d = self - other;
        let (x, y, z) = (d.x as f64, d.y as f64, d.z as f64);
        (x * x + y * y + z * z).sqrt()
    }

    /// Manhattan (L1) distance to `other`.
    #[inline]
    pub fn manhattan(self, other: Point) -> i32 {
        let d = self - other;
        d.x.abs() + d.y.abs() + d.z.abs()
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Point {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.z
            .cmp(&other.z)
            .then(self.y.cmp(&other.y))
            .then(self.x.cmp(&other.x))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Sub for Point {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

// ---------------------------------------------------------------------------
// DomainId
// ---------------------------------------------------------------------------

/// Identifier of a disconnected coordinate space.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DomainId(pub u32);

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "domain#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A point inside a specific domain.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub domain: DomainId,
    pub point: Point,
}

impl Position {
    /// Create a new position.
    #[inline]
    pub const fn new(domain: DomainId, point: Point) -> Self {
        Self { domain, point }
    }

    /// Shorthand for a ground-plane position in `domain`.
    #[inline]
    pub const fn at(domain: u32, x: i32, y: i32) -> Self {
        Self {
            domain: DomainId(domain),
            point: Point::flat(x, y),
        }
    }

    /// The same domain, a different point.
    #[inline]
    pub const fn with_point(self, point: Point) -> Self {
        Self {
            domain: self.domain,
            point,
        }
    }

    /// Whether both positions live in the same domain.
    #[inline]
    pub fn same_domain(self, other: Position) -> bool {
        self.domain == other.domain
    }

    /// Euclidean distance, or `None` when the domains differ.
    pub fn distance(self, other: Position) -> Option<f64> {
        self.same_domain(other)
            .then(|| self.point.euclidean(other.point))
    }

    /// Manhattan distance, or `None` when the domains differ.
    pub fn manhattan(self, other: Position) -> Option<i32> {
        self.same_domain(other)
            .then(|| self.point.manhattan(other.point))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.point, self.domain)
    }
}


#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;

    #[test]
    fn position_round_trip() {
        let p = Position::new(DomainId(7), Point::new(3, -4, 12));
        let json = serde_json::to_string(&p).unwrap();
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
