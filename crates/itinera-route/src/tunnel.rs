//! Fixed-cost jumps between positions.

use std::fmt;

use itinera_core::Position;

/// A discrete jump from `origin` to `destination`, usually across domains.
///
/// A tunnel whose ends coincide is *stationary*: the graph uses zero-cost
/// stationary tunnels to stand for the overall origin and destination.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tunnel {
    pub origin: Position,
    pub destination: Position,
    pub cost: f64,
}

impl Tunnel {
    pub fn new(origin: Position, destination: Position, cost: f64) -> Self {
        Self {
            origin,
            destination,
            cost,
        }
    }

    /// A zero-cost tunnel that stays at `p`.
    pub fn stay(p: Position) -> Self {
        Self::new(p, p, 0.0)
    }

    pub fn is_stationary(&self) -> bool {
        self.origin == self.destination
    }
}

impl fmt::Display for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_stationary() {
            write!(f, "stay at {}", self.origin)
        } else {
            write!(f, "{} => {} ({})", self.origin, self.destination, self.cost)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stay_is_free_and_stationary() {
        let t = Tunnel::stay(Position::at(1, 2, 3));
        assert!(t.is_stationary());
        assert_eq!(t.cost, 0.0);
        assert_eq!(t.to_string(), "stay at (2, 3, 0)@domain#1");
    }

    #[test]
    fn display_jump() {
        let t = Tunnel::new(Position::at(0, 0, 0), Position::at(1, 0, 0), 8.0);
        assert!(!t.is_stationary());
        assert_eq!(t.to_string(), "(0, 0, 0)@domain#0 => (0, 0, 0)@domain#1 (8)");
    }
}
