//! Goal tests and heuristics for path trials.

use itinera_core::{DomainId, Position};

/// What a path trial is looking for.
pub trait Goal: Send + Sync {
    /// Heuristic cost from `p` to the goal. Should not overestimate.
    fn estimate(&self, p: Position) -> f64;

    /// Secondary ordering among frontier entries with equal evaluation;
    /// lower goes first.
    fn tie_break(&self, _p: Position) -> f64 {
        0.0
    }

    fn is_complete(&self, p: Position) -> bool;
}

/// Reach one exact position. Euclidean heuristic, ties go to the lower
/// elevation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReachPosition {
    pub target: Position,
}

impl ReachPosition {
    pub fn new(target: Position) -> Self {
        Self { target }
    }
}

impl Goal for ReachPosition {
    fn estimate(&self, p: Position) -> f64 {
        p.distance(self.target).unwrap_or(f64::INFINITY)
    }

    fn tie_break(&self, p: Position) -> f64 {
        p.point.z as f64
    }

    fn is_complete(&self, p: Position) -> bool {
        p == self.target
    }
}

/// Reach any position in a domain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReachDomain {
    pub domain: DomainId,
}

impl Goal for ReachDomain {
    fn estimate(&self, _p: Position) -> f64 {
        0.0
    }

    fn is_complete(&self, p: Position) -> bool {
        p.domain == self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itinera_core::Point;

    #[test]
    fn reach_position() {
        let g = ReachPosition::new(Position::at(0, 3, 4));
        assert_eq!(g.estimate(Position::at(0, 0, 0)), 5.0);
        assert_eq!(g.estimate(Position::at(1, 0, 0)), f64::INFINITY);
        assert!(g.is_complete(Position::at(0, 3, 4)));
        assert!(!g.is_complete(Position::at(1, 3, 4)));
        let up = Position::new(DomainId(0), Point::new(0, 0, 2));
        assert!(g.tie_break(up) > g.tie_break(Position::at(0, 0, 0)));
    }

    #[test]
    fn reach_domain() {
        let g = ReachDomain {
            domain: DomainId(2),
        };
        assert!(g.is_complete(Position::at(2, 100, -3)));
        assert!(!g.is_complete(Position::at(1, 0, 0)));
        assert_eq!(g.estimate(Position::at(1, 0, 0)), 0.0);
    }
}
