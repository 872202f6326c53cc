//! The tunnel graph.
//!
//! Nodes are tunnels: index 0 is a stationary tunnel at the overall origin,
//! and a search for a position ends with a stationary tunnel there too. An
//! edge joins tunnel `a` to tunnel `b` whenever `a` exits into the domain
//! `b` starts in; its weight comes from the [`PathTrial`] between the two.
//! Each tunnel's cost is paid on arrival.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{MutexGuard, PoisonError};

use itinera_core::{DomainId, OwnerId, Position};
use itinera_paths::{ModeList, PathTrial, SharedTrial, Step, TrialEnv, mode_set};

use crate::itinerary::ItineraryTrial;
use crate::relax::TrustPolicy;
use crate::tunnel::Tunnel;

/// Where a search should end.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Destination {
    Position(Position),
    /// Anywhere in the domain.
    Domain(DomainId),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position(p) => write!(f, "{p}"),
            Self::Domain(d) => write!(f, "anywhere in {d}"),
        }
    }
}

pub(crate) fn lock(t: &SharedTrial) -> MutexGuard<'_, PathTrial> {
    t.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Edge {
    from: usize,
    to: usize,
    trial: SharedTrial,
}

#[derive(Copy, Clone)]
struct Entry {
    node: usize,
    dist: f64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for a min-heap; lower node index first on ties.
        other
            .dist
            .total_cmp(&self.dist)
            .then(other.node.cmp(&self.node))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Weighted graph of tunnels joined by path trials.
pub struct SearchGraph {
    owner: OwnerId,
    env: TrialEnv,
    tunnels: Vec<Tunnel>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<usize>>,
    targets: Vec<bool>,
}

impl SearchGraph {
    /// Build the graph for a search from `origin` to `destination` using
    /// `tunnels`. Edges are seeded from `env.cache` when possible and
    /// approximated otherwise.
    pub fn build(
        owner: OwnerId,
        env: TrialEnv,
        origin: Position,
        destination: Destination,
        tunnels: &[Tunnel],
        modes: ModeList,
    ) -> Self {
        let mut nodes = Vec::with_capacity(tunnels.len() + 2);
        nodes.push(Tunnel::stay(origin));
        nodes.extend_from_slice(tunnels);
        let end = match destination {
            Destination::Position(p) => {
                nodes.push(Tunnel::stay(p));
                Some(nodes.len() - 1)
            }
            Destination::Domain(_) => None,
        };
        let targets: Vec<bool> = nodes
            .iter()
            .enumerate()
            .map(|(i, t)| match destination {
                Destination::Position(_) => Some(i) == end,
                Destination::Domain(d) => t.destination.domain == d,
            })
            .collect();

        let set = mode_set(&modes);
        let mut edges = Vec::new();
        let mut outgoing = vec![Vec::new(); nodes.len()];
        let (mut cached, mut approximate) = (0, 0);
        for (i, a) in nodes.iter().enumerate() {
            if Some(i) == end {
                continue;
            }
            for (j, b) in nodes.iter().enumerate().skip(1) {
                if i == j || a.destination.domain != b.origin.domain {
                    continue;
                }
                let (from, to) = (a.destination, b.origin);
                let trial = if from == to {
                    PathTrial::successful(
                        env.clone(),
                        from,
                        to,
                        modes.clone(),
                        vec![Step::start(from)],
                        0.0,
                    )
                } else {
                    let hit = env
                        .cache
                        .as_ref()
                        .and_then(|c| c.get(&itinera_paths::CacheKey::new(from, to, set)));
                    match hit {
                        Some(path) => {
                            cached += 1;
                            PathTrial::cached(env.clone(), from, to, modes.clone(), path)
                        }
                        None => {
                            approximate += 1;
                            PathTrial::approximate(env.clone(), from, to, modes.clone())
                        }
                    }
                };
                outgoing[i].push(edges.len());
                edges.push(Edge {
                    from: i,
                    to: j,
                    trial: trial.share(),
                });
            }
        }
        log::debug!(
            "{owner}: graph with {} tunnels, {} edges ({cached} cached, {approximate} approximate)",
            nodes.len(),
            edges.len()
        );
        Self {
            owner,
            env,
            tunnels: nodes,
            edges,
            outgoing,
            targets,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Tunnel nodes, the synthetic ones included.
    pub fn tunnels(&self) -> &[Tunnel] {
        &self.tunnels
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The trial on the edge from tunnel `from` to tunnel `to`.
    pub fn trial(&self, from: usize, to: usize) -> Option<SharedTrial> {
        self.outgoing
            .get(from)?
            .iter()
            .map(|&e| &self.edges[e])
            .find(|e| e.to == to)
            .map(|e| e.trial.clone())
    }

    /// Weight of an edge under `policy`, or `None` if it is unusable.
    fn weight(trial: &PathTrial, policy: TrustPolicy, exclude_cached: bool) -> Option<f64> {
        let state = trial.state();
        if trial.is_from_cache() {
            if exclude_cached && !trial.is_verified() {
                return None;
            }
            return match policy {
                TrustPolicy::AlwaysUse => state.is_successful().then(|| trial.length()),
                TrustPolicy::UseIfPossible if state.is_successful() => Some(trial.length()),
                TrustPolicy::UseIfPossible | TrustPolicy::NeverUse => Some(trial.estimate()),
            };
        }
        if state.is_stopped() {
            state.is_successful().then(|| trial.length())
        } else {
            Some(trial.estimate())
        }
    }

    /// The cheapest tunnel sequence under `policy`, using each trial's
    /// current length (possibly only an estimate). With `exclude_cached`,
    /// cache-derived edges that were never revalidated are left out.
    pub fn calculate(&self, policy: TrustPolicy, exclude_cached: bool) -> Option<ItineraryTrial> {
        let n = self.tunnels.len();
        let mut dist = vec![f64::INFINITY; n];
        let mut via: Vec<Option<usize>> = vec![None; n];
        let mut done = vec![false; n];
        let mut heap = BinaryHeap::new();
        dist[0] = self.tunnels[0].cost;
        heap.push(Entry {
            node: 0,
            dist: dist[0],
        });

        let mut reached = None;
        while let Some(Entry { node, dist: d }) = heap.pop() {
            if done[node] {
                continue;
            }
            done[node] = true;
            if self.targets[node] {
                reached = Some(node);
                break;
            }
            for &e in &self.outgoing[node] {
                let edge = &self.edges[e];
                let Some(w) = Self::weight(&lock(&edge.trial), policy, exclude_cached) else {
                    continue;
                };
                let nd = d + w + self.tunnels[edge.to].cost;
                if nd < dist[edge.to] {
                    dist[edge.to] = nd;
                    via[edge.to] = Some(e);
                    heap.push(Entry {
                        node: edge.to,
                        dist: nd,
                    });
                }
            }
        }

        let end = reached?;
        let mut tunnels = vec![self.tunnels[end]];
        let mut trials = Vec::new();
        let mut cur = end;
        while let Some(e) = via[cur] {
            let edge = &self.edges[e];
            trials.push(edge.trial.clone());
            tunnels.push(self.tunnels[edge.from]);
            cur = edge.from;
        }
        tunnels.reverse();
        trials.reverse();
        log::trace!(
            "{}: candidate with {} segments, estimate {} ({policy})",
            self.owner,
            trials.len(),
            dist[end]
        );
        Some(ItineraryTrial::new(
            self.owner,
            self.env.events.clone(),
            tunnels,
            trials,
            dist[end],
        ))
    }

    /// Turn every cache-derived edge that was never revalidated back into an
    /// approximate one. Returns how many were reset.
    pub fn forget_unverified(&self) -> usize {
        let mut n = 0;
        for edge in &self.edges {
            let mut t = lock(&edge.trial);
            if t.is_from_cache() && !t.is_verified() {
                t.reset();
                n += 1;
            }
        }
        n
    }
}
