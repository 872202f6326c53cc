//! Node arena and frontier for the resumable A* search.
//!
//! Nodes live in a `Vec` and refer to their parent by index. The frontier is
//! a binary heap of lightweight references; a reference whose recorded score
//! no longer matches its node's score is stale and gets skipped when popped.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use itinera_core::Position;

use crate::mode::Step;

/// Index of a node in the arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeIndex(pub u32);

impl NodeIndex {
    #[inline]
    fn get(self) -> usize {
        self.0 as usize
    }
}

/// One visited position.
#[derive(Clone, Debug)]
pub(crate) struct SearchNode {
    /// The step that reached this position on the cheapest known path.
    pub step: Step,
    pub parent: Option<NodeIndex>,
    /// Cumulative cost from the origin. Only ever decreases.
    pub score: f64,
    /// Whether the node has been expanded since its score last changed.
    pub popped: bool,
}

/// Reference into the arena, ordered by evaluation for use in `BinaryHeap`.
#[derive(Copy, Clone, Debug)]
pub(crate) struct FrontierRef {
    pub(crate) idx: NodeIndex,
    pub(crate) f: f64,
    pub(crate) tie: f64,
    pub(crate) score: f64,
    pub(crate) seq: u64,
}

impl PartialEq for FrontierRef {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierRef {}

impl Ord for FrontierRef {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so BinaryHeap (max-heap) pops smallest f first, then
        // smallest tie-break, then oldest.
        other
            .f
            .total_cmp(&self.f)
            .then(other.tie.total_cmp(&self.tie))
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FrontierRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Whether [`SearchSpace::offer`] inserted, improved or ignored a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Offer {
    Inserted,
    Relaxed { was_popped: bool },
    Ignored,
    Full,
}

/// All state of one in-progress search.
#[derive(Debug, Default)]
pub(crate) struct SearchSpace {
    nodes: Vec<SearchNode>,
    visited: HashMap<Position, NodeIndex>,
    frontier: BinaryHeap<FrontierRef>,
    seq: u64,
}

impl SearchSpace {
    pub(crate) fn visited(&self) -> usize {
        self.visited.len()
    }

    pub(crate) fn node(&self, idx: NodeIndex) -> &SearchNode {
        &self.nodes[idx.get()]
    }

    fn push(&mut self, idx: NodeIndex, f: f64, tie: f64) {
        let score = self.nodes[idx.get()].score;
        self.seq += 1;
        self.frontier.push(FrontierRef {
            idx,
            f,
            tie,
            score,
            seq: self.seq,
        });
    }

    /// Record `step` reached from `parent` at cumulative cost `score`, with
    /// heuristic `h` and tie-break `tie`. New positions are refused once the
    /// visited set holds `cap` entries.
    pub(crate) fn offer(
        &mut self,
        step: Step,
        parent: Option<NodeIndex>,
        score: f64,
        h: f64,
        tie: f64,
        cap: usize,
    ) -> Offer {
        match self.visited.get(&step.position).copied() {
            Some(idx) => {
                let node = &mut self.nodes[idx.get()];
                if score >= node.score {
                    return Offer::Ignored;
                }
                let was_popped = node.popped;
                node.step = step;
                node.parent = parent;
                node.score = score;
                node.popped = false;
                self.push(idx, score + h, tie);
                Offer::Relaxed { was_popped }
            }
            None => {
                if self.visited.len() >= cap {
                    return Offer::Full;
                }
                let idx = NodeIndex(self.nodes.len() as u32);
                self.nodes.push(SearchNode {
                    step,
                    parent,
                    score,
                    popped: false,
                });
                self.visited.insert(step.position, idx);
                self.push(idx, score + h, tie);
                Offer::Inserted
            }
        }
    }

    /// Pop the best live frontier entry and mark its node expanded. Stale
    /// entries are discarded. `None` once the frontier is empty.
    pub(crate) fn pop(&mut self) -> Option<NodeIndex> {
        while let Some(r) = self.frontier.pop() {
            let node = &mut self.nodes[r.idx.get()];
            // Skip stale entries.
            if r.score > node.score || node.popped {
                continue;
            }
            node.popped = true;
            return Some(r.idx);
        }
        None
    }

    /// Steps from the root to `idx`.
    pub(crate) fn path_to(&self, idx: NodeIndex) -> Vec<Step> {
        let mut path = Vec::new();
        let mut cur = Some(idx);
        while let Some(i) = cur {
            let node = self.node(i);
            path.push(node.step);
            cur = node.parent;
        }
        path.reverse();
        path
    }
}
