//! Delayed entries ordered by due tick.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// `(due tick, submission number)`: the smaller key is released first, so
/// entries due on the same tick come out in submission order.
type Key = (u64, u64);

struct Timed<E> {
    key: Reverse<Key>,
    item: E,
}

impl<E> PartialEq for Timed<E> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<E> Eq for Timed<E> {}

impl<E> PartialOrd for Timed<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Timed<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Items waiting for a tick.
pub struct TickQueue<E> {
    heap: BinaryHeap<Timed<E>>,
    submitted: u64,
}

impl<E> TickQueue<E> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            submitted: 0,
        }
    }

    /// Hold `item` until `tick`.
    pub fn push(&mut self, item: E, tick: u64) {
        self.submitted += 1;
        self.heap.push(Timed {
            key: Reverse((tick, self.submitted)),
            item,
        });
    }

    /// Tick the earliest item is due at.
    pub fn next_tick(&self) -> Option<u64> {
        self.heap.peek().map(|t| t.key.0.0)
    }

    /// Release the earliest item if it is due by `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<E> {
        if self.next_tick()? > now {
            return None;
        }
        self.heap.pop().map(|t| t.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop every item `keep` rejects. Returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&E) -> bool) -> usize {
        let before = self.heap.len();
        self.heap.retain(|t| keep(&t.item));
        before - self.heap.len()
    }
}

impl<E> Default for TickQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}
