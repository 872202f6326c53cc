//! Explicit join: a countdown of outstanding tasks plus a callback fired when
//! it reaches zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::task::Task;

pub struct Join {
    remaining: AtomicUsize,
    on_zero: Mutex<Option<Task>>,
}

impl Join {
    /// Wait for `count` arrivals. With `count == 0` the callback runs
    /// immediately, on the calling thread.
    pub fn new(count: usize, on_zero: impl FnOnce() + Send + 'static) -> Arc<Self> {
        let join = Arc::new(Self {
            remaining: AtomicUsize::new(count),
            on_zero: Mutex::new(Some(Box::new(on_zero))),
        });
        if count == 0 {
            join.fire();
        }
        join
    }

    /// Record one arrival. The arrival that brings the count to zero runs the
    /// callback; extra arrivals are ignored.
    pub fn arrive(&self) {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if prev == Ok(1) {
            self.fire();
        }
    }

    /// Arrivals still outstanding.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    fn fire(&self) {
        let f = self
            .on_zero
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(f) = f {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn fires_once_at_zero() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let join = Join::new(3, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        join.arrive();
        join.arrive();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(join.remaining(), 1);
        join.arrive();
        join.arrive();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(join.remaining(), 0);
    }

    #[test]
    fn zero_count_fires_immediately() {
        let fired = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&fired);
        Join::new(0, move || f.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn concurrent_arrivals() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let join = Join::new(16, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let threads: Vec<_> = (0..16)
            .map(|_| {
                let j = Arc::clone(&join);
                thread::spawn(move || j.arrive())
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
