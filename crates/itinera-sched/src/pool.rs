//! A fixed-size worker pool implementing [`TaskScheduler`].
//!
//! Ticks are wall-clock intervals measured from the pool's creation. Workers
//! sleep on a condvar until a task is ready or the next timed task falls due.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::task::{Agenda, RepeatingTask, Task, TaskHandle, TaskScheduler};

struct PoolState {
    agenda: Agenda,
    shutdown: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    wake: Condvar,
    tick: Duration,
    epoch: Instant,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_tick(&self) -> u64 {
        (self.epoch.elapsed().as_nanos() / self.tick.as_nanos().max(1)) as u64
    }

    fn until_tick(&self, tick: u64) -> Duration {
        u32::try_from(tick)
            .ok()
            .and_then(|t| self.tick.checked_mul(t))
            .and_then(|d| self.epoch.checked_add(d))
            .map_or(Duration::from_secs(3600), |at| {
                at.saturating_duration_since(Instant::now())
            })
    }
}

/// Worker threads pulling from a shared agenda.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Spawn `workers` threads (at least one). One tick lasts `tick`.
    pub fn new(workers: usize, tick: Duration) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                agenda: Agenda::default(),
                shutdown: false,
            }),
            wake: Condvar::new(),
            tick: tick.max(Duration::from_millis(1)),
            epoch: Instant::now(),
        });
        let pool = Self {
            shared,
            workers: Mutex::new(Vec::new()),
        };
        for i in 0..workers.max(1) {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("itinera-worker-{i}"))
                .spawn(move || worker_loop(&shared))?;
            pool.workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(handle);
        }
        log::debug!("thread pool started with {} workers", workers.max(1));
        Ok(pool)
    }

    /// Number of tasks waiting (ready or timed).
    pub fn pending(&self) -> usize {
        self.shared.lock().agenda.len()
    }

    /// Stop accepting work, drop queued tasks and join the workers. Workers
    /// finish the task they are running first.
    pub fn shutdown(&self) {
        {
            let mut st = self.shared.lock();
            if st.shutdown {
                return;
            }
            st.shutdown = true;
        }
        self.shared.wake.notify_all();
        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let me = thread::current().id();
        for h in handles {
            // The last reference may be dropped by a task on a worker.
            if h.thread().id() != me {
                h.join().ok();
            }
        }
        log::debug!("thread pool stopped");
    }

    fn submit(&self, f: impl FnOnce(&mut Agenda) -> TaskHandle) -> TaskHandle {
        let handle = {
            let mut st = self.shared.lock();
            let now = self.shared.current_tick();
            st.agenda.advance_to(now);
            f(&mut st.agenda)
        };
        self.shared.wake.notify_one();
        handle
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl TaskScheduler for ThreadPool {
    fn schedule(&self, task: Task, background: bool) -> TaskHandle {
        self.submit(|a| a.push_now(task, background))
    }

    fn schedule_delayed(&self, task: Task, delay_ticks: u64) -> TaskHandle {
        self.submit(|a| a.push_delayed(task, delay_ticks))
    }

    fn schedule_repeat(&self, task: RepeatingTask, period_ticks: u64) -> TaskHandle {
        self.submit(|a| a.push_repeat(task, period_ticks))
    }

    fn cancel(&self, handle: TaskHandle) {
        self.shared.lock().agenda.cancel(handle);
    }

    fn tick(&self) -> Duration {
        self.shared.tick
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let entry = {
            let mut st = shared.lock();
            loop {
                if st.shutdown {
                    return;
                }
                let now = shared.current_tick();
                st.agenda.advance_to(now);
                if let Some(entry) = st.agenda.pop_ready() {
                    break entry;
                }
                st = match st.agenda.next_due() {
                    Some(due) => {
                        let wait = shared.until_tick(due);
                        shared
                            .wake
                            .wait_timeout(st, wait)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0
                    }
                    None => shared
                        .wake
                        .wait(st)
                        .unwrap_or_else(PoisonError::into_inner),
                };
            }
        };
        log::trace!("running {}", entry.handle);
        if let Some(again) = entry.run() {
            let mut st = shared.lock();
            let now = shared.current_tick();
            st.agenda.advance_to(now);
            st.agenda.requeue(again);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn runs_tasks_on_workers() {
        let pool = ThreadPool::new(2, Duration::from_millis(5)).unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            pool.schedule(
                Box::new(move || {
                    tx.send(i).ok();
                }),
                true,
            );
        }
        let mut got: Vec<i32> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        got.sort();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn delayed_task_waits() {
        let pool = ThreadPool::new(1, Duration::from_millis(10)).unwrap();
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();
        pool.schedule_delayed(
            Box::new(move || {
                tx.send(Instant::now()).ok();
            }),
            3,
        );
        let fired = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(fired.duration_since(start) >= Duration::from_millis(15));
    }

    #[test]
    fn repeat_stops_after_cancel() {
        let pool = ThreadPool::new(1, Duration::from_millis(2)).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let (tx, rx) = mpsc::channel();
        let handle = pool.schedule_repeat(
            Box::new(move || {
                if h.fetch_add(1, Ordering::SeqCst) == 2 {
                    tx.send(()).ok();
                }
            }),
            1,
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pool.cancel(handle);
        thread::sleep(Duration::from_millis(20));
        let settled = hits.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(hits.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn cancelled_delayed_task_is_released() {
        let pool = ThreadPool::new(1, Duration::from_millis(10)).unwrap();
        let held = Arc::new(());
        let h = Arc::clone(&held);
        let hour = pool.ticks_for(Duration::from_secs(3600));
        let handle = pool.schedule_delayed(Box::new(move || drop(h)), hour);
        assert_eq!(pool.pending(), 1);
        pool.cancel(handle);
        assert_eq!(pool.pending(), 0);
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[test]
    fn ticks_follow_the_pool_tick() {
        let pool = ThreadPool::new(1, Duration::from_millis(10)).unwrap();
        assert_eq!(pool.tick(), Duration::from_millis(10));
        assert_eq!(pool.ticks_for(Duration::from_secs(2)), 200);
        assert_eq!(pool.ticks_for(Duration::from_millis(15)), 2);
        assert_eq!(pool.ticks_for(Duration::ZERO), 1);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let pool = ThreadPool::new(3, Duration::from_millis(5)).unwrap();
        pool.shutdown();
        pool.shutdown();
        assert_eq!(pool.pending(), 0);
    }
}
