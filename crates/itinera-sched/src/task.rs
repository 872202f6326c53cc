//! The generic task scheduler interface and the bookkeeping its
//! implementations share.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use crate::queue::TickQueue;

/// A one-shot task.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A task run every `period` ticks until cancelled.
pub type RepeatingTask = Box<dyn FnMut() + Send + 'static>;

/// Handle used to cancel a scheduled task.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Runs tasks, now or after a number of ticks.
///
/// Foreground work (`background == false`) is run ahead of background work
/// that is already waiting.
pub trait TaskScheduler: Send + Sync {
    /// Run `task` as soon as possible.
    fn schedule(&self, task: Task, background: bool) -> TaskHandle;

    /// Run `task` once, `delay_ticks` ticks from now.
    fn schedule_delayed(&self, task: Task, delay_ticks: u64) -> TaskHandle;

    /// Run `task` every `period_ticks` ticks (the first run is one period from
    /// now) until cancelled.
    fn schedule_repeat(&self, task: RepeatingTask, period_ticks: u64) -> TaskHandle;

    /// Cancel a task that has not started yet; the task is dropped right
    /// away. Repeating tasks stop after their current run. Unknown or
    /// finished handles are ignored.
    fn cancel(&self, handle: TaskHandle);

    /// Wall-clock length of one tick.
    fn tick(&self) -> Duration;

    /// Whole ticks covering `d`, at least one.
    fn ticks_for(&self, d: Duration) -> u64 {
        let tick = self.tick().as_nanos().max(1);
        u64::try_from(d.as_nanos().div_ceil(tick))
            .unwrap_or(u64::MAX)
            .max(1)
    }
}

// ---------------------------------------------------------------------------
// Agenda
// ---------------------------------------------------------------------------

pub(crate) enum Job {
    Once(Task),
    Repeat { task: RepeatingTask, period: u64 },
}

pub(crate) struct Entry {
    pub(crate) handle: TaskHandle,
    pub(crate) job: Job,
}

impl Entry {
    /// Run the task. A panic is contained and logged so it cannot take a
    /// worker down. Returns the entry again if it repeats.
    pub(crate) fn run(self) -> Option<Entry> {
        let handle = self.handle;
        match self.job {
            Job::Once(task) => {
                if catch_unwind(AssertUnwindSafe(task)).is_err() {
                    log::error!("{handle} panicked");
                }
                None
            }
            Job::Repeat { mut task, period } => {
                if catch_unwind(AssertUnwindSafe(&mut task)).is_err() {
                    log::error!("{handle} panicked; it will not repeat");
                    return None;
                }
                Some(Entry {
                    handle,
                    job: Job::Repeat { task, period },
                })
            }
        }
    }
}

/// Ready and timed task queues plus cancellation state.
///
/// Implementations keep an `Agenda` behind their own lock and run the popped
/// entries outside of it, so tasks may schedule further tasks.
#[derive(Default)]
pub(crate) struct Agenda {
    now: u64,
    next_id: u64,
    ready: VecDeque<Entry>,
    timed: TickQueue<Entry>,
    live: HashSet<TaskHandle>,
    canceled: HashSet<TaskHandle>,
}

impl Agenda {
    pub(crate) fn now(&self) -> u64 {
        self.now
    }

    fn handle(&mut self) -> TaskHandle {
        self.next_id += 1;
        let h = TaskHandle(self.next_id);
        self.live.insert(h);
        h
    }

    pub(crate) fn push_now(&mut self, task: Task, background: bool) -> TaskHandle {
        let handle = self.handle();
        let entry = Entry {
            handle,
            job: Job::Once(task),
        };
        if background {
            self.ready.push_back(entry);
        } else {
            self.ready.push_front(entry);
        }
        handle
    }

    pub(crate) fn push_delayed(&mut self, task: Task, delay: u64) -> TaskHandle {
        let handle = self.handle();
        let due = self.now + delay;
        self.timed.push(
            Entry {
                handle,
                job: Job::Once(task),
            },
            due,
        );
        handle
    }

    pub(crate) fn push_repeat(&mut self, task: RepeatingTask, period: u64) -> TaskHandle {
        let handle = self.handle();
        let period = period.max(1);
        self.timed.push(
            Entry {
                handle,
                job: Job::Repeat { task, period },
            },
            self.now + period,
        );
        handle
    }

    /// Put a repeating task back after it ran.
    pub(crate) fn requeue(&mut self, entry: Entry) {
        if self.canceled.remove(&entry.handle) {
            self.live.remove(&entry.handle);
            return;
        }
        if let Job::Repeat { period, .. } = &entry.job {
            let due = self.now + *period;
            self.timed.push(entry, due);
        }
    }

    /// Queued entries are dropped at once. An entry that is running right
    /// now (a repeating task) is marked and dropped when it comes back.
    pub(crate) fn cancel(&mut self, handle: TaskHandle) {
        if !self.live.contains(&handle) {
            return;
        }
        let queued = self.ready.len();
        self.ready.retain(|e| e.handle != handle);
        let dropped = queued - self.ready.len() + self.timed.retain(|e| e.handle != handle);
        if dropped > 0 {
            self.live.remove(&handle);
        } else {
            self.canceled.insert(handle);
        }
    }

    /// Move the clock forward (never backwards) and release due entries.
    pub(crate) fn advance_to(&mut self, tick: u64) {
        self.now = self.now.max(tick);
        while let Some(entry) = self.timed.pop_due(self.now) {
            self.ready.push_back(entry);
        }
    }

    /// Next runnable entry, skipping cancelled ones.
    pub(crate) fn pop_ready(&mut self) -> Option<Entry> {
        while let Some(entry) = self.ready.pop_front() {
            if self.canceled.remove(&entry.handle) {
                self.live.remove(&entry.handle);
                continue;
            }
            if matches!(entry.job, Job::Once(_)) {
                self.live.remove(&entry.handle);
            }
            return Some(entry);
        }
        None
    }

    pub(crate) fn next_due(&self) -> Option<u64> {
        self.timed.next_tick()
    }

    pub(crate) fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Entries waiting in either queue.
    pub(crate) fn len(&self) -> usize {
        self.ready.len() + self.timed.len()
    }
}
