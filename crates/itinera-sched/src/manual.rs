//! A deterministic, caller-driven scheduler.
//!
//! Nothing runs until the caller asks: [`run_until_idle`] drains the ready
//! queue on the calling thread and [`advance`] moves the clock tick by tick.
//! Tests use it to observe the engine between individual task runs.
//!
//! [`run_until_idle`]: ManualScheduler::run_until_idle
//! [`advance`]: ManualScheduler::advance

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::task::{Agenda, RepeatingTask, Task, TaskHandle, TaskScheduler};

/// Tick length a [`ManualScheduler`] reports unless told otherwise.
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

pub struct ManualScheduler {
    agenda: Mutex<Agenda>,
    tick: Duration,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::with_tick(DEFAULT_TICK)
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler whose ticks stand for `tick` of wall-clock time when
    /// durations are converted. The clock itself only moves on [`advance`].
    ///
    /// [`advance`]: ManualScheduler::advance
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            agenda: Mutex::new(Agenda::default()),
            tick: tick.max(Duration::from_nanos(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Agenda> {
        self.agenda.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current tick.
    pub fn now(&self) -> u64 {
        self.lock().now()
    }

    /// Tasks waiting to run, now or later.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Whether a task is ready to run at the current tick.
    pub fn has_ready(&self) -> bool {
        self.lock().has_ready()
    }

    /// Run one ready task. Returns `false` if none was ready.
    pub fn run_next(&self) -> bool {
        let Some(entry) = self.lock().pop_ready() else {
            return false;
        };
        if let Some(again) = entry.run() {
            self.lock().requeue(again);
        }
        true
    }

    /// Run ready tasks until none is left at the current tick. Returns the
    /// number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut n = 0;
        while self.run_next() {
            n += 1;
        }
        n
    }

    /// Advance the clock by `ticks`, draining the ready queue after each tick.
    /// Returns the number of tasks run.
    pub fn advance(&self, ticks: u64) -> usize {
        let mut n = self.run_until_idle();
        for _ in 0..ticks {
            {
                let mut agenda = self.lock();
                let next = agenda.now() + 1;
                agenda.advance_to(next);
            }
            n += self.run_until_idle();
        }
        n
    }

    /// Keep running and advancing until nothing is queued, or `max_ticks`
    /// ticks have passed. Returns `true` if the scheduler became empty.
    pub fn run_to_completion(&self, max_ticks: u64) -> bool {
        self.run_until_idle();
        for _ in 0..max_ticks {
            if self.pending() == 0 {
                return true;
            }
            self.advance(1);
        }
        self.pending() == 0
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule(&self, task: Task, background: bool) -> TaskHandle {
        self.lock().push_now(task, background)
    }

    fn schedule_delayed(&self, task: Task, delay_ticks: u64) -> TaskHandle {
        self.lock().push_delayed(task, delay_ticks)
    }

    fn schedule_repeat(&self, task: RepeatingTask, period_ticks: u64) -> TaskHandle {
        self.lock().push_repeat(task, period_ticks)
    }

    fn cancel(&self, handle: TaskHandle) {
        self.lock().cancel(handle);
    }

    fn tick(&self) -> Duration {
        self.tick
    }
}
