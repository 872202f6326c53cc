//! Fair-share execution of resumable work across a fixed number of active
//! slots.
//!
//! Every submitted [`WorkItem`] is wrapped in an executor that is invoked
//! repeatedly through the underlying [`TaskScheduler`]. At most
//! `max_active` executors hold an *active* slot at any time; only active
//! executors advance their work.
//!
//! An executor that finds no free slot, and whose owner has nothing active,
//! queues itself as a *replacement* against the owner with the most active
//! slots (net of replacements already queued against it), provided that
//! owner would keep at least one. The victim's next invocation hands its
//! slot over, resets its own progress and goes back to waiting. An owner with
//! pending work therefore always gets a turn eventually, and stealing never
//! takes an owner's last slot.

use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use itinera_core::OwnerId;

use crate::task::TaskScheduler;
use crate::work::WorkItem;

struct Executor {
    id: u64,
    owner: OwnerId,
    item: Mutex<Box<dyn WorkItem>>,
    /// Only written with the ledger locked.
    active: AtomicBool,
}

impl Executor {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn set_active(&self, v: bool) {
        self.active.store(v, Ordering::Release);
    }

    fn item(&self) -> MutexGuard<'_, Box<dyn WorkItem>> {
        self.item.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
struct Ledger {
    active_total: usize,
    peak_active: usize,
    active: HashMap<OwnerId, usize>,
    /// Replacements waiting for a slot, keyed by the owner they will take
    /// it from.
    replacements: HashMap<OwnerId, VecDeque<Arc<Executor>>>,
    pending: usize,
    steals: u64,
}

impl Ledger {
    fn activate(&mut self, exec: &Executor) {
        exec.set_active(true);
        self.active_total += 1;
        self.peak_active = self.peak_active.max(self.active_total);
        *self.active.entry(exec.owner).or_default() += 1;
    }

    fn deactivate(&mut self, exec: &Executor) {
        exec.set_active(false);
        self.active_total -= 1;
        if let Some(n) = self.active.get_mut(&exec.owner) {
            *n -= 1;
            if *n == 0 {
                self.active.remove(&exec.owner);
            }
        }
    }

    fn active_for(&self, owner: OwnerId) -> usize {
        self.active.get(&owner).copied().unwrap_or(0)
    }

    fn queued_against(&self, owner: OwnerId) -> usize {
        self.replacements.get(&owner).map_or(0, VecDeque::len)
    }

    fn take_replacement(&mut self, victim: OwnerId) -> Option<Arc<Executor>> {
        let queue = self.replacements.get_mut(&victim)?;
        let next = queue.pop_front();
        if queue.is_empty() {
            self.replacements.remove(&victim);
        }
        next
    }

    /// The owner that can best afford to give up a slot: the highest active
    /// count net of queued replacements, ties going to the lowest id. `None`
    /// if even that owner is down to one.
    fn busiest_victim(&self) -> Option<OwnerId> {
        let (owner, net) = self
            .active
            .iter()
            .map(|(&o, &n)| (o, n.saturating_sub(self.queued_against(o))))
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))?;
        (net > 1).then_some(owner)
    }
}

struct Inner {
    scheduler: Arc<dyn TaskScheduler>,
    max_active: usize,
    ledger: Mutex<Ledger>,
    next_id: AtomicU64,
}

impl Inner {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// See the [module documentation](self).
#[derive(Clone)]
pub struct DistributedWorkManager {
    inner: Arc<Inner>,
}

impl DistributedWorkManager {
    /// A manager allowing `max_active` (at least one) active items, running
    /// increments on `scheduler`.
    pub fn new(scheduler: Arc<dyn TaskScheduler>, max_active: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                scheduler,
                max_active: max_active.max(1),
                ledger: Mutex::new(Ledger::default()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Queue `item` for execution.
    pub fn submit(&self, item: Box<dyn WorkItem>) {
        let exec = Arc::new(Executor {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            owner: item.owner(),
            item: Mutex::new(item),
            active: AtomicBool::new(false),
        });
        log::trace!("submitted work #{} for {}", exec.id, exec.owner);
        self.inner.ledger().pending += 1;
        reschedule(&self.inner, exec);
    }

    /// Configured slot count.
    pub fn max_active(&self) -> usize {
        self.inner.max_active
    }

    /// Items currently holding a slot.
    pub fn active_count(&self) -> usize {
        self.inner.ledger().active_total
    }

    /// Highest `active_count` ever observed.
    pub fn peak_active(&self) -> usize {
        self.inner.ledger().peak_active
    }

    /// Items of `owner` currently holding a slot.
    pub fn active_for(&self, owner: OwnerId) -> usize {
        self.inner.ledger().active_for(owner)
    }

    /// Replacements waiting to take a slot.
    pub fn queued_replacements(&self) -> usize {
        self.inner
            .ledger()
            .replacements
            .values()
            .map(VecDeque::len)
            .sum()
    }

    /// Submitted items that have not finished.
    pub fn pending(&self) -> usize {
        self.inner.ledger().pending
    }

    /// Slots handed over to a replacement so far.
    pub fn steals(&self) -> u64 {
        self.inner.ledger().steals
    }
}

fn reschedule(inner: &Arc<Inner>, exec: Arc<Executor>) {
    let task_inner = Arc::clone(inner);
    inner
        .scheduler
        .schedule(Box::new(move || invoke(&task_inner, exec)), true);
}

/// Resume `exec` once `delay` has passed. It keeps its slot meanwhile.
fn reschedule_after(inner: &Arc<Inner>, exec: Arc<Executor>, delay: Duration) {
    let ticks = inner.scheduler.ticks_for(delay);
    let task_inner = Arc::clone(inner);
    inner
        .scheduler
        .schedule_delayed(Box::new(move || invoke(&task_inner, exec)), ticks);
}

/// Run one increment of `exec`. A panic counts as finished: the item is
/// abandoned so its slot is released.
fn run_increment(exec: &Executor) -> bool {
    let mut item = exec.item();
    match catch_unwind(AssertUnwindSafe(|| item.run())) {
        Ok(done) => done,
        Err(_) => {
            log::error!("work #{} ({}) panicked; abandoning it", exec.id, exec.owner);
            item.abandon();
            true
        }
    }
}

/// One turn of an executor.
fn invoke(inner: &Arc<Inner>, exec: Arc<Executor>) {
    let target = {
        let mut ledger = inner.ledger();
        if exec.is_active() {
            match ledger.take_replacement(exec.owner) {
                Some(thief) => {
                    ledger.deactivate(&exec);
                    ledger.activate(&thief);
                    ledger.steals += 1;
                    drop(ledger);
                    log::debug!(
                        "work #{} ({}) yields its slot to #{} ({})",
                        exec.id,
                        exec.owner,
                        thief.id,
                        thief.owner
                    );
                    exec.item().reset();
                    reschedule(inner, exec);
                    thief
                }
                None => exec,
            }
        } else if ledger.active_total < inner.max_active {
            ledger.activate(&exec);
            exec
        } else if ledger.active_for(exec.owner) > 0 {
            drop(ledger);
            reschedule(inner, exec);
            return;
        } else {
            match ledger.busiest_victim() {
                Some(victim) => {
                    log::trace!(
                        "work #{} ({}) queued to replace a slot of {}",
                        exec.id,
                        exec.owner,
                        victim
                    );
                    ledger.replacements.entry(victim).or_default().push_back(exec);
                }
                None => {
                    drop(ledger);
                    reschedule(inner, exec);
                }
            }
            return;
        }
    };

    if !run_increment(&target) {
        let pause = target.item().resume_after();
        match pause {
            Some(delay) => reschedule_after(inner, target, delay),
            None => reschedule(inner, target),
        }
        return;
    }

    let (promoted, rest) = {
        let mut ledger = inner.ledger();
        ledger.deactivate(&target);
        ledger.pending -= 1;
        let mut waiting: VecDeque<Arc<Executor>> = if ledger.active_for(target.owner) == 0 {
            ledger.replacements.remove(&target.owner).unwrap_or_default()
        } else {
            VecDeque::new()
        };
        let first = waiting.pop_front();
        if let Some(first) = &first {
            ledger.activate(first);
        }
        (first, waiting)
    };
    log::trace!("work #{} ({}) finished", target.id, target.owner);
    for exec in promoted.into_iter().chain(rest) {
        reschedule(inner, exec);
    }
}
