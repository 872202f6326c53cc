use std::time::Duration;

use itinera_core::OwnerId;

/// A unit of resumable work belonging to an owner.
pub trait WorkItem: Send {
    /// The owner this work is charged to.
    fn owner(&self) -> OwnerId;

    /// Run one bounded increment. Returns `true` once the work is finished;
    /// `false` means "call me again later".
    fn run(&mut self) -> bool;

    /// Drop any progress so the next [`run`](Self::run) starts from scratch.
    fn reset(&mut self);

    /// After an unfinished [`run`](Self::run): how long to wait before the
    /// next one. `None` resumes as soon as possible.
    fn resume_after(&self) -> Option<Duration> {
        None
    }

    /// Called instead of another [`run`](Self::run) after a run panicked.
    /// The item will not run again.
    fn abandon(&mut self) {}
}

impl<W: WorkItem + ?Sized> WorkItem for Box<W> {
    fn owner(&self) -> OwnerId {
        (**self).owner()
    }

    fn run(&mut self) -> bool {
        (**self).run()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn resume_after(&self) -> Option<Duration> {
        (**self).resume_after()
    }

    fn abandon(&mut self) {
        (**self).abandon()
    }
}
