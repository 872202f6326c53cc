//! Scheduling for resumable searches.
//!
//! - [`TaskScheduler`]: the generic "run this now / later / every N ticks"
//!   interface, implemented by [`ThreadPool`] and, for deterministic tests,
//!   [`ManualScheduler`].
//! - [`DistributedWorkManager`]: owner-fair execution of [`WorkItem`]s over a
//!   bounded number of active slots.
//! - [`Join`]: a countdown that fires a callback once every dispatched task
//!   has reported back.

mod distributed;
mod join;
mod manual;
mod pool;
mod queue;
mod task;
mod work;

pub use distributed::DistributedWorkManager;
pub use join::Join;
pub use manual::{DEFAULT_TICK, ManualScheduler};
pub use pool::ThreadPool;
pub use queue::TickQueue;
pub use task::{RepeatingTask, Task, TaskHandle, TaskScheduler};
pub use work::WorkItem;
