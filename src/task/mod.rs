//! Task lifecycle.
//!
//! A single [`TaskMachine`] actor owns the task in flight. Poll ticks, decoder
//! callbacks, watchdog expiry and the completion of spawned I/O all reach it
//! as [`TaskEvent`]s on one channel, so they are handled strictly in order.

mod handle;
mod machine;
pub mod model;
mod poller;
pub mod state;
mod watchdog;

pub use handle::{
    AgentHandle, ErrorCallback, MachineSnapshot, RetryOutcome, StatusCallback, TaskEvent,
};
pub use machine::TaskMachine;
pub use model::{FailureReason, Task, TaskId};
pub use poller::spawn_poll_loop;
pub use state::{ActiveTask, EarlySignal, TaskState};
pub use watchdog::Watchdog;
