//! Orchestration layer.
//!
//! The scheduler runs registered tasks with bounded parallelism, handing the
//! work itself to a pluggable executor.

mod executor;
mod scheduler;

pub use executor::{CommandExecutor, SimulatedExecutor, TaskExecutor, DEFAULT_TIME_SCALE};
pub use scheduler::{
    Completion, RunOutcome, Scheduler, SchedulerEvent, TaskOutcome, DEFAULT_TASK_TIMEOUT,
};
