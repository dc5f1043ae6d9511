pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod plan;
pub mod report;

pub use crate::core::{Task, TaskId, TaskRegistry, TaskSpec, TaskStatus};
pub use error::{Error, Result};
pub use orchestration::{RunOutcome, Scheduler, SchedulerEvent, TaskExecutor};
pub use plan::Plan;
pub use report::ExecutionReport;
