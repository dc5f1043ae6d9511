//! Core domain models for the design-task scheduler.
//!
//! This module contains the task model and the registry that tracks every
//! task's dependencies and lifecycle state.

pub mod registry;
pub mod task;

pub use registry::{Partition, TaskRegistry};
pub use task::{Task, TaskId, TaskKind, TaskOutput, TaskSpec, TaskStatus};
