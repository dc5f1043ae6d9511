use std::time::Duration;

use thiserror::Error;

use crate::core::task::TaskId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Executor command not found: {0}")]
    CommandNotFound(String),

    #[error("Task already registered: {0}")]
    DuplicateId(TaskId),

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("Dependency cycle between tasks: {}", join_ids(.cycle, " -> "))]
    CyclicDependency { cycle: Vec<TaskId> },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid transition for task {task}: {from} -> {to}")]
    InvalidTransition {
        task: TaskId,
        from: &'static str,
        to: &'static str,
    },

    #[error("Scheduling deadlock: {} task(s) can never start ({})", .remaining.len(), join_ids(.remaining, ", "))]
    Deadlock { remaining: Vec<TaskId> },

    #[error("Task {task} failed: {message}")]
    TaskExecution { task: TaskId, message: String },

    #[error("Task {task} timed out after {after:?}")]
    Timeout { task: TaskId, after: Duration },
}

impl Error {
    /// Whether this error is confined to a single task.
    ///
    /// Isolated errors fail their task (and block its dependents) while the
    /// rest of the run continues. Every other error is fatal to the run.
    pub fn is_task_local(&self) -> bool {
        matches!(self, Error::TaskExecution { .. } | Error::Timeout { .. })
    }
}

fn join_ids(ids: &[TaskId], sep: &str) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(sep)
}

pub type Result<T> = std::result::Result<T, Error>;
