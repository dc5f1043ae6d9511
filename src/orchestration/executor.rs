//! Executor capability.
//!
//! The scheduler never performs a task's work itself. It hands each task to
//! a `TaskExecutor` and only observes the outcome. Two implementations ship
//! with the crate: a simulator that sleeps in proportion to the task's
//! estimated effort, and a runner that shells out to an external program
//! (for example a headless coding agent) with the rendered prompt.

use crate::core::task::{Task, TaskId, TaskOutput};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Performs the work of a single task.
///
/// Implementations must eventually resolve; the scheduler enforces its
/// per-task timeout by dropping the future.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run the task, returning its output or a descriptive failure message.
    async fn execute(&self, task: &Task) -> std::result::Result<TaskOutput, String>;
}

/// Default simulated time per minute of estimated effort.
pub const DEFAULT_TIME_SCALE: Duration = Duration::from_millis(200);

/// Stand-in executor that pretends to do the work.
///
/// Sleeps `estimated_effort * time_scale`, then reports the task's files as
/// produced. Specific tasks can be told to fail.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    time_scale: Duration,
    failing: HashSet<TaskId>,
}

impl SimulatedExecutor {
    pub fn new(time_scale: Duration) -> Self {
        Self {
            time_scale,
            failing: HashSet::new(),
        }
    }

    /// Make the given task fail when executed.
    pub fn fail_on(mut self, id: impl Into<TaskId>) -> Self {
        self.failing.insert(id.into());
        self
    }

    pub fn time_scale(&self) -> Duration {
        self.time_scale
    }

    /// Simulated run time for a task.
    pub fn delay_for(&self, task: &Task) -> Duration {
        let effort = task.spec.estimated_effort.max(0.0);
        Duration::try_from_secs_f64(self.time_scale.as_secs_f64() * effort).unwrap_or(Duration::MAX)
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_SCALE)
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, task: &Task) -> std::result::Result<TaskOutput, String> {
        let delay = self.delay_for(task);
        debug!(task = %task.id(), ?delay, "simulating task");
        tokio::time::sleep(delay).await;

        if self.failing.contains(task.id()) {
            return Err(format!("simulated failure for {}", task.id()));
        }

        let label = if task.spec.description.is_empty() {
            task.id().as_str()
        } else {
            task.spec.description.as_str()
        };
        Ok(TaskOutput::new(
            task.spec.files.clone(),
            format!("{} completed", label),
            delay,
        ))
    }
}

/// Runs an external program for every task.
///
/// The rendered prompt is passed as the final argument. A zero exit status
/// counts as success with stdout as the summary; anything else is a failure
/// carrying stderr (or the exit code when stderr is empty).
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    binary: PathBuf,
    args: Vec<String>,
    cwd: PathBuf,
}

impl CommandExecutor {
    /// Locate `program` on the `PATH`.
    ///
    /// # Errors
    ///
    /// Returns `CommandNotFound` if the program cannot be found.
    pub fn new(program: &str) -> Result<Self> {
        let binary =
            which::which(program).map_err(|_| Error::CommandNotFound(program.to_string()))?;
        Ok(Self::with_binary(binary))
    }

    /// Use a specific binary without looking it up.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            cwd: PathBuf::from("."),
        }
    }

    /// Arguments placed before the prompt.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    async fn execute(&self, task: &Task) -> std::result::Result<TaskOutput, String> {
        let started = Instant::now();
        let output = Command::new(&self.binary)
            .args(&self.args)
            .arg(task.render_prompt())
            .current_dir(&self.cwd)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.binary.display(), e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(if stderr.trim().is_empty() {
                format!(
                    "{} exited with code {}",
                    self.binary.display(),
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            });
        }

        let summary = match stdout.trim() {
            "" => format!("{} completed", task.id()),
            text => text.to_string(),
        };
        Ok(TaskOutput::new(
            task.spec.files.clone(),
            summary,
            started.elapsed(),
        ))
    }
}
