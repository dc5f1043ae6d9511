//! Task data model for the design scheduler.
//!
//! A task is an immutable descriptor (`TaskSpec`) supplied by the caller plus
//! the execution state the scheduler fills in as the task moves through its
//! lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Unique identifier for a task within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Categorical tag used for reporting breakdowns.
///
/// Any string is accepted; the well-known kinds are provided as constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKind(pub String);

impl TaskKind {
    pub const PAGE: &'static str = "page";
    pub const COMPONENT: &'static str = "component";
    pub const DESIGN_SYSTEM: &'static str = "design-system";
    pub const NAVIGATION: &'static str = "navigation";
    pub const VALIDATION: &'static str = "validation";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskKind {
    fn default() -> Self {
        Self(Self::PAGE.to_string())
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

fn default_effort() -> f64 {
    5.0
}

/// Task configuration as supplied by the caller.
///
/// Only `id` and `dependencies` drive scheduling. `priority` biases the
/// order among ready tasks, `kind` feeds the report, and everything else
/// is payload forwarded untouched to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    #[serde(default, alias = "type")]
    pub kind: TaskKind,
    /// Higher runs first among equally ready tasks.
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub description: String,
    /// Estimated effort in minutes.
    #[serde(default = "default_effort", alias = "estimated_time")]
    pub estimated_effort: f64,
    #[serde(default)]
    pub prompt: String,
    /// Overrides the scheduler's default per-task timeout. Written as
    /// `timeout_ms` in plan files.
    #[serde(
        default,
        rename = "timeout_ms",
        with = "duration_ms::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            kind: TaskKind::default(),
            priority: 0,
            dependencies: Vec::new(),
            files: Vec::new(),
            description: String::new(),
            estimated_effort: default_effort(),
            prompt: String::new(),
            timeout: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<TaskKind>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, id: impl Into<TaskId>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn with_dependencies<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_effort(mut self, minutes: f64) -> Self {
        self.estimated_effort = minutes;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The task's own timeout, if it declares one.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl From<&str> for TaskSpec {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Task status in its lifecycle.
///
/// `Pending -> Running -> Completed | Failed`, plus `Pending -> Blocked`
/// when a transitive dependency failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Registered, waiting for dependencies or a free slot.
    Pending,
    /// Handed to the executor.
    Running,
    /// Executor reported success.
    Completed,
    /// Executor reported failure or the task timed out.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// Can never run because a dependency failed.
    Blocked {
        /// The failed task that made this one unreachable.
        cause: TaskId,
    },
}

impl TaskStatus {
    /// Short name of the status, without payload.
    pub fn name(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed { .. } => "failed",
            TaskStatus::Blocked { .. } => "blocked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed { .. } | TaskStatus::Blocked { .. }
        )
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
            TaskStatus::Blocked { cause } => write!(f, "blocked by {}", cause),
            other => f.write_str(other.name()),
        }
    }
}

/// What an executor hands back for a successful task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub files: Vec<String>,
    pub summary: String,
    /// Time the executor itself reports having spent.
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl TaskOutput {
    pub fn new(files: Vec<String>, summary: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            files,
            summary: summary.into(),
            elapsed,
        }
    }
}

/// A registered task: descriptor plus execution state.
///
/// `started`/`finished` are read from the runtime clock and drive every
/// measurement; `started_at`/`finished_at` are calendar timestamps for
/// display and serialization only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub spec: TaskSpec,
    pub status: TaskStatus,
    #[serde(skip)]
    pub started: Option<Instant>,
    #[serde(skip)]
    pub finished: Option<Instant>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, with = "duration_ms::option")]
    pub duration: Option<Duration>,
    pub output: Option<TaskOutput>,
}

impl Task {
    /// Create a pending task from its descriptor.
    pub fn new(spec: TaskSpec) -> Self {
        Self {
            spec,
            status: TaskStatus::Pending,
            started: None,
            finished: None,
            started_at: None,
            finished_at: None,
            duration: None,
            output: None,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.spec.id
    }

    pub fn kind(&self) -> &TaskKind {
        &self.spec.kind
    }

    pub fn priority(&self) -> i64 {
        self.spec.priority
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.spec.dependencies
    }

    /// Transition to Running and record the start time.
    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started = Some(Instant::now());
        self.started_at = Some(Utc::now());
    }

    /// Transition to Completed, storing the executor output.
    pub fn complete(&mut self, output: TaskOutput) {
        self.status = TaskStatus::Completed;
        self.output = Some(output);
        self.finish();
    }

    /// Transition to Failed with an error message.
    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed {
            error: error.to_string(),
        };
        self.finish();
    }

    /// Transition to Blocked. Blocked tasks never ran, so no timing is recorded.
    pub fn block(&mut self, cause: &TaskId) {
        self.status = TaskStatus::Blocked {
            cause: cause.clone(),
        };
    }

    fn finish(&mut self) {
        let finished = Instant::now();
        self.finished = Some(finished);
        self.finished_at = Some(Utc::now());
        self.duration = self.started.map(|started| finished.duration_since(started));
    }

    /// Monotonic `[start, finish)` interval of a task that ran.
    pub fn interval(&self) -> Option<(Instant, Instant)> {
        Some((self.started?, self.finished?))
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_start(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Error message of a failed task.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            TaskStatus::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Build the full prompt handed to an executor for this task.
    pub fn render_prompt(&self) -> String {
        let spec = &self.spec;
        let prompt = format!(
            "As a senior front-end engineer, carry out the following UI design task:\n\
             \n\
             Task type: {}\n\
             Description: {}\n\
             Output files: {}\n\
             \n\
             Requirements:\n\
             1. Use HTML, Tailwind CSS and JavaScript\n\
             2. Keep every page responsive\n\
             3. Use the Unsplash image service for imagery\n\
             4. Link pages to each other correctly\n\
             5. Keep components reusable\n\
             \n\
             {}",
            spec.kind,
            spec.description,
            spec.files.join(", "),
            spec.prompt.trim()
        );
        prompt.trim().to_string()
    }
}

/// Serde helpers storing `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => s.serialize_some(&(d.as_millis() as u64)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
        }
    }
}
