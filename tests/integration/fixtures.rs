//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A scripted executor with per-task delays and failures that records
//!   the order in which work starts and ends
//! - Predefined task sets

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use atelier::core::{Task, TaskId, TaskOutput, TaskRegistry, TaskSpec};
use atelier::orchestration::TaskExecutor;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

/// Something the executor observed, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mark {
    Start(TaskId),
    End(TaskId),
}

/// Executor whose behaviour is scripted per task id.
///
/// Tracks how many tasks are inside `execute` at once. A task dropped by a
/// timeout still leaves the count.
#[derive(Default)]
pub struct ScriptedExecutor {
    delays: HashMap<TaskId, Duration>,
    failing: HashMap<TaskId, String>,
    live: AtomicUsize,
    peak: AtomicUsize,
    marks: Mutex<Vec<Mark>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(TaskId::from(id), delay);
        self
    }

    pub fn fail(mut self, id: &str, message: &str) -> Self {
        self.failing.insert(TaskId::from(id), message.to_string());
        self
    }

    /// Most tasks observed executing at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn marks(&self) -> Vec<Mark> {
        self.marks.lock().unwrap().clone()
    }

    /// Ids in the order their work started.
    pub fn start_order(&self) -> Vec<String> {
        self.marks()
            .into_iter()
            .filter_map(|mark| match mark {
                Mark::Start(id) => Some(id.to_string()),
                Mark::End(_) => None,
            })
            .collect()
    }

    fn record(&self, mark: Mark) {
        self.marks.lock().unwrap().push(mark);
    }
}

struct LiveGuard<'a>(&'a AtomicUsize);

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, task: &Task) -> Result<TaskOutput, String> {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        let _guard = LiveGuard(&self.live);
        self.record(Mark::Start(task.id().clone()));

        let delay = self.delays.get(task.id()).copied().unwrap_or(DEFAULT_DELAY);
        tokio::time::sleep(delay).await;

        self.record(Mark::End(task.id().clone()));
        if let Some(message) = self.failing.get(task.id()) {
            return Err(message.clone());
        }
        Ok(TaskOutput::new(
            task.spec.files.clone(),
            format!("{} done", task.id()),
            delay,
        ))
    }
}

/// Build a registry, panicking on registration errors.
pub fn registry_of(specs: Vec<TaskSpec>) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry.register_all(specs).unwrap();
    registry
}

/// `a`; `b` and `c` after `a`; `d` after both.
pub fn diamond() -> Vec<TaskSpec> {
    vec![
        TaskSpec::new("a").with_kind("design-system"),
        TaskSpec::new("b").depends_on("a").with_kind("page"),
        TaskSpec::new("c").depends_on("a").with_kind("component"),
        TaskSpec::new("d")
            .with_dependencies(["b", "c"])
            .with_kind("navigation"),
    ]
}

/// `n` tasks without dependencies.
pub fn independent(n: usize) -> Vec<TaskSpec> {
    (0..n).map(|i| TaskSpec::new(format!("task-{}", i))).collect()
}

/// A feature-sized plan: design system, five pages, components,
/// navigation over the pages and a final validation pass.
pub fn feature_plan() -> Vec<TaskSpec> {
    let pages = ["login", "dashboard", "catalog", "profile", "help"];
    let mut specs = vec![TaskSpec::new("design-system")
        .with_kind("design-system")
        .with_priority(1)];
    for page in pages {
        specs.push(
            TaskSpec::new(format!("page-{}", page))
                .with_kind("page")
                .depends_on("design-system"),
        );
    }
    specs.push(
        TaskSpec::new("components")
            .with_kind("component")
            .depends_on("design-system"),
    );
    specs.push(
        TaskSpec::new("navigation")
            .with_kind("navigation")
            .with_dependencies(pages.iter().map(|page| format!("page-{}", page))),
    );
    specs.push(
        TaskSpec::new("validation")
            .with_kind("validation")
            .with_dependencies(["navigation", "components"]),
    );
    specs
}
