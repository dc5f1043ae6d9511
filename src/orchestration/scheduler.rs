//! Scheduler for parallel task execution.
//!
//! The Scheduler drives a single loop over the registry: it starts ready
//! tasks while slots are free, then waits for whichever in-flight task
//! finishes first, records the outcome, and repeats until every task is
//! terminal. All registry mutations happen on that loop between awaits, so
//! no iteration ever observes a half-applied transition.

use crate::core::registry::{Partition, TaskRegistry};
use crate::core::task::{Task, TaskId, TaskOutput};
use crate::error::{Error, Result};
use crate::orchestration::executor::TaskExecutor;
use crate::report::ExecutionReport;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default per-task timeout (10 minutes).
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(600);

/// Events emitted by the scheduler for task lifecycle changes.
///
/// These events allow external components (a progress display, a log
/// shipper) to follow a run without polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A task was handed to the executor.
    TaskStarted {
        task_id: TaskId,
    },
    /// A task completed successfully.
    TaskCompleted {
        task_id: TaskId,
        duration: Duration,
    },
    /// A task failed or timed out.
    TaskFailed {
        task_id: TaskId,
        error: String,
    },
    /// A task can never run because `cause` failed.
    TaskBlocked {
        task_id: TaskId,
        cause: TaskId,
    },
    /// Every task reached a terminal state.
    AllTasksComplete,
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(TaskOutput),
    Failed(String),
    /// Never started; carries the failed task responsible.
    Blocked(TaskId),
}

/// A task paired with its outcome, as recorded when it became terminal.
#[derive(Debug, Clone)]
pub struct Completion {
    pub task: Task,
    pub outcome: TaskOutcome,
}

/// Result of a full scheduler run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    /// Every terminal transition in the order it happened.
    pub completions: Vec<Completion>,
    pub report: ExecutionReport,
    /// Most tasks the scheduler had in flight at once.
    pub peak_running: usize,
}

impl RunOutcome {
    /// Ids in the order their tasks became terminal.
    pub fn completion_order(&self) -> Vec<&TaskId> {
        self.completions.iter().map(|c| c.task.id()).collect()
    }

    /// A non-empty run in which nothing completed.
    pub fn is_failure(&self) -> bool {
        self.report.is_failure()
    }
}

type InFlight = BoxFuture<'static, (TaskId, Result<TaskOutput>)>;

/// Bounded-parallel scheduler over a `TaskRegistry`.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use std::time::Duration;
/// use atelier::core::{TaskRegistry, TaskSpec};
/// use atelier::orchestration::{Scheduler, SimulatedExecutor};
///
/// let mut registry = TaskRegistry::new();
/// registry.register(TaskSpec::new("design-system"))?;
/// registry.register(TaskSpec::new("page-home").depends_on("design-system"))?;
///
/// let executor = Arc::new(SimulatedExecutor::new(Duration::from_millis(10)));
/// let mut scheduler = Scheduler::new(registry, executor);
/// let outcome = scheduler.run(4).await?;
/// println!("{}", outcome.report);
/// ```
pub struct Scheduler {
    registry: TaskRegistry,
    executor: Arc<dyn TaskExecutor>,
    task_timeout: Option<Duration>,
    event_tx: Option<mpsc::Sender<SchedulerEvent>>,
}

impl Scheduler {
    /// Create a scheduler owning `registry`, with the default task timeout.
    pub fn new(registry: TaskRegistry, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            registry,
            executor,
            task_timeout: Some(DEFAULT_TASK_TIMEOUT),
            event_tx: None,
        }
    }

    /// Timeout applied to tasks that do not declare their own.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Let tasks without their own timeout run indefinitely.
    pub fn without_task_timeout(mut self) -> Self {
        self.task_timeout = None;
        self
    }

    /// Emit lifecycle events on `event_tx`. Events are dropped when the
    /// channel is full or closed; the run never waits on a listener.
    pub fn with_events(mut self, event_tx: mpsc::Sender<SchedulerEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> TaskRegistry {
        self.registry
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.try_send(event);
        }
    }

    fn timeout_for(&self, task: &Task) -> Option<Duration> {
        task.spec.timeout().or(self.task_timeout)
    }

    /// Run every registered task to a terminal state.
    ///
    /// At most `max_concurrency` tasks are in flight at once. The registry
    /// is validated first; validation errors are returned before anything
    /// starts.
    ///
    /// Failure handling is a corrected policy: a failing task no longer
    /// abandons the tasks still in flight. It is marked failed, every
    /// pending task that transitively depends on it is marked blocked, and
    /// independent branches keep going. Timeouts are treated the same way.
    /// Only invariant violations (`Deadlock`, `InvalidTransition`) end the
    /// run early with an error.
    pub async fn run(&mut self, max_concurrency: usize) -> Result<RunOutcome> {
        if max_concurrency == 0 {
            return Err(Error::Validation(
                "max concurrency must be at least 1".to_string(),
            ));
        }
        if self.task_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(Error::Validation(
                "task timeout must be greater than zero".to_string(),
            ));
        }
        self.registry.validate()?;

        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            tasks = self.registry.len(),
            max_concurrency,
            "starting parallel design run"
        );

        let mut in_flight: FuturesUnordered<InFlight> = FuturesUnordered::new();
        let mut completions = Vec::new();
        let mut peak_running = 0;

        while !self.registry.is_finished() {
            while in_flight.len() < max_concurrency {
                let Some(id) = self.registry.next_ready() else {
                    break;
                };
                in_flight.push(self.dispatch(&id)?);
            }
            peak_running = peak_running.max(in_flight.len());

            if in_flight.is_empty() {
                let remaining = self.registry.unfinished();
                error!(%run_id, ?remaining, "no task is running and none can start");
                return Err(Error::Deadlock { remaining });
            }

            if let Some((id, result)) = in_flight.next().await {
                self.settle(id, result, &mut completions)?;
            }
        }

        self.emit(SchedulerEvent::AllTasksComplete);
        let report = ExecutionReport::summarize(&self.registry.snapshot());
        info!(
            %run_id,
            completed = report.completed_count,
            failed = report.failed_count,
            blocked = report.blocked_count,
            efficiency = report.efficiency,
            "all design tasks finished"
        );

        Ok(RunOutcome {
            run_id,
            completions,
            report,
            peak_running,
        })
    }

    /// Mark a ready task running and build its in-flight future.
    fn dispatch(&mut self, id: &TaskId) -> Result<InFlight> {
        self.registry.mark_running(id)?;
        let task = self
            .registry
            .get(id)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        let limit = self.timeout_for(&task);
        let executor = Arc::clone(&self.executor);

        info!(task = %id, description = %task.spec.description, "starting task");
        self.emit(SchedulerEvent::TaskStarted {
            task_id: id.clone(),
        });

        Ok(async move {
            let id = task.id().clone();
            let result = match limit {
                Some(limit) => match tokio::time::timeout(limit, executor.execute(&task)).await {
                    Ok(outcome) => outcome.map_err(|message| Error::TaskExecution {
                        task: id.clone(),
                        message,
                    }),
                    Err(_) => Err(Error::Timeout {
                        task: id.clone(),
                        after: limit,
                    }),
                },
                None => executor
                    .execute(&task)
                    .await
                    .map_err(|message| Error::TaskExecution {
                        task: id.clone(),
                        message,
                    }),
            };
            (id, result)
        }
        .boxed())
    }

    /// Record the outcome of a finished task.
    fn settle(
        &mut self,
        id: TaskId,
        result: Result<TaskOutput>,
        completions: &mut Vec<Completion>,
    ) -> Result<()> {
        match result {
            Ok(output) => {
                self.registry.mark_completed(&id, output.clone())?;
                let task = self.snapshot_of(&id)?;
                let duration = task.duration.unwrap_or_default();
                info!(task = %id, duration_ms = duration.as_millis() as u64, "task completed");
                self.emit(SchedulerEvent::TaskCompleted {
                    task_id: id,
                    duration,
                });
                completions.push(Completion {
                    task,
                    outcome: TaskOutcome::Completed(output),
                });
            }
            Err(err) if err.is_task_local() => {
                let message = match err {
                    Error::TaskExecution { message, .. } => message,
                    other => other.to_string(),
                };
                self.registry.mark_failed(&id, &message)?;
                error!(task = %id, error = %message, "task failed");
                self.emit(SchedulerEvent::TaskFailed {
                    task_id: id.clone(),
                    error: message.clone(),
                });
                completions.push(Completion {
                    task: self.snapshot_of(&id)?,
                    outcome: TaskOutcome::Failed(message),
                });

                for blocked in self.registry.block_dependents_of(&id)? {
                    warn!(task = %blocked, cause = %id, "task blocked by failed dependency");
                    self.emit(SchedulerEvent::TaskBlocked {
                        task_id: blocked.clone(),
                        cause: id.clone(),
                    });
                    completions.push(Completion {
                        task: self.snapshot_of(&blocked)?,
                        outcome: TaskOutcome::Blocked(id.clone()),
                    });
                }
            }
            Err(err) => return Err(err),
        }
        debug!(
            running = self.registry.count(Partition::Running),
            "slot released"
        );
        Ok(())
    }

    fn snapshot_of(&self, id: &TaskId) -> Result<Task> {
        self.registry
            .get(id)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(id.clone()))
    }
}
