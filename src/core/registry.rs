//! Task registry and dependency graph.
//!
//! The registry owns every declared task, the dependency edges between them,
//! and five disjoint status partitions (pending, running, completed, failed,
//! blocked). Every registered id sits in exactly one partition at any time,
//! and the partition always agrees with the task's own status.
//!
//! Edges point from a dependency to its dependent, so "everything downstream
//! of X" is a walk over outgoing edges.

use crate::core::task::{Task, TaskId, TaskOutput, TaskSpec, TaskStatus};
use crate::error::{Error, Result};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One of the five disjoint status classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Pending,
    Running,
    Completed,
    Failed,
    Blocked,
}

impl Partition {
    pub fn of(status: &TaskStatus) -> Self {
        match status {
            TaskStatus::Pending => Partition::Pending,
            TaskStatus::Running => Partition::Running,
            TaskStatus::Completed => Partition::Completed,
            TaskStatus::Failed { .. } => Partition::Failed,
            TaskStatus::Blocked { .. } => Partition::Blocked,
        }
    }
}

#[derive(Debug, Default)]
struct Partitions {
    pending: HashSet<TaskId>,
    running: HashSet<TaskId>,
    completed: HashSet<TaskId>,
    failed: HashSet<TaskId>,
    blocked: HashSet<TaskId>,
}

impl Partitions {
    fn get(&self, partition: Partition) -> &HashSet<TaskId> {
        match partition {
            Partition::Pending => &self.pending,
            Partition::Running => &self.running,
            Partition::Completed => &self.completed,
            Partition::Failed => &self.failed,
            Partition::Blocked => &self.blocked,
        }
    }

    fn get_mut(&mut self, partition: Partition) -> &mut HashSet<TaskId> {
        match partition {
            Partition::Pending => &mut self.pending,
            Partition::Running => &mut self.running,
            Partition::Completed => &mut self.completed,
            Partition::Failed => &mut self.failed,
            Partition::Blocked => &mut self.blocked,
        }
    }

    fn relocate(&mut self, id: &TaskId, from: Partition, to: Partition) {
        if from == to {
            return;
        }
        self.get_mut(from).remove(id);
        self.get_mut(to).insert(id.clone());
    }
}

/// Registered tasks, their dependency edges and status partitions.
///
/// Dependencies may be declared before the task they point at is registered;
/// the edge is added once it shows up. `validate` must pass before any task
/// is started.
pub struct TaskRegistry {
    graph: DiGraph<Task, ()>,
    task_index: HashMap<TaskId, NodeIndex>,
    /// Dependency ids not registered yet, mapped to the tasks waiting on them.
    unresolved: HashMap<TaskId, Vec<NodeIndex>>,
    /// Ids treated as already satisfied without being tasks.
    external: HashSet<TaskId>,
    partitions: Partitions,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
            unresolved: HashMap::new(),
            external: HashSet::new(),
            partitions: Partitions::default(),
        }
    }

    /// Register a task in the `Pending` state.
    ///
    /// Duplicate dependency ids are collapsed, keeping the first occurrence.
    ///
    /// # Errors
    /// - `DuplicateId` if the id is already registered or declared external
    /// - `CyclicDependency` if the task lists itself as a dependency
    /// - `Validation` if the task declares a zero timeout
    pub fn register(&mut self, mut spec: TaskSpec) -> Result<()> {
        if self.task_index.contains_key(&spec.id) || self.external.contains(&spec.id) {
            return Err(Error::DuplicateId(spec.id));
        }
        if spec.dependencies.contains(&spec.id) {
            return Err(Error::CyclicDependency {
                cycle: vec![spec.id],
            });
        }
        if spec.timeout().is_some_and(|timeout| timeout.is_zero()) {
            return Err(Error::Validation(format!(
                "task {} has a zero timeout",
                spec.id
            )));
        }

        let mut seen = HashSet::new();
        spec.dependencies.retain(|dep| seen.insert(dep.clone()));

        let id = spec.id.clone();
        let dependencies = spec.dependencies.clone();
        let index = self.graph.add_node(Task::new(spec));
        self.task_index.insert(id.clone(), index);

        for dep in dependencies {
            match self.task_index.get(&dep) {
                Some(&dep_index) => {
                    self.graph.add_edge(dep_index, index, ());
                }
                None => self.unresolved.entry(dep).or_default().push(index),
            }
        }

        if let Some(waiting) = self.unresolved.remove(&id) {
            for dependent in waiting {
                self.graph.add_edge(index, dependent, ());
            }
        }

        self.partitions.pending.insert(id.clone());
        debug!(task = %id, "registered task");
        Ok(())
    }

    /// Register several tasks, stopping at the first error.
    pub fn register_all<I>(&mut self, specs: I) -> Result<()>
    where
        I: IntoIterator<Item = TaskSpec>,
    {
        for spec in specs {
            self.register(spec)?;
        }
        Ok(())
    }

    /// Declare an id as an external dependency that is already satisfied.
    pub fn declare_external(&mut self, id: impl Into<TaskId>) -> Result<()> {
        let id = id.into();
        if self.task_index.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        self.unresolved.remove(&id);
        self.external.insert(id);
        Ok(())
    }

    pub fn is_external(&self, id: &TaskId) -> bool {
        self.external.contains(id)
    }

    /// Check the graph can make progress: every dependency is known and
    /// there are no cycles.
    ///
    /// # Errors
    /// - `UnknownDependency` for the first task (in registration order)
    ///   naming a dependency that is neither registered nor external
    /// - `CyclicDependency` naming the members of one cycle, in
    ///   registration order
    pub fn validate(&self) -> Result<()> {
        for task in self.tasks() {
            if let Some(dep) = task
                .dependencies()
                .iter()
                .find(|dep| !self.task_index.contains_key(*dep) && !self.external.contains(*dep))
            {
                return Err(Error::UnknownDependency {
                    task: task.id().clone(),
                    dependency: dep.clone(),
                });
            }
        }

        // Self-loops are rejected at registration, so any cycle is a
        // strongly connected component with more than one member.
        let cycle = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|mut component| {
                component.sort();
                component
            })
            .min_by_key(|component| component[0]);

        if let Some(members) = cycle {
            return Err(Error::CyclicDependency {
                cycle: members
                    .into_iter()
                    .map(|index| self.graph[index].id().clone())
                    .collect(),
            });
        }

        Ok(())
    }

    fn is_satisfied(&self, dep: &TaskId) -> bool {
        self.external.contains(dep) || self.partitions.completed.contains(dep)
    }

    /// Pending tasks whose dependencies have all completed.
    ///
    /// Ordered by ascending dependency count, then descending priority, then
    /// registration order.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        let mut ready: Vec<(NodeIndex, &Task)> = self
            .graph
            .node_indices()
            .map(|index| (index, &self.graph[index]))
            .filter(|(_, task)| {
                task.can_start() && task.dependencies().iter().all(|dep| self.is_satisfied(dep))
            })
            .collect();

        ready.sort_by(|(index_a, a), (index_b, b)| {
            a.dependencies()
                .len()
                .cmp(&b.dependencies().len())
                .then_with(|| b.priority().cmp(&a.priority()))
                .then_with(|| index_a.cmp(index_b))
        });

        ready.into_iter().map(|(_, task)| task).collect()
    }

    /// The first task `ready_tasks` would return.
    pub fn next_ready(&self) -> Option<TaskId> {
        self.ready_tasks().first().map(|task| task.id().clone())
    }

    fn transition(
        &mut self,
        id: &TaskId,
        to: &'static str,
        allowed: fn(&TaskStatus) -> bool,
        apply: impl FnOnce(&mut Task),
    ) -> Result<()> {
        let index = *self
            .task_index
            .get(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        let task = &mut self.graph[index];

        if !allowed(&task.status) {
            return Err(Error::InvalidTransition {
                task: id.clone(),
                from: task.status.name(),
                to,
            });
        }

        let from = Partition::of(&task.status);
        apply(task);
        let to = Partition::of(&task.status);
        self.partitions.relocate(id, from, to);
        Ok(())
    }

    /// `Pending -> Running`, recording the start time.
    pub fn mark_running(&mut self, id: &TaskId) -> Result<()> {
        self.transition(
            id,
            "running",
            |status| *status == TaskStatus::Pending,
            |task| task.start(),
        )
    }

    /// `Running -> Completed`, recording the finish time and output.
    pub fn mark_completed(&mut self, id: &TaskId, output: TaskOutput) -> Result<()> {
        self.transition(
            id,
            "completed",
            |status| *status == TaskStatus::Running,
            |task| task.complete(output),
        )
    }

    /// `Running -> Failed`, recording the finish time and error.
    pub fn mark_failed(&mut self, id: &TaskId, error: &str) -> Result<()> {
        self.transition(
            id,
            "failed",
            |status| *status == TaskStatus::Running,
            |task| task.fail(error),
        )
    }

    /// `Pending -> Blocked`, naming the failed task responsible.
    pub fn mark_blocked(&mut self, id: &TaskId, cause: &TaskId) -> Result<()> {
        self.transition(
            id,
            "blocked",
            |status| *status == TaskStatus::Pending,
            |task| task.block(cause),
        )
    }

    /// Block every pending task that transitively depends on `id`.
    ///
    /// Returns the newly blocked ids in walk order.
    pub fn block_dependents_of(&mut self, id: &TaskId) -> Result<Vec<TaskId>> {
        let start = *self
            .task_index
            .get(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;

        let mut dfs = Dfs::new(&self.graph, start);
        let mut doomed = Vec::new();
        while let Some(index) = dfs.next(&self.graph) {
            if index != start && self.graph[index].can_start() {
                doomed.push(self.graph[index].id().clone());
            }
        }

        for dependent in &doomed {
            self.mark_blocked(dependent, id)?;
        }
        Ok(doomed)
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.task_index.get(id).map(|&index| &self.graph[index])
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    /// All tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> + '_ {
        self.graph.node_weights()
    }

    /// Owned copy of every task, in registration order.
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks().cloned().collect()
    }

    /// Tasks that directly depend on `id`.
    pub fn dependents(&self, id: &TaskId) -> Vec<&Task> {
        match self.task_index.get(id) {
            Some(&index) => self
                .graph
                .neighbors_directed(index, petgraph::Direction::Outgoing)
                .map(|neighbor| &self.graph[neighbor])
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn partition(&self, partition: Partition) -> &HashSet<TaskId> {
        self.partitions.get(partition)
    }

    pub fn count(&self, partition: Partition) -> usize {
        self.partitions.get(partition).len()
    }

    /// Ids of tasks not yet in a terminal state, in registration order.
    pub fn unfinished(&self) -> Vec<TaskId> {
        self.tasks()
            .filter(|task| !task.is_terminal())
            .map(|task| task.id().clone())
            .collect()
    }

    /// True once every task is completed, failed or blocked.
    pub fn is_finished(&self) -> bool {
        self.partitions.pending.is_empty() && self.partitions.running.is_empty()
    }

    /// Tasks ordered so that each comes after all of its dependencies.
    pub fn topological_order(&self) -> Result<Vec<&Task>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| Error::CyclicDependency {
            cycle: vec![self.graph[cycle.node_id()].id().clone()],
        })?;
        Ok(sorted.into_iter().map(|index| &self.graph[index]).collect())
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.len())
            .field("dependencies", &self.graph.edge_count())
            .field("pending", &self.count(Partition::Pending))
            .field("running", &self.count(Partition::Running))
            .field("completed", &self.count(Partition::Completed))
            .field("failed", &self.count(Partition::Failed))
            .field("blocked", &self.count(Partition::Blocked))
            .finish()
    }
}
