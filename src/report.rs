//! Summary statistics over a finished run.
//!
//! `ExecutionReport::summarize` is a pure function of a task snapshot: the
//! same tasks always produce the same report.
//!
//! Spans and overlap are measured on the runtime clock intervals recorded by
//! the scheduler. Snapshots loaded from disk carry no such intervals and fall
//! back to their calendar timestamps.

use crate::core::task::{duration_ms, Task, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub total_tasks: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub blocked_count: usize,
    /// Sum of the durations of every task that ran (completed or failed).
    #[serde(with = "duration_ms")]
    pub total_busy_time: Duration,
    /// Latest finish minus earliest start.
    #[serde(with = "duration_ms")]
    pub wall_clock_time: Duration,
    /// Busy time divided by the number of tasks that ran.
    #[serde(with = "duration_ms")]
    pub average_time: Duration,
    /// Busy time over wall clock time, as a percentage. 0 when nothing ran.
    pub efficiency: f64,
    /// Most tasks observed running at the same instant.
    pub peak_concurrency: usize,
    /// Terminal tasks per kind.
    pub breakdown: BTreeMap<String, usize>,
}

impl ExecutionReport {
    pub fn summarize(tasks: &[Task]) -> Self {
        let mut completed_count = 0;
        let mut failed_count = 0;
        let mut blocked_count = 0;
        let mut breakdown = BTreeMap::new();

        for task in tasks {
            match task.status {
                TaskStatus::Completed => completed_count += 1,
                TaskStatus::Failed { .. } => failed_count += 1,
                TaskStatus::Blocked { .. } => blocked_count += 1,
                TaskStatus::Pending | TaskStatus::Running => continue,
            }
            *breakdown.entry(task.kind().to_string()).or_insert(0) += 1;
        }

        let ran: Vec<&Task> = tasks.iter().filter(|task| has_run(task)).collect();
        let total_busy_time: Duration = ran.iter().filter_map(|task| task.duration).sum();
        let average_time = match ran.len() {
            0 => Duration::ZERO,
            n => total_busy_time.div_f64(n as f64),
        };

        let intervals: Vec<_> = ran.iter().filter_map(|task| task.interval()).collect();
        let (wall_clock_time, peak_concurrency) = if intervals.is_empty() {
            let calendar: Vec<_> = ran
                .iter()
                .filter_map(|task| Some((task.started_at?, task.finished_at?)))
                .collect();
            let wall = span(&calendar)
                .and_then(|(start, finish)| (finish - start).to_std().ok())
                .unwrap_or_default();
            (wall, peak_overlap(&calendar))
        } else {
            let wall = span(&intervals)
                .map(|(start, finish)| finish.duration_since(start))
                .unwrap_or_default();
            (wall, peak_overlap(&intervals))
        };

        let efficiency = if wall_clock_time.is_zero() {
            0.0
        } else {
            total_busy_time.as_secs_f64() / wall_clock_time.as_secs_f64() * 100.0
        };

        Self {
            total_tasks: tasks.len(),
            completed_count,
            failed_count,
            blocked_count,
            total_busy_time,
            wall_clock_time,
            average_time,
            efficiency,
            peak_concurrency,
            breakdown,
        }
    }

    /// A non-empty run in which nothing completed.
    pub fn is_failure(&self) -> bool {
        self.total_tasks > 0 && self.completed_count == 0
    }
}

fn has_run(task: &Task) -> bool {
    matches!(
        task.status,
        TaskStatus::Completed | TaskStatus::Failed { .. }
    )
}

/// Earliest start to latest finish.
fn span<T: Ord + Copy>(intervals: &[(T, T)]) -> Option<(T, T)> {
    let start = intervals.iter().map(|(start, _)| *start).min()?;
    let finish = intervals.iter().map(|(_, finish)| *finish).max()?;
    Some((start, finish))
}

/// Sweep over `[start, finish)` intervals.
fn peak_overlap<T: Ord + Copy>(intervals: &[(T, T)]) -> usize {
    let mut edges: Vec<_> = intervals
        .iter()
        .flat_map(|&(start, finish)| [(start, 1i64), (finish, -1i64)])
        .collect();
    // Ends sort before starts at the same instant.
    edges.sort();

    let mut current = 0i64;
    let mut peak = 0i64;
    for (_, delta) in edges {
        current += delta;
        peak = peak.max(current);
    }
    peak as usize
}

impl std::fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} tasks: {} completed, {} failed, {} blocked",
            self.total_tasks, self.completed_count, self.failed_count, self.blocked_count
        )?;
        writeln!(
            f,
            "busy {:.1}s, wall clock {:.1}s, average {:.1}s, efficiency {:.0}%, peak concurrency {}",
            self.total_busy_time.as_secs_f64(),
            self.wall_clock_time.as_secs_f64(),
            self.average_time.as_secs_f64(),
            self.efficiency,
            self.peak_concurrency
        )?;
        for (kind, count) in &self.breakdown {
            writeln!(f, "  {}: {}", kind, count)?;
        }
        Ok(())
    }
}
