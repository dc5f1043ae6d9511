//! Failures, timeouts and blocked propagation.
//!
//! A failing task never aborts the run: it is recorded as failed, the tasks
//! that can no longer run are blocked, and everything else carries on.

use std::sync::Arc;
use std::time::Duration;

use atelier::core::{TaskId, TaskSpec, TaskStatus};
use atelier::orchestration::TaskOutcome;
use atelier::Scheduler;

use crate::fixtures::{diamond, registry_of, ScriptedExecutor};

fn blocked_by(cause: &str) -> TaskStatus {
    TaskStatus::Blocked {
        cause: TaskId::from(cause),
    }
}

/// Test: Failure isolation
/// Given a (fails), b (after a) and c (independent)
/// When the scheduler runs
/// Then b is blocked, c completes and the counts are 1/1/1
#[tokio::test(start_paused = true)]
async fn test_failure_isolation() {
    let executor = Arc::new(ScriptedExecutor::new().fail("a", "render crashed"));
    let specs = vec![
        TaskSpec::new("a"),
        TaskSpec::new("b").depends_on("a"),
        TaskSpec::new("c"),
    ];
    let mut scheduler = Scheduler::new(registry_of(specs), executor.clone());

    let outcome = scheduler.run(2).await.unwrap();
    let registry = scheduler.registry();

    assert_eq!(
        registry.get(&TaskId::from("a")).unwrap().status,
        TaskStatus::Failed {
            error: "render crashed".to_string()
        }
    );
    assert_eq!(registry.get(&TaskId::from("b")).unwrap().status, blocked_by("a"));
    assert_eq!(
        registry.get(&TaskId::from("c")).unwrap().status,
        TaskStatus::Completed
    );
    assert_eq!(outcome.report.completed_count, 1);
    assert_eq!(outcome.report.failed_count, 1);
    assert_eq!(outcome.report.blocked_count, 1);
    assert!(!outcome.is_failure());
    assert!(!executor.start_order().contains(&"b".to_string()));
}

/// Test: Blocking is transitive along a chain
#[tokio::test(start_paused = true)]
async fn test_blocking_is_transitive() {
    let executor = Arc::new(ScriptedExecutor::new().fail("b", "broken"));
    let specs = vec![
        TaskSpec::new("a"),
        TaskSpec::new("b").depends_on("a"),
        TaskSpec::new("c").depends_on("b"),
        TaskSpec::new("d").depends_on("c"),
    ];
    let mut scheduler = Scheduler::new(registry_of(specs), executor.clone());

    let outcome = scheduler.run(4).await.unwrap();
    let registry = scheduler.registry();

    assert_eq!(
        registry.get(&TaskId::from("a")).unwrap().status,
        TaskStatus::Completed
    );
    assert_eq!(registry.get(&TaskId::from("c")).unwrap().status, blocked_by("b"));
    assert_eq!(registry.get(&TaskId::from("d")).unwrap().status, blocked_by("b"));
    assert_eq!(executor.start_order(), vec!["a", "b"]);

    let blocked: Vec<_> = outcome
        .completions
        .iter()
        .filter(|c| matches!(c.outcome, TaskOutcome::Blocked(_)))
        .map(|c| c.task.id().to_string())
        .collect();
    assert_eq!(blocked, vec!["c", "d"]);
}

/// Test: A failed branch of a diamond blocks the join but not its sibling
#[tokio::test(start_paused = true)]
async fn test_diamond_branch_failure() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .fail("b", "layout overflow")
            .delay("c", Duration::from_secs(5)),
    );
    let mut scheduler = Scheduler::new(registry_of(diamond()), executor);

    let outcome = scheduler.run(2).await.unwrap();
    let registry = scheduler.registry();

    assert_eq!(
        registry.get(&TaskId::from("c")).unwrap().status,
        TaskStatus::Completed
    );
    assert_eq!(registry.get(&TaskId::from("d")).unwrap().status, blocked_by("b"));

    let order: Vec<_> = outcome
        .completion_order()
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(order, vec!["a", "b", "d", "c"]);
}

/// Test: A hung task times out without stalling the rest of the run
#[tokio::test(start_paused = true)]
async fn test_timeout_is_isolated() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .delay("hung", Duration::from_secs(3600))
            .delay("steady", Duration::from_secs(2)),
    );
    let specs = vec![
        TaskSpec::new("hung"),
        TaskSpec::new("steady"),
        TaskSpec::new("after-hung").depends_on("hung"),
        TaskSpec::new("after-steady").depends_on("steady"),
    ];
    let mut scheduler = Scheduler::new(registry_of(specs), executor.clone())
        .with_task_timeout(Duration::from_secs(30));

    let started = tokio::time::Instant::now();
    let outcome = scheduler.run(2).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(60));

    let registry = scheduler.registry();
    let hung = registry.get(&TaskId::from("hung")).unwrap();
    assert!(hung.error().unwrap().contains("timed out"));
    assert_eq!(
        registry.get(&TaskId::from("after-hung")).unwrap().status,
        blocked_by("hung")
    );
    assert_eq!(
        registry.get(&TaskId::from("after-steady")).unwrap().status,
        TaskStatus::Completed
    );
    assert_eq!(outcome.report.completed_count, 2);
    assert_eq!(outcome.report.failed_count, 1);
    assert_eq!(outcome.report.blocked_count, 1);
}

/// Test: A task's own timeout wins over the scheduler default
#[tokio::test(start_paused = true)]
async fn test_per_task_timeout() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .delay("strict", Duration::from_secs(5))
            .delay("relaxed", Duration::from_secs(5)),
    );
    let specs = vec![
        TaskSpec::new("strict").with_timeout(Duration::from_secs(1)),
        TaskSpec::new("relaxed"),
    ];
    let mut scheduler = Scheduler::new(registry_of(specs), executor)
        .with_task_timeout(Duration::from_secs(60));

    let outcome = scheduler.run(2).await.unwrap();

    assert_eq!(outcome.report.failed_count, 1);
    assert_eq!(outcome.report.completed_count, 1);
    assert!(scheduler
        .registry()
        .get(&TaskId::from("strict"))
        .unwrap()
        .error()
        .is_some());
}

/// Test: A run where nothing completes is reported as failed
#[tokio::test(start_paused = true)]
async fn test_nothing_completed_is_failure() {
    let executor = Arc::new(ScriptedExecutor::new().fail("root", "no assets"));
    let specs = vec![
        TaskSpec::new("root"),
        TaskSpec::new("leaf-1").depends_on("root"),
        TaskSpec::new("leaf-2").depends_on("root"),
    ];
    let mut scheduler = Scheduler::new(registry_of(specs), executor);

    let outcome = scheduler.run(3).await.unwrap();

    assert!(outcome.is_failure());
    assert_eq!(outcome.report.blocked_count, 2);
    assert_eq!(
        outcome.completions[0].outcome,
        TaskOutcome::Failed("no assets".to_string())
    );
}
