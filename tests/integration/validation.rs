//! Malformed task sets are rejected before any task starts.

use std::sync::Arc;

use atelier::core::{TaskId, TaskRegistry, TaskSpec, TaskStatus};
use atelier::{Error, Scheduler};

use crate::fixtures::{registry_of, ScriptedExecutor};

/// Test: Cycle rejection
/// Given a -> b -> c -> a
/// When the registry is validated or run
/// Then a cycle error names all three and nothing is dispatched
#[tokio::test]
async fn test_cycle_rejected_before_dispatch() {
    let specs = vec![
        TaskSpec::new("a").depends_on("b"),
        TaskSpec::new("b").depends_on("c"),
        TaskSpec::new("c").depends_on("a"),
    ];
    let registry = registry_of(specs);

    match registry.validate() {
        Err(Error::CyclicDependency { cycle }) => {
            assert_eq!(
                cycle,
                vec![TaskId::from("a"), TaskId::from("b"), TaskId::from("c")]
            );
        }
        other => panic!("expected a cycle error, got {:?}", other),
    }

    let executor = Arc::new(ScriptedExecutor::new());
    let mut scheduler = Scheduler::new(registry, executor.clone());
    assert!(matches!(
        scheduler.run(4).await,
        Err(Error::CyclicDependency { .. })
    ));
    assert!(executor.marks().is_empty());
    assert!(scheduler
        .registry()
        .tasks()
        .all(|t| t.status == TaskStatus::Pending));
}

/// Test: A cycle hidden behind healthy tasks is still found
#[tokio::test]
async fn test_cycle_behind_valid_prefix() {
    let specs = vec![
        TaskSpec::new("root"),
        TaskSpec::new("x").with_dependencies(["root", "z"]),
        TaskSpec::new("y").depends_on("x"),
        TaskSpec::new("z").depends_on("y"),
        TaskSpec::new("tail").depends_on("root"),
    ];
    let executor = Arc::new(ScriptedExecutor::new());
    let mut scheduler = Scheduler::new(registry_of(specs), executor.clone());

    match scheduler.run(2).await {
        Err(Error::CyclicDependency { cycle }) => {
            assert_eq!(cycle.len(), 3);
            assert!(!cycle.contains(&TaskId::from("root")));
        }
        other => panic!("expected a cycle error, got {:?}", other.map(|o| o.run_id)),
    }
    assert!(executor.marks().is_empty());
}

/// Test: A dependency on a task that never gets registered
#[tokio::test]
async fn test_unknown_dependency_rejected() {
    let executor = Arc::new(ScriptedExecutor::new());
    let specs = vec![
        TaskSpec::new("page-home"),
        TaskSpec::new("navigation").with_dependencies(["page-home", "page-missing"]),
    ];
    let mut scheduler = Scheduler::new(registry_of(specs), executor.clone());

    match scheduler.run(2).await {
        Err(Error::UnknownDependency { task, dependency }) => {
            assert_eq!(task, TaskId::from("navigation"));
            assert_eq!(dependency, TaskId::from("page-missing"));
        }
        other => panic!("expected unknown dependency, got {:?}", other.map(|o| o.run_id)),
    }
    assert!(executor.marks().is_empty());
}

/// Test: Externally satisfied dependencies count as complete
#[tokio::test(start_paused = true)]
async fn test_external_dependency_is_satisfied() {
    let mut registry = TaskRegistry::new();
    registry.declare_external("brand-guidelines").unwrap();
    registry
        .register(TaskSpec::new("design-system").depends_on("brand-guidelines"))
        .unwrap();

    let executor = Arc::new(ScriptedExecutor::new());
    let mut scheduler = Scheduler::new(registry, executor.clone());
    let outcome = scheduler.run(1).await.unwrap();

    assert_eq!(outcome.report.completed_count, 1);
    assert_eq!(executor.start_order(), vec!["design-system"]);
}

#[test]
fn test_duplicate_and_self_dependency_rejected_at_register() {
    let mut registry = TaskRegistry::new();
    registry.register(TaskSpec::new("a")).unwrap();

    assert!(matches!(
        registry.register(TaskSpec::new("a")),
        Err(Error::DuplicateId(id)) if id == TaskId::from("a")
    ));
    assert!(matches!(
        registry.register(TaskSpec::new("b").depends_on("b")),
        Err(Error::CyclicDependency { .. })
    ));
    assert_eq!(registry.len(), 1);
}

/// Test: An empty registry finishes immediately with a zero report
#[tokio::test]
async fn test_empty_registry() {
    let executor = Arc::new(ScriptedExecutor::new());
    let mut scheduler = Scheduler::new(TaskRegistry::new(), executor);

    let outcome = scheduler.run(3).await.unwrap();

    assert!(outcome.completions.is_empty());
    assert_eq!(outcome.report.total_tasks, 0);
    assert_eq!(outcome.report.efficiency, 0.0);
    assert!(!outcome.report.efficiency.is_nan());
    assert!(!outcome.is_failure());
}

#[tokio::test]
async fn test_zero_concurrency_rejected() {
    let executor = Arc::new(ScriptedExecutor::new());
    let mut scheduler = Scheduler::new(registry_of(vec![TaskSpec::new("a")]), executor.clone());

    assert!(matches!(scheduler.run(0).await, Err(Error::Validation(_))));
    assert!(executor.marks().is_empty());
}
