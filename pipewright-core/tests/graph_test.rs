use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipewright_core::error::Error;
use pipewright_core::graph::TaskGraph;
use pipewright_core::registry::{action_fn, NoopAction, TaskOutcome, TaskRegistry};
use pipewright_core::runner::TaskRunner;

fn create_test_registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry.register("clean-styles", Vec::<String>::new(), NoopAction).unwrap();
    registry.register("styles", ["clean-styles"], NoopAction).unwrap();
    registry.register("inject", ["styles"], NoopAction).unwrap();
    registry
}

#[test]
fn test_topological_order() {
    let graph = TaskGraph::new(&create_test_registry()).unwrap();
    let order = graph.topological_order();

    assert_eq!(order, ["clean-styles", "styles", "inject"]);
}

#[test]
fn test_dependencies() {
    let graph = TaskGraph::new(&create_test_registry()).unwrap();

    assert_eq!(graph.dependencies("styles").unwrap(), vec!["clean-styles"]);
    assert!(graph.dependencies("clean-styles").unwrap().is_empty());
}

#[test]
fn test_dependents() {
    let graph = TaskGraph::new(&create_test_registry()).unwrap();

    assert_eq!(graph.dependents("clean-styles").unwrap(), vec!["styles"]);
    assert!(graph.dependents("inject").unwrap().is_empty());
}

#[test]
fn test_circular_dependency() {
    let mut registry = TaskRegistry::new();
    registry.register("a", ["b"], NoopAction).unwrap();
    registry.register("b", ["a"], NoopAction).unwrap();

    let err = TaskGraph::new(&registry).unwrap_err();
    assert!(err.to_string().contains("Circular dependency"));
}

#[test]
fn test_self_loop_is_a_cycle() {
    let mut registry = TaskRegistry::new();
    registry.register("loop", ["loop"], NoopAction).unwrap();

    assert!(matches!(
        TaskGraph::new(&registry),
        Err(Error::CyclicDependency { ref tasks }) if tasks == &["loop"]
    ));
}

#[test]
fn test_dangling_dependency() {
    let mut registry = create_test_registry();
    registry.register("optimize", ["inject", "fonts"], NoopAction).unwrap();

    match TaskGraph::new(&registry) {
        Err(Error::DanglingDependency { task, dependency }) => {
            assert_eq!(task, "optimize");
            assert_eq!(dependency, "fonts");
        }
        other => panic!("expected a dangling dependency, got {:?}", other.err()),
    }
}

#[test]
fn test_plan_only_covers_the_closure() {
    let mut registry = create_test_registry();
    registry.register("hello", Vec::<String>::new(), NoopAction).unwrap();
    let graph = TaskGraph::new(&registry).unwrap();

    let plan = graph.execution_plan(&["styles".to_string()]).unwrap();
    assert_eq!(plan, vec![vec!["clean-styles"], vec!["styles"]]);
}

#[tokio::test]
async fn test_runner_respects_dependency_order() {
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut registry = TaskRegistry::new();

    // The slow task sits in the first level; its dependent must still wait.
    for (name, deps, delay) in [
        ("wiredep", vec![], 40u64),
        ("styles", vec![], 0),
        ("inject", vec!["wiredep", "styles"], 0),
    ] {
        let log = log.clone();
        registry
            .register(
                name,
                deps,
                action_fn(move || {
                    let log = log.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        log.lock().unwrap().push(name.to_string());
                        Ok(TaskOutcome::Done)
                    }
                }),
            )
            .unwrap();
    }

    let report = TaskRunner::new(registry).unwrap().run_one("inject").await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.last().unwrap(), "inject");
    assert_eq!(log.len(), 3);
    assert_eq!(report.results.len(), 3);
    assert!(report.results.iter().all(|r| r.success));
}
