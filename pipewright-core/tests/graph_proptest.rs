use std::collections::HashMap;

use pipewright_core::registry::{NoopAction, TaskRegistry};
use pipewright_core::{Error, TaskGraph};
use proptest::prelude::*;

/// Task `i` may only depend on tasks with a lower index, so every generated
/// registry is acyclic.
fn gen_dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..12).prop_flat_map(|n| {
        (0..n)
            .map(|i| proptest::collection::vec(0..i.max(1), 0..=i.min(3)).prop_map(move |deps| {
                let mut deps: Vec<usize> = deps.into_iter().filter(|&d| d < i).collect();
                deps.sort();
                deps.dedup();
                deps
            }))
            .collect::<Vec<_>>()
    })
}

fn registry(edges: &[Vec<usize>]) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    for (i, deps) in edges.iter().enumerate() {
        registry
            .register(
                format!("t{}", i),
                deps.iter().map(|d| format!("t{}", d)),
                NoopAction,
            )
            .unwrap();
    }
    registry
}

proptest! {
    #[test]
    fn every_dependency_runs_in_an_earlier_level(edges in gen_dag()) {
        let graph = TaskGraph::new(&registry(&edges)).unwrap();
        let last = format!("t{}", edges.len() - 1);
        let plan = graph.execution_plan(&[last]).unwrap();

        let level_of: HashMap<&str, usize> = plan
            .iter()
            .enumerate()
            .flat_map(|(lvl, tasks)| tasks.iter().map(move |t| (t.as_str(), lvl)))
            .collect();

        for (task, lvl) in &level_of {
            for dep in graph.dependencies(task).unwrap() {
                let dep_level = level_of.get(dep.as_str());
                prop_assert!(dep_level.is_some(), "{} missing from plan", dep);
                prop_assert!(dep_level.unwrap() < lvl, "{} not before {}", dep, task);
            }
        }
    }

    #[test]
    fn plan_runs_each_task_once(edges in gen_dag()) {
        let graph = TaskGraph::new(&registry(&edges)).unwrap();
        let all: Vec<String> = (0..edges.len()).map(|i| format!("t{}", i)).collect();
        let plan = graph.execution_plan(&all).unwrap();

        let flat: Vec<&String> = plan.iter().flatten().collect();
        prop_assert_eq!(flat.len(), edges.len());
        let mut seen = std::collections::HashSet::new();
        for task in flat {
            prop_assert!(seen.insert(task.clone()), "{} planned twice", task);
        }
    }

    #[test]
    fn back_edge_is_always_a_cycle(edges in gen_dag()) {
        prop_assume!(edges.len() > 1);
        let mut edges = edges;
        let n = edges.len();
        // t0 -> t{n-1} -> t0 closes a loop whatever else is present.
        edges[0].push(n - 1);
        edges[n - 1].push(0);

        match TaskGraph::new(&registry(&edges)) {
            Err(Error::CyclicDependency { tasks }) => {
                prop_assert!(tasks.contains(&"t0".to_string()));
            }
            other => prop_assert!(false, "expected a cycle, got {:?}", other.map(|_| ())),
        }
    }
}
