//! Task dependency graph using petgraph.

use std::collections::{HashMap, HashSet};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::{Error, Result};
use crate::registry::TaskRegistry;

/// Directed acyclic graph of task dependencies.
///
/// Edges point from a task to each of its dependencies. Construction fails
/// on dangling references and cycles, so a built graph is always runnable.
#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
    cached_topological_order: Vec<String>,
}

impl TaskGraph {
    /// Builds and validates the graph for every registered task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DanglingDependency`] when a dependency is not
    /// registered and [`Error::CyclicDependency`] naming every task caught
    /// in a cycle.
    pub fn new(registry: &TaskRegistry) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for task in registry.tasks() {
            let node = graph.add_node(task.name.clone());
            node_map.insert(task.name.clone(), node);
        }

        for task in registry.tasks() {
            let from_node = node_map[&task.name];
            for dep_name in &task.dependencies {
                let to_node =
                    node_map
                        .get(dep_name)
                        .ok_or_else(|| Error::DanglingDependency {
                            task: task.name.clone(),
                            dependency: dep_name.clone(),
                        })?;
                graph.add_edge(from_node, *to_node, ());
            }
        }

        let sorted = toposort(&graph, None).map_err(|_| Error::CyclicDependency {
            tasks: Self::cycle_members(&graph),
        })?;

        let topological_order: Vec<String> = sorted
            .into_iter()
            .rev()
            .map(|idx| graph[idx].clone())
            .collect();

        Ok(Self {
            graph,
            node_map,
            cached_topological_order: topological_order,
        })
    }

    fn cycle_members(graph: &DiGraph<String, ()>) -> Vec<String> {
        let mut members: Vec<String> = tarjan_scc(graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .map(|idx| graph[idx].clone())
            .collect();
        members.sort();
        members
    }

    /// Returns every task with dependencies before dependents.
    #[inline]
    pub fn topological_order(&self) -> &[String] {
        &self.cached_topological_order
    }

    /// Returns the direct dependencies of a task.
    pub fn dependencies(&self, task_name: &str) -> Result<Vec<String>> {
        self.neighbors(task_name, Direction::Outgoing)
    }

    /// Returns the direct dependents of a task.
    pub fn dependents(&self, task_name: &str) -> Result<Vec<String>> {
        self.neighbors(task_name, Direction::Incoming)
    }

    fn neighbors(&self, task_name: &str, direction: Direction) -> Result<Vec<String>> {
        let node = self.node(task_name)?;
        let mut names: Vec<String> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|idx| self.graph[idx].clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn node(&self, task_name: &str) -> Result<NodeIndex> {
        self.node_map
            .get(task_name)
            .copied()
            .ok_or_else(|| {
                let mut available: Vec<&str> = self.node_map.keys().map(|k| k.as_str()).collect();
                available.sort_unstable();
                Error::UnknownTask {
                    name: task_name.to_string(),
                    available: available.join(", "),
                }
            })
    }

    /// Returns the requested tasks plus everything they transitively depend on.
    pub fn closure(&self, requested: &[String]) -> Result<HashSet<String>> {
        let mut result = HashSet::new();
        let mut stack = Vec::with_capacity(requested.len());
        for name in requested {
            stack.push(self.node(name)?);
        }

        while let Some(node) = stack.pop() {
            if !result.insert(self.graph[node].clone()) {
                continue;
            }
            stack.extend(self.graph.neighbors_directed(node, Direction::Outgoing));
        }

        Ok(result)
    }

    /// Groups the closure of `requested` into levels for execution.
    ///
    /// Every task appears once, and all of its dependencies sit in earlier
    /// levels. Tasks sharing a level have no ordering constraint between them.
    pub fn execution_plan(&self, requested: &[String]) -> Result<Vec<Vec<String>>> {
        let closure = self.closure(requested)?;
        let mut levels: Vec<Vec<String>> = Vec::new();
        let mut level_map: HashMap<&str, usize> = HashMap::new();

        for task_name in &self.cached_topological_order {
            if !closure.contains(task_name) {
                continue;
            }
            let node = self.node_map[task_name];
            let level = self
                .graph
                .neighbors_directed(node, Direction::Outgoing)
                .filter_map(|idx| level_map.get(self.graph[idx].as_str()))
                .max()
                .map(|l| l + 1)
                .unwrap_or(0);

            level_map.insert(task_name.as_str(), level);
            while levels.len() <= level {
                levels.push(Vec::new());
            }
            levels[level].push(task_name.clone());
        }

        for level in &mut levels {
            level.sort();
        }
        Ok(levels)
    }
}
