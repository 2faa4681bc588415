// src/dag/graph.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::registry::{StepDef, StepName, StepRegistry};
use crate::errors::{EvalflowError, Result};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Direct dependencies: steps that must finish before this one can run.
    deps: Vec<StepName>,
    /// Direct dependents: steps that need this one.
    dependents: Vec<StepName>,
}

/// Compiled step graph.
///
/// Holds every registered step, adjacency information for scheduling, and a
/// topological execution order in which ties are broken by declaration order
/// (first registered first), so identical registrations always yield the same
/// order.
#[derive(Debug, Clone)]
pub struct DagGraph {
    /// Steps in declaration order.
    steps: Vec<StepDef>,
    nodes: HashMap<StepName, DagNode>,
    /// Indices into `steps`, topologically sorted.
    order: Vec<usize>,
}

impl DagGraph {
    /// Compile a registry into a DAG.
    ///
    /// Fails with `UnknownDependency` if a `needs` entry does not name a
    /// registered step and `CyclicDependency` if the `needs` relation has a
    /// cycle (including a step needing itself).
    pub fn build(registry: &StepRegistry) -> Result<Self> {
        let steps: Vec<StepDef> = registry.iter().cloned().collect();
        let position: HashMap<&str, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut nodes: HashMap<StepName, DagNode> = HashMap::new();

        // First pass: validate references and record (deduplicated) deps.
        for step in steps.iter() {
            let mut deps: Vec<StepName> = Vec::new();
            for dep in step.needs.iter() {
                if dep == &step.name {
                    return Err(EvalflowError::CyclicDependency(step.name.clone()));
                }
                if !position.contains_key(dep.as_str()) {
                    return Err(EvalflowError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dep.clone(),
                    });
                }
                if !deps.contains(dep) {
                    deps.push(dep.clone());
                }
            }
            nodes.insert(
                step.name.clone(),
                DagNode {
                    deps,
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: populate dependents, keeping declaration order.
        for step in steps.iter() {
            let deps = nodes
                .get(&step.name)
                .map(|n| n.deps.clone())
                .unwrap_or_default();
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(step.name.clone());
                }
            }
        }

        detect_cycle(&steps, &nodes)?;
        let order = declaration_ordered_toposort(&steps, &nodes, &position);

        debug!(
            order = ?order.iter().map(|&i| steps[i].name.as_str()).collect::<Vec<_>>(),
            "compiled step graph"
        );

        Ok(Self {
            steps,
            nodes,
            order,
        })
    }

    /// Steps in execution order.
    pub fn order(&self) -> impl Iterator<Item = &StepDef> {
        self.order.iter().map(|&i| &self.steps[i])
    }

    /// Step names in execution order.
    pub fn order_names(&self) -> Vec<StepName> {
        self.order().map(|s| s.name.clone()).collect()
    }

    /// Steps in declaration order.
    pub fn steps(&self) -> impl Iterator<Item = &StepDef> {
        self.steps.iter()
    }

    pub fn step(&self, name: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Immediate dependencies of a step (its `needs`).
    pub fn dependencies_of(&self, name: &str) -> &[StepName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a step (steps that list it in `needs`).
    pub fn dependents_of(&self, name: &str) -> &[StepName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}

/// Cycle detection through petgraph.
///
/// Edge direction: dep -> step. For `cmp` needing `ppl` we add `ppl -> cmp`.
fn detect_cycle(steps: &[StepDef], nodes: &HashMap<StepName, DagNode>) -> Result<()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for step in steps {
        graph.add_node(step.name.as_str());
    }
    for step in steps {
        if let Some(node) = nodes.get(&step.name) {
            for dep in node.deps.iter() {
                graph.add_edge(dep.as_str(), step.name.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_) => Ok(()),
        Err(cycle) => Err(EvalflowError::CyclicDependency(cycle.node_id().to_string())),
    }
}

/// Kahn's algorithm, always picking the earliest-declared ready step.
///
/// Assumes the graph is acyclic.
fn declaration_ordered_toposort(
    steps: &[StepDef],
    nodes: &HashMap<StepName, DagNode>,
    position: &HashMap<&str, usize>,
) -> Vec<usize> {
    let mut in_degree: Vec<usize> = steps
        .iter()
        .map(|s| nodes.get(&s.name).map(|n| n.deps.len()).unwrap_or(0))
        .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(steps.len());
    while let Some(Reverse(idx)) = ready.pop() {
        order.push(idx);
        let dependents = nodes
            .get(&steps[idx].name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[]);
        for dependent in dependents {
            if let Some(&j) = position.get(dependent.as_str()) {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }
    }

    order
}
