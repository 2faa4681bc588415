// src/dag/state_manager.rs

//! Per-run state management for steps in the scheduler.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::dag::registry::StepName;
use crate::dag::step_info::{RunState, ScheduledStep, StepInfo};

/// Manages per-run state transitions for steps.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    steps: &'a mut HashMap<StepName, StepInfo>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a DagGraph, steps: &'a mut HashMap<StepName, StepInfo>) -> Self {
        Self { graph, steps }
    }

    /// Include every step of the graph in the run as `Pending`.
    pub fn mark_all_pending(&mut self) {
        for info in self.steps.values_mut() {
            if info.run_state.is_none() {
                info.run_state = Some(RunState::Pending);
                debug!(step = %info.name, "marked Pending for this run");
            }
        }
    }

    /// Mark every dependent (transitively) of a step that did not succeed as
    /// `DoneFailed`, provided it has not started yet.
    ///
    /// Returns the steps newly marked, excluding the root step.
    pub fn mark_dependents_failed(&mut self, failed_step: &str) -> Vec<StepName> {
        let mut stack: Vec<StepName> = self.graph.dependents_of(failed_step).to_vec();
        let mut visited: HashSet<StepName> = HashSet::new();
        let mut newly_failed = Vec::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            if let Some(info) = self.steps.get_mut(&name) {
                match info.run_state {
                    Some(RunState::Pending) => {
                        info.run_state = Some(RunState::DoneFailed);
                        debug!(
                            step = %info.name,
                            upstream = %failed_step,
                            "marking dependent as DoneFailed due to upstream failure"
                        );
                        newly_failed.push(info.name.clone());
                        stack.extend(self.graph.dependents_of(&name).iter().cloned());
                    }
                    Some(RunState::Running) => {
                        // Cannot happen: a running step had all its needs succeed.
                        warn!(step = %info.name, "dependent already running while upstream failed");
                    }
                    Some(RunState::DoneSuccess) | Some(RunState::DoneFailed) | None => {}
                }
            }
        }

        newly_failed
    }

    /// Mark every `Pending` step as `DoneFailed` (run canceled).
    pub fn mark_pending_failed(&mut self) -> Vec<StepName> {
        let mut blocked = Vec::new();
        for name in self.graph.order_names() {
            if let Some(info) = self.steps.get_mut(&name) {
                if matches!(info.run_state, Some(RunState::Pending)) {
                    info.run_state = Some(RunState::DoneFailed);
                    blocked.push(name);
                }
            }
        }
        blocked
    }

    /// Collect steps that are `Pending` with satisfied dependencies, mark them
    /// `Running`, and return them in execution order.
    pub fn collect_new_ready_steps(&mut self) -> Vec<ScheduledStep> {
        let steps: &HashMap<StepName, StepInfo> = self.steps;
        let ro = ReadOnlyStateManager::new(steps);
        let candidates: Vec<StepName> = self
            .graph
            .order()
            .filter_map(|def| {
                let info = steps.get(&def.name)?;
                if matches!(info.run_state, Some(RunState::Pending))
                    && ro.deps_satisfied_for_info(info)
                {
                    Some(info.name.clone())
                } else {
                    None
                }
            })
            .collect();

        let mut ready = Vec::new();
        for name in candidates {
            if let Some(info) = self.steps.get_mut(&name) {
                info!(
                    step = %info.name,
                    tasks = info.task_count,
                    "needs satisfied; scheduling step"
                );
                info.run_state = Some(RunState::Running);
                ready.push(ScheduledStep::from_step_info(info));
            }
        }

        ready
    }

    /// Check if every participating step is in a terminal state.
    pub fn all_steps_terminal(&self) -> bool {
        !self.steps.values().any(|info| {
            matches!(
                info.run_state,
                Some(RunState::Pending) | Some(RunState::Running)
            )
        })
    }
}

/// Read-only view for checking dependency satisfaction with shared access.
pub struct ReadOnlyStateManager<'a> {
    steps: &'a HashMap<StepName, StepInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(steps: &'a HashMap<StepName, StepInfo>) -> Self {
        Self { steps }
    }

    /// A step may start once every step it needs finished successfully.
    pub fn deps_satisfied_for_info(&self, info: &StepInfo) -> bool {
        info.deps.iter().all(|dep_name| match self.steps.get(dep_name) {
            Some(dep) => matches!(dep.run_state, Some(RunState::DoneSuccess)),
            None => {
                warn!(
                    step = %info.name,
                    dep = %dep_name,
                    "dependency missing from steps map"
                );
                false
            }
        })
    }
}
