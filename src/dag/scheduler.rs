// src/dag/scheduler.rs

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::registry::StepName;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::dag::step_info::{RunState, StepInfo, StepRunState};
use crate::engine::TaskOutcome;

/// Scheduler holds the immutable step graph plus mutable per-run state.
///
/// It is responsible for:
/// - deciding when a step is ready to run (all `needs` succeeded)
/// - recording per-task outcomes and deciding when a step is done
/// - scheduling dependents once a step succeeds
/// - blocking dependents when a step fails
///
/// A step is done only once every one of its tasks has a terminal outcome,
/// so a slow or timed-out task holds back the step's successors but never
/// its siblings.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    steps: HashMap<StepName, StepInfo>,
    started: bool,
    finished: bool,
}

impl Scheduler {
    pub fn new(graph: DagGraph) -> Self {
        let mut steps = HashMap::new();
        for def in graph.steps() {
            let deps = graph.dependencies_of(&def.name).to_vec();
            steps.insert(def.name.clone(), StepInfo::from_def(def, deps));
        }

        Self {
            graph,
            steps,
            started: false,
            finished: false,
        }
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Whether the run has started and every step reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether every step succeeded. Only meaningful once finished.
    pub fn all_succeeded(&self) -> bool {
        self.steps
            .values()
            .all(|info| matches!(info.run_state, Some(RunState::DoneSuccess)))
    }

    /// Read-only view of the given step's run state.
    pub fn run_state_of(&self, step: &str) -> Option<StepRunState> {
        let info = self.steps.get(step)?;
        Some(info.run_state.into())
    }

    /// Start the run: every step becomes pending and the roots are scheduled.
    pub fn start(&mut self) -> SchedulerStep {
        if self.started {
            warn!("scheduler start called twice; ignoring");
            return SchedulerStep::default();
        }
        self.started = true;

        let mut manager = StateManager::new(&self.graph, &mut self.steps);
        manager.mark_all_pending();
        let newly_scheduled = manager.collect_new_ready_steps();

        info!(
            steps = self.steps.len(),
            roots = ?newly_scheduled.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "scheduler: run started"
        );

        let run_just_finished = self.maybe_finish_run();
        SchedulerStep {
            newly_scheduled,
            run_just_finished,
            ..SchedulerStep::default()
        }
    }

    /// Block every step that has not started yet (cooperative cancel).
    ///
    /// Running steps are left alone: their in-flight tasks still report
    /// completions, which are recorded as usual.
    pub fn cancel_pending(&mut self) -> SchedulerStep {
        let mut manager = StateManager::new(&self.graph, &mut self.steps);
        let newly_blocked = manager.mark_pending_failed();
        if !newly_blocked.is_empty() {
            info!(blocked = ?newly_blocked, "scheduler: pending steps canceled");
        }
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_failed: newly_blocked.clone(),
            newly_blocked,
            run_just_finished,
            ..SchedulerStep::default()
        }
    }

    fn maybe_finish_run(&mut self) -> bool {
        if !self.started || self.finished {
            return false;
        }

        let manager = StateManager::new(&self.graph, &mut self.steps);
        if manager.all_steps_terminal() {
            info!(
                succeeded = self.all_succeeded(),
                "scheduler: all steps terminal; run finished"
            );
            self.finished = true;
            true
        } else {
            false
        }
    }

    /// Record one task's terminal outcome. Once the step's last task is in,
    /// its dependents are scheduled (success) or blocked (failure).
    pub fn step_completion(
        &mut self,
        step: &str,
        task_index: usize,
        outcome: &TaskOutcome,
    ) -> SchedulerStep {
        if !self.started {
            warn!(step = %step, task_index, "completion before run start; ignoring");
            return SchedulerStep::default();
        }

        let mut result = SchedulerStep::default();

        let step_done = match self.steps.get_mut(step) {
            Some(info) => {
                if !matches!(info.run_state, Some(RunState::Running)) {
                    warn!(
                        step = %step,
                        task_index,
                        state = ?info.run_state,
                        "completion for step that is not running; ignoring"
                    );
                    return result;
                }
                match info.task_outcomes.get_mut(task_index) {
                    Some(slot) if slot.is_none() => *slot = Some(outcome.is_success()),
                    Some(_) => {
                        warn!(step = %step, task_index, "duplicate completion; ignoring");
                        return result;
                    }
                    None => {
                        warn!(step = %step, task_index, "completion for unknown task index; ignoring");
                        return result;
                    }
                }
                debug!(step = %step, task_index, success = outcome.is_success(), "task completed");

                if info.all_tasks_done() {
                    let failed = info.any_task_failed();
                    info.run_state = Some(if failed {
                        RunState::DoneFailed
                    } else {
                        RunState::DoneSuccess
                    });
                    Some(failed)
                } else {
                    None
                }
            }
            None => {
                warn!(step = %step, "completion for unknown step; ignoring");
                return result;
            }
        };

        match step_done {
            Some(false) => {
                info!(step = %step, "step succeeded");
                let mut manager = StateManager::new(&self.graph, &mut self.steps);
                result.newly_scheduled = manager.collect_new_ready_steps();
            }
            Some(true) => {
                warn!(step = %step, "step failed; blocking dependents");
                result.newly_failed.push(step.to_string());
                let mut manager = StateManager::new(&self.graph, &mut self.steps);
                let blocked = manager.mark_dependents_failed(step);
                result.newly_failed.extend(blocked.iter().cloned());
                result.newly_blocked = blocked;
            }
            None => {}
        }

        result.run_just_finished = self.maybe_finish_run();
        result
    }
}
