// src/dag/step_info.rs

//! Step metadata and per-run state used by the scheduler.

use crate::dag::registry::{StepDef, StepName};
use crate::handler::HandlerMethod;

/// Per-run state of a step (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Step is part of the run but waiting on its `needs`.
    Pending,
    /// Tasks of the step have been dispatched.
    Running,
    /// Every task of the step succeeded.
    DoneSuccess,
    /// A task failed, the step was blocked by an upstream step that did not
    /// succeed, or the run was canceled before it started.
    DoneFailed,
}

/// Public, read-only view of a step's per-run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRunState {
    /// The step is not participating in the run.
    NotInRun,
    Pending,
    Running,
    DoneSuccess,
    DoneFailed,
}

impl From<Option<RunState>> for StepRunState {
    fn from(state: Option<RunState>) -> Self {
        match state {
            None => StepRunState::NotInRun,
            Some(RunState::Pending) => StepRunState::Pending,
            Some(RunState::Running) => StepRunState::Running,
            Some(RunState::DoneSuccess) => StepRunState::DoneSuccess,
            Some(RunState::DoneFailed) => StepRunState::DoneFailed,
        }
    }
}

/// Static step information plus per-run state.
#[derive(Debug, Clone)]
pub struct StepInfo {
    pub name: StepName,
    pub entry: HandlerMethod,
    pub task_count: usize,
    pub concurrency: Option<usize>,
    /// Direct dependencies (the step's `needs`).
    pub deps: Vec<StepName>,

    /// Per-run state (None if not participating in the run).
    pub run_state: Option<RunState>,

    /// Outcome per task index: `None` until the task reaches a terminal
    /// status, then `Some(true)` for success.
    pub task_outcomes: Vec<Option<bool>>,
}

impl StepInfo {
    pub fn from_def(def: &StepDef, deps: Vec<StepName>) -> Self {
        Self {
            name: def.name.clone(),
            entry: def.entry,
            task_count: def.task_num,
            concurrency: def.concurrency,
            deps,
            run_state: None,
            task_outcomes: vec![None; def.task_num],
        }
    }

    /// Every task has a terminal outcome.
    pub fn all_tasks_done(&self) -> bool {
        self.task_outcomes.iter().all(Option::is_some)
    }

    pub fn any_task_failed(&self) -> bool {
        self.task_outcomes.iter().any(|o| *o == Some(false))
    }
}

/// A step whose `needs` are satisfied and whose tasks should be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledStep {
    pub name: StepName,
    pub entry: HandlerMethod,
    pub task_count: usize,
    pub concurrency: Option<usize>,
}

impl ScheduledStep {
    pub fn from_step_info(info: &StepInfo) -> Self {
        Self {
            name: info.name.clone(),
            entry: info.entry,
            task_count: info.task_count,
            concurrency: info.concurrency,
        }
    }
}
