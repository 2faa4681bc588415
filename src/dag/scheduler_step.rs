// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::registry::StepName;
use crate::dag::step_info::ScheduledStep;

/// Structured result of a single scheduler "step".
///
/// Useful for tests that want to drive the DAG by hand and make assertions
/// about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Steps that became ready to run as a result of this step.
    pub newly_scheduled: Vec<ScheduledStep>,
    /// Steps newly marked as failed, including steps blocked by an upstream
    /// failure. Blocked steps never dispatch any task.
    pub newly_failed: Vec<StepName>,
    /// Steps blocked (never started) because an upstream step did not
    /// succeed or the run was canceled.
    pub newly_blocked: Vec<StepName>,
    /// Whether this step caused the run to finish.
    pub run_just_finished: bool,
}
