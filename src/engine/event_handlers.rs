// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, error, info, warn};

use crate::dag::{Scheduler, SchedulerStep, StepName, partition};
use crate::engine::core::{Control, Dispatch};
use crate::engine::{ScheduledTask, TaskOutcome};
use crate::types::JobState;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Mark a task RUNNING in the job record.
    RecordTaskStarted { step: StepName, task_index: usize },
    /// Record a task's terminal outcome in the job record.
    RecordTask {
        step: StepName,
        task_index: usize,
        outcome: TaskOutcome,
    },
    /// Mark every unfinished task of a step that will never run as CANCELED.
    SkipStep { step: StepName, reason: String },
    /// Ask in-flight handlers to stop at their next checkpoint.
    SignalCancel,
    /// Move the job to CANCELED (shutdown requested locally).
    CancelJob,
    /// Move the job to its final state.
    FinishJob(JobState),
    /// The run is over.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Start the run and dispatch the root steps.
pub fn start_run(scheduler: &mut Scheduler, dispatch: &mut Dispatch) -> CoreStep {
    let mut commands = Vec::new();
    let step = scheduler.start();
    apply_scheduler_step(scheduler, dispatch, step, "", &mut commands);
    finish_if_done(scheduler, dispatch, commands)
}

pub fn handle_task_started(dispatch: &Dispatch, step: StepName, task_index: usize) -> CoreStep {
    let keep_running = !dispatch.finished;
    CoreStep {
        commands: vec![CoreCommand::RecordTaskStarted { step, task_index }],
        keep_running,
    }
}

/// Handle a task completion event.
///
/// The outcome is recorded, then fed to the scheduler; dependents whose
/// `needs` are now all satisfied are dispatched (or held while paused), and
/// dependents of a failed step are skipped.
pub fn handle_task_finished(
    scheduler: &mut Scheduler,
    dispatch: &mut Dispatch,
    step: StepName,
    task_index: usize,
    outcome: TaskOutcome,
) -> CoreStep {
    let mut commands = Vec::new();
    dispatch.in_flight = dispatch.in_flight.saturating_sub(1);
    complete_task(scheduler, dispatch, step, task_index, outcome, &mut commands);
    finish_if_done(scheduler, dispatch, commands)
}

/// React to a job state change made outside this runtime.
pub fn handle_state_observed(
    scheduler: &mut Scheduler,
    dispatch: &mut Dispatch,
    state: JobState,
) -> CoreStep {
    let mut commands = Vec::new();

    match (state, dispatch.control) {
        (JobState::Running, Control::Paused) => {
            info!(job = %dispatch.job_id, held = dispatch.held.len(), "job resumed; releasing held tasks");
            dispatch.control = Control::Active;
            let held = std::mem::take(&mut dispatch.held);
            route(scheduler, dispatch, held, &mut commands);
        }
        (JobState::Paused, Control::Active) => {
            info!(job = %dispatch.job_id, in_flight = dispatch.in_flight, "job paused; holding new tasks");
            dispatch.control = Control::Paused;
        }
        (JobState::Canceled | JobState::Removed | JobState::Failed | JobState::Succeeded, _) => {
            stop(scheduler, dispatch, format!("job {}", state.to_string().to_lowercase()), &mut commands);
        }
        (JobState::Created, _) => {
            warn!(job = %dispatch.job_id, "job observed in CREATED while running; ignoring");
        }
        _ => {}
    }

    finish_if_done(scheduler, dispatch, commands)
}

/// Graceful shutdown: cancel the job and let in-flight tasks wind down.
pub fn handle_shutdown(scheduler: &mut Scheduler, dispatch: &mut Dispatch) -> CoreStep {
    let mut commands = Vec::new();
    if dispatch.control != Control::Stopping {
        commands.push(CoreCommand::CancelJob);
    }
    stop(scheduler, dispatch, "job canceled".to_string(), &mut commands);
    finish_if_done(scheduler, dispatch, commands)
}

fn stop(
    scheduler: &mut Scheduler,
    dispatch: &mut Dispatch,
    reason: String,
    commands: &mut Vec<CoreCommand>,
) {
    if dispatch.control == Control::Stopping {
        return;
    }
    info!(
        job = %dispatch.job_id,
        in_flight = dispatch.in_flight,
        held = dispatch.held.len(),
        %reason,
        "stopping job"
    );
    dispatch.control = Control::Stopping;
    commands.push(CoreCommand::SignalCancel);

    let blocked = scheduler.cancel_pending();
    for step in blocked.newly_blocked {
        commands.push(CoreCommand::SkipStep {
            step,
            reason: reason.clone(),
        });
    }

    let held = std::mem::take(&mut dispatch.held);
    route(scheduler, dispatch, held, commands);
}

fn complete_task(
    scheduler: &mut Scheduler,
    dispatch: &mut Dispatch,
    step: StepName,
    task_index: usize,
    outcome: TaskOutcome,
    commands: &mut Vec<CoreCommand>,
) {
    let result = scheduler.step_completion(&step, task_index, &outcome);
    commands.push(CoreCommand::RecordTask {
        step: step.clone(),
        task_index,
        outcome,
    });
    let reason = format!("upstream step '{step}' did not succeed");
    apply_scheduler_step(scheduler, dispatch, result, &reason, commands);
}

fn apply_scheduler_step(
    scheduler: &mut Scheduler,
    dispatch: &mut Dispatch,
    result: SchedulerStep,
    blocked_reason: &str,
    commands: &mut Vec<CoreCommand>,
) {
    for step in result.newly_blocked {
        commands.push(CoreCommand::SkipStep {
            step,
            reason: blocked_reason.to_string(),
        });
    }

    for scheduled in result.newly_scheduled {
        let Some(def) = scheduler.graph().step(&scheduled.name).cloned() else {
            warn!(step = %scheduled.name, "scheduled step missing from graph");
            continue;
        };
        match partition(&dispatch.job_id, &def, scheduled.task_count, &dispatch.workdir) {
            Ok(contexts) => {
                let tasks = contexts
                    .into_iter()
                    .map(|context| ScheduledTask {
                        context,
                        method: scheduled.entry,
                    })
                    .collect();
                route(scheduler, dispatch, tasks, commands);
            }
            Err(e) => {
                error!(step = %scheduled.name, error = %e, "cannot partition step");
                for index in 0..scheduled.task_count {
                    complete_task(
                        scheduler,
                        dispatch,
                        scheduled.name.clone(),
                        index,
                        TaskOutcome::Failed(e.to_string()),
                        commands,
                    );
                }
            }
        }
    }
}

/// Send ready tasks where the control state says they go.
fn route(
    scheduler: &mut Scheduler,
    dispatch: &mut Dispatch,
    tasks: Vec<ScheduledTask>,
    commands: &mut Vec<CoreCommand>,
) {
    if tasks.is_empty() {
        return;
    }
    match dispatch.control {
        Control::Active => {
            dispatch.in_flight += tasks.len();
            debug!(tasks = tasks.len(), in_flight = dispatch.in_flight, "dispatching tasks");
            commands.push(CoreCommand::DispatchTasks(tasks));
        }
        Control::Paused => {
            debug!(tasks = tasks.len(), "job paused; holding tasks");
            dispatch.held.extend(tasks);
        }
        Control::Stopping => {
            for task in tasks {
                let step = task.step().to_string();
                let index = task.task_index();
                complete_task(
                    scheduler,
                    dispatch,
                    step,
                    index,
                    TaskOutcome::Canceled("job canceled before the task started".to_string()),
                    commands,
                );
            }
        }
    }
}

fn finish_if_done(
    scheduler: &Scheduler,
    dispatch: &mut Dispatch,
    mut commands: Vec<CoreCommand>,
) -> CoreStep {
    if dispatch.finished {
        return CoreStep {
            commands,
            keep_running: false,
        };
    }
    if !scheduler.is_finished() || dispatch.in_flight > 0 {
        return CoreStep {
            commands,
            keep_running: true,
        };
    }

    dispatch.finished = true;
    if dispatch.control != Control::Stopping {
        let state = if scheduler.all_succeeded() {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        info!(job = %dispatch.job_id, %state, "all steps finished");
        commands.push(CoreCommand::FinishJob(state));
    } else {
        info!(job = %dispatch.job_id, "stopped job drained");
    }
    commands.push(CoreCommand::RequestExit);

    CoreStep {
        commands,
        keep_running: false,
    }
}
