// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::core::CoreRuntime;
use crate::engine::{CoreCommand, CoreStep, RuntimeEvent, RuntimeOptions, ScheduledTask, TaskOutcome};
use crate::errors::{EvalflowError, Result};
use crate::exec::{ExecutorBackend, TaskRequest};
use crate::job::state_machine::{JobAction, JobStateMachine};
use crate::job::{Job, TaskRecord};
use crate::types::{JobState, TaskStatus};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Drives the step scheduler of one job in response to `RuntimeEvent`s,
/// and delegates actual task execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels, polling the job store for external state changes, recording
/// task results and dispatching tasks to the executor.
///
/// The job must already be RUNNING when [`Runtime::run`] is called.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    machine: JobStateMachine,
    options: RuntimeOptions,
    observed: JobState,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("observed", &self.observed)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        machine: JobStateMachine,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            machine,
            options,
            observed: JobState::Running,
        }
    }

    /// Main event loop. Returns the job record as left by the run.
    ///
    /// - Seeds the run with the root steps.
    /// - Consumes `RuntimeEvent`s from `event_rx` and polls the store every
    ///   `poll_interval` for pause, resume and cancel requests.
    /// - Feeds both into the core runtime and executes the commands it
    ///   returns.
    pub async fn run(mut self) -> Result<Job> {
        let job_id = self.core.job_id().to_string();
        info!(job = %job_id, "job runtime started");

        let step = self.core.start();
        let mut keep_running = self.execute_step(step).await?;

        // `interval` panics on a zero period.
        let period = self.options.poll_interval.max(MIN_POLL_INTERVAL);
        let mut poll = tokio::time::interval(period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while keep_running {
            tokio::select! {
                event = self.event_rx.recv() => {
                    let Some(event) = event else {
                        warn!(job = %job_id, "runtime event channel closed; exiting");
                        break;
                    };
                    debug!(?event, "runtime received event");
                    let step = self.core.step(event);
                    keep_running = self.execute_step(step).await?;
                }
                _ = poll.tick() => {
                    if let Some(state) = self.poll_state()? {
                        debug!(job = %job_id, %state, "observed job state change");
                        let step = self.core.step(RuntimeEvent::StateObserved(state));
                        keep_running = self.execute_step(step).await?;
                    }
                }
            }
        }

        info!(job = %job_id, "job runtime exiting");
        self.load_job()
    }

    async fn execute_step(&mut self, step: CoreStep) -> Result<bool> {
        for command in step.commands {
            self.execute_command(command).await?;
        }
        Ok(step.keep_running)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        let job_id = self.core.job_id().to_string();
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
            }
            CoreCommand::RecordTaskStarted { step, task_index } => {
                self.machine.update_records(&job_id, |job| {
                    if let Some(task) = job.task_mut(&step, task_index) {
                        if task.status == TaskStatus::Pending {
                            task.mark_running();
                        }
                    }
                })?;
            }
            CoreCommand::RecordTask {
                step,
                task_index,
                outcome,
            } => {
                self.machine.update_records(&job_id, |job| {
                    if let Some(task) = job.task_mut(&step, task_index) {
                        record_outcome(task, &step, &outcome);
                    }
                })?;
            }
            CoreCommand::SkipStep { step, reason } => {
                info!(job = %job_id, step = %step, %reason, "skipping step");
                self.machine.update_records(&job_id, |job| {
                    if let Some(record) = job.step_mut(&step) {
                        for task in record.tasks.iter_mut() {
                            if !task.status.is_terminal() {
                                task.mark_canceled(reason.clone());
                            }
                        }
                    }
                })?;
            }
            CoreCommand::SignalCancel => {
                self.executor.signal_cancel();
            }
            CoreCommand::CancelJob => {
                self.transition_quietly(JobAction::Cancel)?;
            }
            CoreCommand::FinishJob(state) => {
                let action = if state == JobState::Succeeded {
                    JobAction::Succeed
                } else {
                    JobAction::Fail
                };
                self.transition_quietly(action)?;
            }
            CoreCommand::RequestExit => {
                debug!(job = %job_id, "core issued RequestExit command");
            }
        }
        Ok(())
    }

    /// Apply an engine-initiated transition. Losing to a concurrent external
    /// transition (e.g. a cancel that landed first) is logged, not fatal.
    fn transition_quietly(&mut self, action: JobAction) -> Result<()> {
        let job_id = self.core.job_id().to_string();
        match self.machine.transition(&job_id, action) {
            Ok(job) => {
                self.observed = job.state;
                Ok(())
            }
            Err(e @ EvalflowError::InvalidTransition { .. }) => {
                warn!(job = %job_id, %action, error = %e, "engine transition rejected");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let job = self.load_job()?;
        let requests: Vec<TaskRequest> = tasks
            .into_iter()
            .map(|task| {
                let upstream = job.upstream_results(self.core.dependencies_of(task.step()));
                TaskRequest {
                    task,
                    datasets: job.dataset_refs.clone(),
                    upstream,
                }
            })
            .collect();

        let names: Vec<String> = requests.iter().map(|r| r.task.context.to_string()).collect();
        debug!(job = %job.id, ?names, "spawning ready tasks");

        self.executor.spawn_ready_tasks(requests).await
    }

    fn poll_state(&mut self) -> Result<Option<JobState>> {
        let job = self.load_job()?;
        if job.state == self.observed {
            return Ok(None);
        }
        self.observed = job.state;
        Ok(Some(job.state))
    }

    fn load_job(&self) -> Result<Job> {
        let job_id = self.core.job_id();
        self.machine
            .store()
            .get(job_id)?
            .ok_or_else(|| EvalflowError::JobNotFound(job_id.to_string()))
    }
}

/// Write a task outcome into its record.
pub fn record_outcome(task: &mut TaskRecord, step: &str, outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::Succeeded(value) => task.mark_succeeded(value.clone()),
        TaskOutcome::Failed(cause) => task.mark_failed(cause.clone()),
        TaskOutcome::TimedOut(timeout) => task.mark_failed(
            EvalflowError::TaskTimeout {
                step: step.to_string(),
                task_index: task.task_index,
                timeout: *timeout,
            }
            .to_string(),
        ),
        TaskOutcome::Canceled(reason) => task.mark_canceled(reason.clone()),
    }
}
