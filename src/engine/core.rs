// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels and polling the job store
//! - recording task results through the job state machine
//! - sending `ScheduledTask`s to the executor
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or handlers.

use std::path::PathBuf;

use crate::dag::{Scheduler, StepName};
use crate::engine::event_handlers::{
    CoreStep, handle_shutdown, handle_state_observed, handle_task_finished,
    handle_task_started, start_run,
};
use crate::engine::{RuntimeEvent, ScheduledTask};

/// Whether newly ready tasks may be handed to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Dispatch as soon as ready.
    Active,
    /// Hold ready tasks until resumed; in-flight tasks finish normally.
    Paused,
    /// The job was canceled or removed; nothing new starts.
    Stopping,
}

/// Per-run dispatch bookkeeping shared by the event handlers.
#[derive(Debug)]
pub struct Dispatch {
    pub job_id: String,
    pub workdir: PathBuf,
    pub control: Control,
    /// Ready tasks held back while paused.
    pub held: Vec<ScheduledTask>,
    /// Tasks handed to the executor that have not finished yet.
    pub in_flight: usize,
    /// The run reached its end and the exit commands were issued.
    pub finished: bool,
}

/// Pure core runtime state.
///
/// This owns:
/// - the step scheduler
/// - the dispatch bookkeeping (control state, held tasks, in-flight count)
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    dispatch: Dispatch,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, job_id: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            scheduler,
            dispatch: Dispatch {
                job_id: job_id.into(),
                workdir: workdir.into(),
                control: Control::Active,
                held: Vec::new(),
                in_flight: 0,
                finished: false,
            },
        }
    }

    pub fn job_id(&self) -> &str {
        &self.dispatch.job_id
    }

    pub fn control(&self) -> Control {
        self.dispatch.control
    }

    pub fn in_flight(&self) -> usize {
        self.dispatch.in_flight
    }

    /// Number of ready tasks held back by a pause.
    pub fn held(&self) -> usize {
        self.dispatch.held.len()
    }

    pub fn is_finished(&self) -> bool {
        self.dispatch.finished
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn dependencies_of(&self, step: &str) -> &[StepName] {
        self.scheduler.graph().dependencies_of(step)
    }

    /// Seed the run: schedule every root step.
    pub fn start(&mut self) -> CoreStep {
        start_run(&mut self.scheduler, &mut self.dispatch)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskStarted { step, task_index } => {
                handle_task_started(&self.dispatch, step, task_index)
            }
            RuntimeEvent::TaskFinished {
                step,
                task_index,
                outcome,
            } => handle_task_finished(
                &mut self.scheduler,
                &mut self.dispatch,
                step,
                task_index,
                outcome,
            ),
            RuntimeEvent::StateObserved(state) => {
                handle_state_observed(&mut self.scheduler, &mut self.dispatch, state)
            }
            RuntimeEvent::ShutdownRequested => {
                handle_shutdown(&mut self.scheduler, &mut self.dispatch)
            }
        }
    }
}
