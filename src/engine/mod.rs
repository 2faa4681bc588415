// src/engine/mod.rs

//! Job execution engine.
//!
//! This module ties together:
//! - the step scheduler
//! - the pause/cancel control state of a running job
//! - the runtime event loop that reacts to:
//!   - tasks starting and finishing
//!   - job state changes made by other processes (pause, resume, cancel)
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell that
//! records results in the job store and talks to the executor is
//! implemented in [`runtime`].

use std::time::Duration;

use serde_json::Value;

use crate::context::Context;
use crate::dag::StepName;
use crate::handler::HandlerMethod;
use crate::types::JobState;

/// How a single task ended, as far as the scheduler is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded(Value),
    Failed(String),
    TimedOut(Duration),
    /// Never ran, or stopped at a cancellation checkpoint.
    Canceled(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded(_))
    }
}

/// A task ready to be handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub context: Context,
    pub method: HandlerMethod,
}

impl ScheduledTask {
    pub fn step(&self) -> &str {
        self.context.step()
    }

    pub fn task_index(&self) -> usize {
        self.context.task_index()
    }
}

/// Runtime options used by the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// How often the persisted job state is re-read to notice pause, resume
    /// and cancel requests made elsewhere.
    pub poll_interval: Duration,
}

/// Events flowing into the runtime from the executor and the state poller.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// The executor actually started a task (after any concurrency wait).
    TaskStarted { step: StepName, task_index: usize },
    /// A task reached a terminal outcome.
    TaskFinished {
        step: StepName,
        task_index: usize,
        outcome: TaskOutcome,
    },
    /// The persisted job state changed.
    StateObserved(JobState),
    /// Graceful shutdown requested (e.g. Ctrl-C); treated as a cancel.
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use self::core::{Control, CoreRuntime};
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::{Runtime, record_outcome};
