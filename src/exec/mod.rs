// src/exec/mod.rs

//! Task execution layer.
//!
//! This module is responsible for actually running handler methods for the
//! tasks the engine dispatches, and reporting back to the runtime via
//! `RuntimeEvent`s.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the production
//!   `HandlerExecutorBackend`, which tests can replace with a fake
//!   implementation.
//! - [`task_runner`] runs one task: concurrency permit, handler resolution,
//!   blocking invocation with optional timeout, outcome reporting.

pub mod backend;
pub mod task_runner;

use crate::engine::ScheduledTask;
use crate::handler::UpstreamResults;

pub use backend::{ExecutorBackend, HandlerExecutorBackend};
pub use task_runner::{TaskEnv, run_single_task};

/// A dispatched task together with the inputs it reads.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub task: ScheduledTask,
    /// Dataset references of the job.
    pub datasets: Vec<String>,
    /// Recorded results of the step's predecessors.
    pub upstream: UpstreamResults,
}
