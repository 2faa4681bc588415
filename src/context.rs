// src/context.rs

//! Per-task addressing record.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{EvalflowError, Result};

/// Identifies one task invocation: which job, which step, which index out of
/// how many, and where the model workdir lives.
///
/// Contexts are produced by the partitioner right before a task is invoked,
/// are immutable, and are passed by value. They never own any job state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    job_id: String,
    step: String,
    task_index: usize,
    task_count: usize,
    workdir: PathBuf,
}

impl Context {
    /// Build a context, enforcing `task_count >= 1` and
    /// `task_index < task_count`.
    pub fn new(
        job_id: impl Into<String>,
        step: impl Into<String>,
        task_index: usize,
        task_count: usize,
        workdir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let step = step.into();
        if task_count == 0 {
            return Err(EvalflowError::InvalidParallelism {
                step,
                parallelism: task_count,
            });
        }
        if task_index >= task_count {
            return Err(EvalflowError::InvalidInput(format!(
                "task index {task_index} out of range for step '{step}' with {task_count} task(s)"
            )));
        }

        Ok(Self {
            job_id: job_id.into(),
            step,
            task_index,
            task_count,
            workdir: workdir.into(),
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn task_index(&self) -> usize {
        self.task_index
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} ({}/{})",
            self.step,
            self.task_index,
            self.task_index + 1,
            self.task_count
        )
    }
}
