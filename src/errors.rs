// src/errors.rs

//! Crate-wide error type, result alias and error classification.
//!
//! Every error the engine can surface is a variant of [`EvalflowError`].
//! [`EvalflowError::kind`] maps each variant onto the error taxonomy used by
//! the job view and the binary (definition / resolution / execution /
//! transition / lookup / input / internal), which in turn decides the process
//! exit code.

use std::time::Duration;

use thiserror::Error;

use crate::types::JobState;

#[derive(Error, Debug)]
pub enum EvalflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("step '{0}' is already registered")]
    DuplicateStep(String),

    #[error("step '{step}' needs unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("cyclic dependency detected in step graph involving step '{0}'")]
    CyclicDependency(String),

    #[error("invalid parallelism {parallelism} for step '{step}' (must be >= 1)")]
    InvalidParallelism { step: String, parallelism: usize },

    #[error("cannot resolve handler '{entry}' in {workdir}: {reason}")]
    HandlerResolution {
        entry: String,
        workdir: String,
        reason: String,
    },

    #[error("handler '{entry}' does not implement required method(s): {}", .missing.join(", "))]
    HandlerContract { entry: String, missing: Vec<String> },

    #[error("task {step}-{task_index} failed: {cause}")]
    TaskExecution {
        step: String,
        task_index: usize,
        cause: String,
    },

    #[error("task {step}-{task_index} timed out after {timeout:?}")]
    TaskTimeout {
        step: String,
        task_index: usize,
        timeout: Duration,
    },

    #[error("job {job}: cannot move from {from} to {to} (allowed from: {})", format_states(.allowed))]
    InvalidTransition {
        job: String,
        from: JobState,
        to: JobState,
        allowed: Vec<JobState>,
    },

    #[error("job {0} is not removed")]
    NotRemoved(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job reference '{reference}' is ambiguous, matches: {}", .candidates.join(", "))]
    AmbiguousJob {
        reference: String,
        candidates: Vec<String>,
    },

    #[error("invalid resource spec '{spec}': {reason}")]
    ResourceSpec { spec: String, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid page request: page={page}, size={size} (both must be >= 1)")]
    InvalidPage { page: usize, size: usize },

    #[error("job {job} in state {state} has no results to compare")]
    NotComparable { job: String, state: JobState },

    #[error("aborted: {0} was not confirmed")]
    Aborted(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("job {job} finished in state {state}")]
    JobFailed { job: String, state: JobState },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error taxonomy used for propagation and exit-code decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad step graph; surfaced before any task runs.
    Definition,
    /// Handler could not be resolved or violates the contract.
    Resolution,
    /// Failure inside a handler method (including timeouts).
    Execution,
    /// Rejected state-machine move.
    Transition,
    /// Unknown job / step / task.
    Lookup,
    /// Malformed user input or declined confirmation.
    Input,
    /// Anything else (IO, serialization, bugs).
    Internal,
}

impl EvalflowError {
    pub fn kind(&self) -> ErrorKind {
        use EvalflowError::*;
        match self {
            Config(_) | DuplicateStep(_) | UnknownDependency { .. } | CyclicDependency(_)
            | InvalidParallelism { .. } => ErrorKind::Definition,
            HandlerResolution { .. } | HandlerContract { .. } => ErrorKind::Resolution,
            TaskExecution { .. } | TaskTimeout { .. } | JobFailed { .. } => ErrorKind::Execution,
            InvalidTransition { .. } | NotRemoved(_) => ErrorKind::Transition,
            JobNotFound(_) | AmbiguousJob { .. } | NotComparable { .. } => ErrorKind::Lookup,
            ResourceSpec { .. } | InvalidInput(_) | InvalidPage { .. } | Aborted(_)
            | Unsupported(_) => ErrorKind::Input,
            Io(_) | Toml(_) | Json(_) | Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error was caused by the caller rather than by a handler
    /// or the engine itself.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Definition | ErrorKind::Transition | ErrorKind::Lookup | ErrorKind::Input
        )
    }

    /// Process exit code for this error: 2 for user errors, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_user_error() { 2 } else { 1 }
    }
}

fn format_states(states: &[JobState]) -> String {
    states
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EvalflowError>;
