use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// `Created` is initial. `Succeeded`, `Failed` and `Canceled` are terminal for
/// normal execution. `Removed` is terminal unless the job is recovered, which
/// restores the state held immediately before removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Running,
    Paused,
    Succeeded,
    Failed,
    Canceled,
    Removed,
}

impl JobState {
    pub const ALL: [JobState; 7] = [
        JobState::Created,
        JobState::Running,
        JobState::Paused,
        JobState::Succeeded,
        JobState::Failed,
        JobState::Canceled,
        JobState::Removed,
    ];

    /// Terminal for normal execution (removal aside).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Canceled
        )
    }

    /// Whether tasks of a job in this state may still be executing.
    pub fn is_live(self) -> bool {
        matches!(self, JobState::Running | JobState::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "CREATED",
            JobState::Running => "RUNNING",
            JobState::Paused => "PAUSED",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Canceled => "CANCELED",
            JobState::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == upper)
            .ok_or_else(|| format!("invalid job state: {s}"))
    }
}

/// Status of a single task of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never ran to completion: the job was canceled or an upstream step did
    /// not succeed.
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Canceled => "CANCELED",
        };
        f.pad(s)
    }
}

/// Status of a step, derived from the statuses of its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl StepStatus {
    /// Derive a step status from its task statuses.
    ///
    /// - `Succeeded` iff every task succeeded.
    /// - `Running` while any task runs, or once some tasks are done while
    ///   others are still pending.
    /// - `Failed` once every task is terminal and at least one failed.
    /// - `Canceled` once every task is terminal, none failed and at least one
    ///   was canceled.
    /// - `Pending` until the first task starts.
    pub fn derive<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = TaskStatus>,
    {
        let mut total = 0usize;
        let mut pending = 0usize;
        let mut running = 0usize;
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for status in statuses {
            total += 1;
            match status {
                TaskStatus::Pending => pending += 1,
                TaskStatus::Running => running += 1,
                TaskStatus::Succeeded => succeeded += 1,
                TaskStatus::Failed => failed += 1,
                TaskStatus::Canceled => {}
            }
        }

        if total > 0 && succeeded == total {
            StepStatus::Succeeded
        } else if running > 0 {
            StepStatus::Running
        } else if pending == total {
            StepStatus::Pending
        } else if pending > 0 {
            StepStatus::Running
        } else if failed > 0 {
            StepStatus::Failed
        } else {
            StepStatus::Canceled
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Failed | StepStatus::Canceled
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Running => "RUNNING",
            StepStatus::Succeeded => "SUCCEEDED",
            StepStatus::Failed => "FAILED",
            StepStatus::Canceled => "CANCELED",
        };
        f.pad(s)
    }
}

/// Backend used to persist job records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// One JSON file per job under `<root>/jobs/`.
    File,
    /// In-process only (lost on exit).
    Memory,
}

impl Default for StoreKind {
    fn default() -> Self {
        StoreKind::File
    }
}
