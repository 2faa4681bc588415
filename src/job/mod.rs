// src/job/mod.rs

//! Jobs: records, lifecycle and persistence.
//!
//! - [`resource`]: the `name:count` resource grammar.
//! - [`page`]: 1-based pagination.
//! - [`state_machine`]: validated lifecycle transitions.
//! - [`store`]: the narrow persistence interface plus an in-memory store.
//! - [`file_store`]: JSON-file-backed store.

pub mod file_store;
pub mod page;
pub mod resource;
pub mod state_machine;
pub mod store;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dag::{DagGraph, StepName, partition_step};
use crate::errors::{EvalflowError, Result};
use crate::handler::{HandlerMethod, UpstreamResults, UpstreamTask};
use crate::types::{JobState, StepStatus, TaskStatus};

pub use file_store::FileJobStore;
pub use page::{Page, PageRequest};
pub use resource::{Resource, ResourceRequest};
pub use state_machine::{JobAction, JobStateMachine};
pub use store::{JobFilter, JobStore, MemoryJobStore};

pub type JobId = String;

/// Number of id characters shown when full names are not requested.
pub const SHORT_ID_LEN: usize = 12;

/// Generate a fresh job id.
pub fn new_job_id() -> JobId {
    Uuid::new_v4().simple().to_string()
}

/// Caller-chosen ids end up in file names, so only `[A-Za-z0-9_-]` is
/// accepted.
pub fn validate_job_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(EvalflowError::InvalidInput(format!(
            "invalid job id '{id}': use letters, digits, '_' or '-'"
        )))
    }
}

/// What a caller supplies to create a job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Explicit id; a fresh one is generated when absent.
    pub id: Option<JobId>,
    pub project: String,
    pub name: String,
    pub description: Option<String>,
    pub model_ref: String,
    pub workdir: PathBuf,
    pub dataset_refs: Vec<String>,
    pub runtime_ref: Option<String>,
    pub resources: ResourceRequest,
}

/// One end-to-end run of the step DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub project: String,
    pub name: String,
    pub description: Option<String>,
    pub model_ref: String,
    pub workdir: PathBuf,
    pub dataset_refs: Vec<String>,
    pub runtime_ref: Option<String>,
    pub resources: ResourceRequest,
    pub state: JobState,
    /// State held immediately before removal; restored by recover.
    #[serde(default)]
    pub pre_removal_state: Option<JobState>,
    #[serde(default)]
    pub removed: bool,
    /// Step records in execution order.
    pub steps: Vec<StepRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Bumped by the store on every successful write.
    #[serde(default)]
    pub revision: u64,
}

impl Job {
    /// Create a job in `CREATED` with one pending task record per partition
    /// of every step, steps in execution order.
    pub fn new(spec: JobSpec, graph: &DagGraph) -> Result<Self> {
        if spec.dataset_refs.is_empty() {
            return Err(EvalflowError::InvalidInput(
                "at least one dataset is required".to_string(),
            ));
        }

        let id = match spec.id {
            Some(id) => {
                validate_job_id(&id)?;
                id
            }
            None => new_job_id(),
        };
        let mut steps = Vec::with_capacity(graph.len());
        for def in graph.order() {
            let contexts = partition_step(&id, def, &spec.workdir)?;
            steps.push(StepRecord {
                step_name: def.name.clone(),
                method: def.entry,
                needs: graph.dependencies_of(&def.name).to_vec(),
                tasks: contexts
                    .iter()
                    .map(|ctx| TaskRecord::pending(ctx.task_index()))
                    .collect(),
            });
        }

        let now = Utc::now();
        Ok(Self {
            id,
            project: spec.project,
            name: spec.name,
            description: spec.description,
            model_ref: spec.model_ref,
            workdir: spec.workdir,
            dataset_refs: spec.dataset_refs,
            runtime_ref: spec.runtime_ref,
            resources: spec.resources,
            state: JobState::Created,
            pre_removal_state: None,
            removed: false,
            steps,
            created_at: now,
            updated_at: now,
            finished_at: None,
            revision: 0,
        })
    }

    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(SHORT_ID_LEN);
        &self.id[..end]
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step_name == name)
    }

    pub fn step_mut(&mut self, name: &str) -> Option<&mut StepRecord> {
        self.steps.iter_mut().find(|s| s.step_name == name)
    }

    pub fn task(&self, step: &str, task_index: usize) -> Option<&TaskRecord> {
        self.step(step)?.task(task_index)
    }

    pub fn task_mut(&mut self, step: &str, task_index: usize) -> Option<&mut TaskRecord> {
        self.step_mut(step)?
            .tasks
            .iter_mut()
            .find(|t| t.task_index == task_index)
    }

    /// Flattened `(step, task)` rows in execution order.
    pub fn task_rows(&self) -> Vec<TaskRow> {
        self.steps
            .iter()
            .flat_map(|step| {
                step.tasks.iter().map(move |task| TaskRow {
                    step_name: step.step_name.clone(),
                    task: task.clone(),
                })
            })
            .collect()
    }

    /// Recorded results of the given predecessor steps.
    pub fn upstream_results(&self, needs: &[StepName]) -> UpstreamResults {
        needs
            .iter()
            .filter_map(|name| {
                let step = self.step(name)?;
                let tasks = step
                    .tasks
                    .iter()
                    .map(|t| UpstreamTask {
                        task_index: t.task_index,
                        result: t.result.clone(),
                    })
                    .collect();
                Some((name.clone(), tasks))
            })
            .collect()
    }

    /// Every step succeeded.
    pub fn all_steps_succeeded(&self) -> bool {
        self.steps
            .iter()
            .all(|s| s.status() == StepStatus::Succeeded)
    }

    /// Every task has a terminal status.
    pub fn all_tasks_terminal(&self) -> bool {
        self.steps
            .iter()
            .flat_map(|s| s.tasks.iter())
            .all(|t| t.status.is_terminal())
    }
}

/// A task row as shown by `info`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub step_name: StepName,
    pub task: TaskRecord,
}

/// Execution record of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_name: StepName,
    pub method: HandlerMethod,
    pub needs: Vec<StepName>,
    pub tasks: Vec<TaskRecord>,
}

impl StepRecord {
    /// Status derived from the task statuses.
    pub fn status(&self) -> StepStatus {
        StepStatus::derive(self.tasks.iter().map(|t| t.status))
    }

    pub fn task(&self, task_index: usize) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.task_index == task_index)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Execution record of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_index: usize,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn pending(task_index: usize) -> Self {
        Self {
            task_index,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.result = None;
        self.error = None;
    }

    pub fn mark_succeeded(&mut self, result: Value) {
        self.status = TaskStatus::Succeeded;
        self.result = Some(result);
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_canceled(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Canceled;
        self.error = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }
}
