// src/job/store.rs

//! Narrow persistence interface for job records.
//!
//! The engine needs get-by-id, list-with-filter-and-page and an atomic
//! compare-and-set on a job's state. Everything else (ordering, reference
//! resolution) is built on top of those primitives as provided methods.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use tracing::debug;

use crate::errors::{EvalflowError, Result};
use crate::job::page::{Page, PageRequest};
use crate::job::{Job, JobId};
use crate::types::JobState;

/// Shortest prefix accepted as a job reference.
pub const MIN_REFERENCE_LEN: usize = 4;

/// Listing filter.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only jobs of this project.
    pub project: Option<String>,
    /// Include removed jobs.
    pub show_removed: bool,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        if job.removed && !self.show_removed {
            return false;
        }
        match &self.project {
            Some(project) => &job.project == project,
            None => true,
        }
    }
}

pub trait JobStore: Send + Sync {
    /// Persist a new job. Fails if the id is taken.
    fn insert(&self, job: &Job) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<Job>>;

    /// Every stored job, in no particular order.
    fn all(&self) -> Result<Vec<Job>>;

    /// Replace the stored record with `job` only if the stored state still
    /// equals `expected` and the stored revision still equals `job.revision`.
    /// The stored copy gets the next revision. Returns `false` when another
    /// writer got there first.
    fn compare_and_set(&self, expected: JobState, job: &Job) -> Result<bool>;

    fn ids(&self) -> Result<Vec<JobId>> {
        Ok(self.all()?.into_iter().map(|j| j.id).collect())
    }

    /// Jobs matching `filter`, newest first (ties by id), paged.
    fn list(&self, filter: &JobFilter, page: PageRequest) -> Result<Page<Job>> {
        let mut jobs: Vec<Job> = self
            .all()?
            .into_iter()
            .filter(|j| filter.matches(j))
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(page.slice(&jobs))
    }

    /// Look a job up by full id or by a unique id prefix.
    fn resolve(&self, reference: &str) -> Result<Job> {
        let reference = reference.trim();
        if let Some(job) = self.get(reference)? {
            return Ok(job);
        }
        if reference.len() < MIN_REFERENCE_LEN {
            return Err(EvalflowError::JobNotFound(reference.to_string()));
        }

        let mut matches: Vec<Job> = self
            .all()?
            .into_iter()
            .filter(|j| j.id.starts_with(reference))
            .collect();
        match matches.len() {
            0 => Err(EvalflowError::JobNotFound(reference.to_string())),
            1 => Ok(matches.remove(0)),
            _ => {
                let mut candidates: Vec<String> = matches.into_iter().map(|j| j.id).collect();
                candidates.sort();
                Err(EvalflowError::AmbiguousJob {
                    reference: reference.to_string(),
                    candidates,
                })
            }
        }
    }
}

/// Process-local store, used by tests and `--store memory`.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<JobId, Job>>> {
        self.jobs
            .lock()
            .map_err(|_| EvalflowError::Other(anyhow!("job store lock poisoned")))
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: &Job) -> Result<()> {
        let mut jobs = self.lock()?;
        if jobs.contains_key(&job.id) {
            return Err(EvalflowError::InvalidInput(format!(
                "job {} already exists",
                job.id
            )));
        }
        debug!(job = %job.id, "inserted job");
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn all(&self) -> Result<Vec<Job>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn compare_and_set(&self, expected: JobState, job: &Job) -> Result<bool> {
        let mut jobs = self.lock()?;
        let current = jobs
            .get_mut(&job.id)
            .ok_or_else(|| EvalflowError::JobNotFound(job.id.clone()))?;
        if current.state != expected || current.revision != job.revision {
            return Ok(false);
        }
        *current = job.clone();
        current.revision += 1;
        Ok(true)
    }
}
