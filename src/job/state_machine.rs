// src/job/state_machine.rs

//! Job lifecycle.
//!
//! ```text
//! run      CREATED                                   -> RUNNING
//! pause    RUNNING                                   -> PAUSED
//! resume   PAUSED                                    -> RUNNING
//! cancel   CREATED | RUNNING | PAUSED                -> CANCELED
//! remove   every state but RUNNING and REMOVED       -> REMOVED
//! recover  REMOVED                                   -> state before removal
//! succeed  RUNNING | PAUSED                          -> SUCCEEDED   (engine)
//! fail     RUNNING | PAUSED                          -> FAILED      (engine)
//! ```
//!
//! [`apply`] is pure: it validates a move and returns the next record without
//! touching the original. [`JobStateMachine`] persists moves through the
//! store's compare-and-set, so a rejected or lost race never leaves a
//! partially applied record behind.

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, info};

use crate::errors::{EvalflowError, Result};
use crate::job::Job;
use crate::job::store::JobStore;
use crate::types::JobState;

const MAX_CAS_ATTEMPTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Run,
    Pause,
    Resume,
    Cancel,
    Remove,
    Recover,
    Succeed,
    Fail,
}

impl JobAction {
    pub const ALL: [JobAction; 8] = [
        JobAction::Run,
        JobAction::Pause,
        JobAction::Resume,
        JobAction::Cancel,
        JobAction::Remove,
        JobAction::Recover,
        JobAction::Succeed,
        JobAction::Fail,
    ];

    /// Source states from which the action is legal.
    pub fn allowed_from(self) -> &'static [JobState] {
        use JobState::*;
        match self {
            JobAction::Run => &[Created],
            JobAction::Pause => &[Running],
            JobAction::Resume => &[Paused],
            JobAction::Cancel => &[Created, Running, Paused],
            JobAction::Remove => &[Created, Paused, Succeeded, Failed, Canceled],
            JobAction::Recover => &[Removed],
            JobAction::Succeed | JobAction::Fail => &[Running, Paused],
        }
    }

    /// Fixed target state. `None` for recover, whose target depends on the
    /// job's history.
    pub fn target(self) -> Option<JobState> {
        match self {
            JobAction::Run | JobAction::Resume => Some(JobState::Running),
            JobAction::Pause => Some(JobState::Paused),
            JobAction::Cancel => Some(JobState::Canceled),
            JobAction::Remove => Some(JobState::Removed),
            JobAction::Recover => None,
            JobAction::Succeed => Some(JobState::Succeeded),
            JobAction::Fail => Some(JobState::Failed),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobAction::Run => "run",
            JobAction::Pause => "pause",
            JobAction::Resume => "resume",
            JobAction::Cancel => "cancel",
            JobAction::Remove => "remove",
            JobAction::Recover => "recover",
            JobAction::Succeed => "succeed",
            JobAction::Fail => "fail",
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Validate `action` against `job` and return the resulting record.
pub fn apply(job: &Job, action: JobAction) -> Result<Job> {
    let from = job.state;

    if action == JobAction::Recover {
        if from != JobState::Removed {
            return Err(EvalflowError::NotRemoved(job.id.clone()));
        }
        let restored = job.pre_removal_state.ok_or_else(|| {
            EvalflowError::Other(anyhow!(
                "job {} is removed but has no recorded pre-removal state",
                job.id
            ))
        })?;
        let mut next = job.clone();
        next.state = restored;
        next.pre_removal_state = None;
        next.removed = false;
        next.updated_at = Utc::now();
        return Ok(next);
    }

    let allowed = action.allowed_from();
    // Every action except recover has a fixed target.
    let to = action.target().unwrap_or(from);
    if !allowed.contains(&from) {
        return Err(EvalflowError::InvalidTransition {
            job: job.id.clone(),
            from,
            to,
            allowed: allowed.to_vec(),
        });
    }

    let now = Utc::now();
    let mut next = job.clone();
    next.state = to;
    next.updated_at = now;
    if action == JobAction::Remove {
        next.pre_removal_state = Some(from);
        next.removed = true;
    }
    if to.is_terminal() {
        next.finished_at = Some(now);
    }
    Ok(next)
}

/// Serialises every state and record mutation of a job through the store's
/// compare-and-set.
#[derive(Clone)]
pub struct JobStateMachine {
    store: Arc<dyn JobStore>,
}

impl fmt::Debug for JobStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobStateMachine").finish_non_exhaustive()
    }
}

impl JobStateMachine {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    fn load(&self, id: &str) -> Result<Job> {
        self.store
            .get(id)?
            .ok_or_else(|| EvalflowError::JobNotFound(id.to_string()))
    }

    /// Apply `action` to job `id` and persist the result.
    ///
    /// A rejected move leaves the stored job untouched.
    pub fn transition(&self, id: &str, action: JobAction) -> Result<Job> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.load(id)?;
            let mut next = apply(&current, action)?;
            if self.store.compare_and_set(current.state, &next)? {
                next.revision = current.revision + 1;
                info!(
                    job = %id,
                    %action,
                    from = %current.state,
                    to = %next.state,
                    "job state changed"
                );
                return Ok(next);
            }
            debug!(job = %id, %action, "lost compare-and-set race; retrying");
        }
        Err(EvalflowError::Other(anyhow!(
            "job {id}: too much contention applying {action}"
        )))
    }

    /// Mutate the step/task records of job `id` without changing its state.
    ///
    /// `f` may run more than once when other writers interleave; it must be
    /// idempotent with respect to the record it is given.
    pub fn update_records<F>(&self, id: &str, mut f: F) -> Result<Job>
    where
        F: FnMut(&mut Job),
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.load(id)?;
            let mut next = current.clone();
            f(&mut next);
            next.state = current.state;
            next.updated_at = Utc::now();
            if self.store.compare_and_set(current.state, &next)? {
                next.revision = current.revision + 1;
                return Ok(next);
            }
            debug!(job = %id, "lost compare-and-set race on record update; retrying");
        }
        Err(EvalflowError::Other(anyhow!(
            "job {id}: too much contention updating task records"
        )))
    }
}
