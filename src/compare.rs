// src/compare.rs

//! Cross-job result comparison.
//!
//! Rows are keyed by `(step, task_index)` and follow the base job's step and
//! task order. A task the other job does not have, or has no result for, is
//! reported as [`CellDiff::Missing`]; it never fails the comparison.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::dag::StepName;
use crate::errors::{EvalflowError, Result};
use crate::job::{Job, JobId, StepRecord};
use crate::types::JobState;

/// How one other job's result relates to the base result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellDiff {
    Same,
    Differs {
        value: Option<Value>,
        /// `other - base` when both results are numbers.
        delta: Option<f64>,
    },
    Missing,
}

impl CellDiff {
    pub fn is_missing(&self) -> bool {
        matches!(self, CellDiff::Missing)
    }

    pub fn is_different(&self) -> bool {
        matches!(self, CellDiff::Differs { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub task_index: usize,
    pub base_value: Option<Value>,
    /// One cell per other job, in the order the jobs were given.
    pub others: Vec<CellDiff>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepComparison {
    pub step: StepName,
    pub rows: Vec<ComparisonRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub state: JobState,
    pub compared: usize,
    pub identical: usize,
    pub differing: usize,
    pub missing: usize,
    pub mean_abs_delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub base_job_id: JobId,
    pub other_job_ids: Vec<JobId>,
    /// Some job was still running or paused; rows reflect what was recorded
    /// so far.
    pub partial: bool,
    pub steps: Vec<StepComparison>,
    pub summary: Vec<JobSummary>,
}

impl ComparisonReport {
    /// Rows where at least one other job differs from the base.
    pub fn differing_rows(&self) -> usize {
        self.rows().filter(|r| r.others.iter().any(CellDiff::is_different)).count()
    }

    /// Missing cells across all rows and jobs.
    pub fn missing_cells(&self) -> usize {
        self.rows()
            .map(|r| r.others.iter().filter(|c| c.is_missing()).count())
            .sum()
    }

    pub fn rows(&self) -> impl Iterator<Item = &ComparisonRow> {
        self.steps.iter().flat_map(|s| s.rows.iter())
    }

    /// The row for `(step, task_index)`, if the base job has that task.
    pub fn row(&self, step: &str, task_index: usize) -> Option<&ComparisonRow> {
        self.steps
            .iter()
            .find(|s| s.step == step)?
            .rows
            .iter()
            .find(|r| r.task_index == task_index)
    }
}

/// Compare `base` against every job in `others`.
///
/// Fails with `NotComparable` if any job has never run or is removed.
pub fn compare(base: &Job, others: &[Job]) -> Result<ComparisonReport> {
    for job in std::iter::once(base).chain(others.iter()) {
        ensure_comparable(job)?;
    }

    let partial = std::iter::once(base)
        .chain(others.iter())
        .any(|j| j.state.is_live());
    if partial {
        warn!(base = %base.id, "comparing jobs that are still running; report is partial");
    }

    let mut stats: Vec<DeltaStats> = vec![DeltaStats::default(); others.len()];
    let mut steps = Vec::with_capacity(base.steps.len());

    for base_step in base.steps.iter() {
        let other_steps: Vec<Option<&StepRecord>> =
            others.iter().map(|o| o.step(&base_step.step_name)).collect();

        let rows = base_step
            .tasks
            .iter()
            .map(|base_task| {
                let base_value = base_task.result.clone();
                let cells = other_steps
                    .iter()
                    .zip(stats.iter_mut())
                    .map(|(other_step, stat)| {
                        let other_value = other_step
                            .and_then(|s| s.task(base_task.task_index))
                            .map(|t| t.result.as_ref());
                        let cell = diff_cell(base_value.as_ref(), other_value);
                        stat.record(&cell);
                        cell
                    })
                    .collect();
                ComparisonRow {
                    task_index: base_task.task_index,
                    base_value,
                    others: cells,
                }
            })
            .collect();

        steps.push(StepComparison {
            step: base_step.step_name.clone(),
            rows,
        });
    }

    let summary = others
        .iter()
        .zip(stats)
        .map(|(job, stat)| stat.into_summary(job))
        .collect();

    Ok(ComparisonReport {
        base_job_id: base.id.clone(),
        other_job_ids: others.iter().map(|j| j.id.clone()).collect(),
        partial,
        steps,
        summary,
    })
}

fn ensure_comparable(job: &Job) -> Result<()> {
    if job.removed || matches!(job.state, JobState::Created | JobState::Removed) {
        return Err(EvalflowError::NotComparable {
            job: job.id.clone(),
            state: job.state,
        });
    }
    Ok(())
}

/// `other` is `None` when the other job lacks the task altogether, and
/// `Some(None)` when the task exists but has no recorded result.
fn diff_cell(base: Option<&Value>, other: Option<Option<&Value>>) -> CellDiff {
    let Some(other) = other else {
        return CellDiff::Missing;
    };
    match (base, other) {
        (None, None) => CellDiff::Same,
        (Some(_), None) => CellDiff::Missing,
        (Some(b), Some(o)) if b == o => CellDiff::Same,
        (b, Some(o)) => CellDiff::Differs {
            value: Some(o.clone()),
            delta: numeric_delta(b, o),
        },
    }
}

fn numeric_delta(base: Option<&Value>, other: &Value) -> Option<f64> {
    Some(other.as_f64()? - base?.as_f64()?)
}

#[derive(Debug, Clone, Default)]
struct DeltaStats {
    compared: usize,
    identical: usize,
    differing: usize,
    missing: usize,
    abs_delta_sum: f64,
    deltas: usize,
}

impl DeltaStats {
    fn record(&mut self, cell: &CellDiff) {
        self.compared += 1;
        match cell {
            CellDiff::Same => self.identical += 1,
            CellDiff::Missing => self.missing += 1,
            CellDiff::Differs { delta, .. } => {
                self.differing += 1;
                if let Some(d) = delta {
                    self.abs_delta_sum += d.abs();
                    self.deltas += 1;
                }
            }
        }
    }

    fn into_summary(self, job: &Job) -> JobSummary {
        JobSummary {
            job_id: job.id.clone(),
            state: job.state,
            compared: self.compared,
            identical: self.identical,
            differing: self.differing,
            missing: self.missing,
            mean_abs_delta: (self.deltas > 0).then(|| self.abs_delta_sum / self.deltas as f64),
        }
    }
}
