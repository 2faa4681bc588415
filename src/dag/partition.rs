// src/dag/partition.rs

//! Task partitioner.
//!
//! Partitioning is purely structural: a step with parallelism `k` becomes `k`
//! contexts with indices `0..k`, all carrying `task_count = k`. Handlers that
//! need to shard data read `task_index`/`task_count` from their context and
//! compute their own slice.

use std::path::Path;

use crate::context::Context;
use crate::dag::registry::StepDef;
use crate::errors::{EvalflowError, Result};

/// Produce one context per task of `step`.
pub fn partition(
    job_id: &str,
    step: &StepDef,
    parallelism: usize,
    workdir: &Path,
) -> Result<Vec<Context>> {
    if parallelism < 1 {
        return Err(EvalflowError::InvalidParallelism {
            step: step.name.clone(),
            parallelism,
        });
    }

    (0..parallelism)
        .map(|index| Context::new(job_id, step.name.clone(), index, parallelism, workdir))
        .collect()
}

/// Partition a step using its declared `task_num`.
pub fn partition_step(job_id: &str, step: &StepDef, workdir: &Path) -> Result<Vec<Context>> {
    partition(job_id, step, step.task_num, workdir)
}
