// src/dag/registry.rs

//! Append-only table of pipeline steps.
//!
//! A registry is scoped to one job-definition load: it is filled by a single
//! initialisation pass (from a validated config, or programmatically in
//! tests) and then compiled into a [`DagGraph`](crate::dag::DagGraph). There
//! is no process-wide registry.

use tracing::debug;

use crate::config::ConfigFile;
use crate::config::model::{DEFAULT_CMP_STEP, DEFAULT_PPL_STEP};
use crate::errors::{EvalflowError, Result};
use crate::handler::HandlerMethod;

/// Canonical step name type.
pub type StepName = String;

/// A registered step: its name, the handler method it invokes, and what it
/// needs to run after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDef {
    pub name: StepName,
    pub entry: HandlerMethod,
    pub needs: Vec<StepName>,
    /// Number of tasks the step is partitioned into.
    pub task_num: usize,
    /// Concurrency hint: maximum tasks of this step running at once.
    pub concurrency: Option<usize>,
}

impl StepDef {
    pub fn new(name: impl Into<StepName>, entry: HandlerMethod) -> Self {
        Self {
            name: name.into(),
            entry,
            needs: Vec::new(),
            task_num: 1,
            concurrency: None,
        }
    }

    pub fn needs<I, S>(mut self, needs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepName>,
    {
        self.needs.extend(needs.into_iter().map(Into::into));
        self
    }

    pub fn task_num(mut self, task_num: usize) -> Self {
        self.task_num = task_num;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    steps: Vec<StepDef>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step. Fails if a step with the same name already exists.
    pub fn register(&mut self, step: StepDef) -> Result<()> {
        if self.get(&step.name).is_some() {
            return Err(EvalflowError::DuplicateStep(step.name));
        }

        debug!(
            step = %step.name,
            entry = %step.entry,
            needs = ?step.needs,
            task_num = step.task_num,
            "registered step"
        );
        self.steps.push(step);
        Ok(())
    }

    /// Registry holding the default pipeline: `ppl`, then `cmp` needing `ppl`.
    pub fn default_pipeline() -> Self {
        Self {
            steps: vec![
                StepDef::new(DEFAULT_PPL_STEP, HandlerMethod::Ppl),
                StepDef::new(DEFAULT_CMP_STEP, HandlerMethod::Cmp).needs([DEFAULT_PPL_STEP]),
            ],
        }
    }

    /// Populate a registry from the `[step.*]` tables of a config, in
    /// declaration order.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let mut registry = Self::new();
        for (name, step) in cfg.steps.iter() {
            let mut def = StepDef::new(name.clone(), step.method)
                .needs(step.needs.iter().cloned())
                .task_num(step.task_num);
            def.concurrency = step.concurrency;
            registry.register(def)?;
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Steps in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &StepDef> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
