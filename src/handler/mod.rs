// src/handler/mod.rs

//! Pipeline handlers: the user code a job runs.
//!
//! A handler is any type implementing [`PipelineHandler`]. Handlers are made
//! available by registering them in a [`HandlerCatalog`] under an entry-point
//! name; a model workdir's `evalflow.toml` names the entry point to use.
//!
//! - [`catalog`] resolves entry points into typed [`HandlerFactory`]s and
//!   checks the capability contract.
//! - [`runner`] runs one handler method for one task inside a guarded scope
//!   that always tears the handler down.
//! - [`builtin`] ships the reference handlers.

pub mod builtin;
pub mod catalog;
pub mod runner;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::context::Context;
use crate::dag::StepName;

pub use catalog::{HandlerCatalog, HandlerEntry, HandlerFactory};

/// The handler methods a step can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerMethod {
    /// Per-shard inference/evaluation.
    Ppl,
    /// Aggregation/comparison over upstream results.
    Cmp,
}

impl HandlerMethod {
    pub const ALL: [HandlerMethod; 2] = [HandlerMethod::Ppl, HandlerMethod::Cmp];

    pub fn as_str(self) -> &'static str {
        match self {
            HandlerMethod::Ppl => "ppl",
            HandlerMethod::Cmp => "cmp",
        }
    }
}

impl fmt::Display for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for HandlerMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ppl" => Ok(HandlerMethod::Ppl),
            "cmp" => Ok(HandlerMethod::Cmp),
            other => Err(format!(
                "invalid handler method: {other} (expected \"ppl\" or \"cmp\")"
            )),
        }
    }
}

/// Recorded result of one task of a predecessor step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamTask {
    pub task_index: usize,
    /// `None` if the task has no recorded result.
    pub result: Option<Value>,
}

/// Results of predecessor steps, keyed by step name.
pub type UpstreamResults = BTreeMap<StepName, Vec<UpstreamTask>>;

/// Cooperative cancellation flag observed by handlers at their checkpoints.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Everything a handler method sees for one task.
#[derive(Debug, Clone)]
pub struct TaskInput {
    context: Context,
    datasets: Vec<String>,
    upstream: UpstreamResults,
    cancel: CancelSignal,
}

impl TaskInput {
    pub fn new(
        context: Context,
        datasets: Vec<String>,
        upstream: UpstreamResults,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            context,
            datasets,
            upstream,
            cancel,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Dataset references of the job, in submission order.
    pub fn datasets(&self) -> &[String] {
        &self.datasets
    }

    /// Results of one predecessor step. Empty if the step is not a
    /// predecessor.
    pub fn upstream(&self, step: &str) -> &[UpstreamTask] {
        self.upstream
            .get(step)
            .map(|tasks| tasks.as_slice())
            .unwrap_or(&[])
    }

    pub fn upstream_all(&self) -> &UpstreamResults {
        &self.upstream
    }

    /// Checkpoint: whether the job was asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Contract every pipeline handler fulfils.
///
/// Lifecycle per task: `construct` with the task's context, one method call,
/// then `teardown`, which runs on every exit path including failures and
/// panics inside the method.
pub trait PipelineHandler: Send {
    /// Methods this handler declares. Loading fails unless every
    /// [`HandlerMethod`] is listed.
    fn capabilities() -> &'static [HandlerMethod]
    where
        Self: Sized;

    fn construct(context: &Context) -> anyhow::Result<Self>
    where
        Self: Sized;

    fn ppl(&mut self, input: &TaskInput) -> anyhow::Result<Value>;

    fn cmp(&mut self, input: &TaskInput) -> anyhow::Result<Value>;

    /// Release handler resources.
    fn teardown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
