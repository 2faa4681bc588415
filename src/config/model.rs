// src/config/model.rs

use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::handler::HandlerMethod;

/// Name of the default first step.
pub const DEFAULT_PPL_STEP: &str = "ppl";
/// Name of the default comparison step.
pub const DEFAULT_CMP_STEP: &str = "cmp";

/// Configuration exactly as read from `evalflow.toml`.
///
/// ```toml
/// [run]
/// handler = "builtin:line_stats"
///
/// [config]
/// task_timeout = "30s"
///
/// [step.ppl]
/// task_num = 2
///
/// [step.cmp]
/// needs = ["ppl"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub run: RunSection,

    #[serde(default)]
    pub config: ConfigSection,

    /// Step tables in declaration order.
    #[serde(default)]
    pub step: IndexMap<String, StepConfig>,
}

/// `[run]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    /// Entry-point name of the pipeline handler.
    pub handler: String,
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSection {
    /// Per-task timeout, e.g. `"30s"`. No timeout when absent.
    #[serde(default)]
    pub task_timeout: Option<String>,

    /// How often a running job re-reads its persisted state to notice
    /// pause/cancel requests. Defaults to `200ms`.
    #[serde(default)]
    pub poll_interval: Option<String>,
}

/// `[step.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepConfig {
    /// Handler method invoked by the step (`ppl` or `cmp`). Defaults to the
    /// step name.
    #[serde(default)]
    pub method: Option<String>,

    /// Steps that must finish before this one starts.
    #[serde(default)]
    pub needs: Vec<String>,

    /// Number of tasks the step is split into.
    #[serde(default = "default_task_num")]
    pub task_num: usize,

    /// Maximum number of tasks of this step running at once. Unlimited when
    /// absent.
    #[serde(default)]
    pub concurrency: Option<usize>,
}

fn default_task_num() -> usize {
    1
}

impl StepConfig {
    pub fn new(method: HandlerMethod) -> Self {
        Self {
            method: Some(method.as_str().to_string()),
            needs: Vec::new(),
            task_num: default_task_num(),
            concurrency: None,
        }
    }
}

/// Validated configuration.
///
/// Obtained through `ConfigFile::try_from(raw)` (see `validate.rs`), which
/// guarantees that durations and method names parse, and that the step graph
/// compiles.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub run: RunSection,
    pub task_timeout: Option<Duration>,
    pub poll_interval: Duration,
    /// Steps in declaration order, with defaults applied.
    pub steps: IndexMap<String, ResolvedStep>,
}

/// A step entry after method names have been resolved.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub method: HandlerMethod,
    pub needs: Vec<String>,
    pub task_num: usize,
    pub concurrency: Option<usize>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        run: RunSection,
        task_timeout: Option<Duration>,
        poll_interval: Duration,
        steps: IndexMap<String, ResolvedStep>,
    ) -> Self {
        Self {
            run,
            task_timeout,
            poll_interval,
            steps,
        }
    }
}

/// The default two-step pipeline: `ppl`, then `cmp` which needs `ppl`.
pub fn default_steps() -> IndexMap<String, StepConfig> {
    let mut steps = IndexMap::new();
    steps.insert(
        DEFAULT_PPL_STEP.to_string(),
        StepConfig::new(HandlerMethod::Ppl),
    );
    let mut cmp = StepConfig::new(HandlerMethod::Cmp);
    cmp.needs.push(DEFAULT_PPL_STEP.to_string());
    steps.insert(DEFAULT_CMP_STEP.to_string(), cmp);
    steps
}
