// src/config/validate.rs

use std::time::Duration;

use indexmap::IndexMap;

use crate::config::model::{ConfigFile, RawConfigFile, ResolvedStep, default_steps};
use crate::dag::{DagGraph, StepRegistry};
use crate::errors::{EvalflowError, Result};
use crate::handler::HandlerMethod;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = EvalflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_handler(&raw)?;

        let task_timeout = raw
            .config
            .task_timeout
            .as_deref()
            .map(|s| parse_config_duration("task_timeout", s))
            .transpose()?;
        let poll_interval = raw
            .config
            .poll_interval
            .as_deref()
            .map(|s| parse_config_duration("poll_interval", s))
            .transpose()?
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let steps = resolve_steps(raw.step)?;
        let cfg = ConfigFile::new_unchecked(raw.run, task_timeout, poll_interval, steps);

        // Compile the step graph once so definition errors surface at load time.
        let registry = StepRegistry::from_config(&cfg)?;
        DagGraph::build(&registry)?;

        Ok(cfg)
    }
}

fn ensure_has_handler(cfg: &RawConfigFile) -> Result<()> {
    if cfg.run.handler.trim().is_empty() {
        return Err(EvalflowError::Config(
            "[run].handler must name a pipeline handler".to_string(),
        ));
    }
    Ok(())
}

fn resolve_steps(
    raw_steps: IndexMap<String, crate::config::StepConfig>,
) -> Result<IndexMap<String, ResolvedStep>> {
    let raw_steps = if raw_steps.is_empty() {
        default_steps()
    } else {
        raw_steps
    };

    let mut steps = IndexMap::with_capacity(raw_steps.len());
    for (name, step) in raw_steps {
        let method_name = step.method.as_deref().unwrap_or(name.as_str());
        let method: HandlerMethod = method_name.parse().map_err(|e| {
            EvalflowError::Config(format!("[step.{name}]: {e}"))
        })?;

        if step.task_num == 0 {
            return Err(EvalflowError::InvalidParallelism {
                step: name,
                parallelism: 0,
            });
        }
        if step.concurrency == Some(0) {
            return Err(EvalflowError::Config(format!(
                "[step.{name}].concurrency must be >= 1 (got 0)"
            )));
        }

        steps.insert(
            name,
            ResolvedStep {
                method,
                needs: step.needs,
                task_num: step.task_num,
                concurrency: step.concurrency,
            },
        );
    }

    Ok(steps)
}

/// Both configurable durations must be non-zero.
fn parse_config_duration(key: &str, value: &str) -> Result<Duration> {
    let duration = parse_duration(value)
        .map_err(|e| EvalflowError::Config(format!("[config].{key}: {e}")))?;
    if duration.is_zero() {
        return Err(EvalflowError::Config(format!(
            "[config].{key} must be greater than zero (got '{value}')"
        )));
    }
    Ok(duration)
}

/// Parse a duration string such as `"500ms"`, `"30s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
