// src/handler/builtin.rs

//! Built-in reference handlers.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use serde_json::{Value, json};
use tracing::debug;

use crate::context::Context;
use crate::handler::{HandlerMethod, PipelineHandler, TaskInput};

/// Entry-point name of [`LineStatsHandler`].
pub const LINE_STATS_ENTRY: &str = "builtin:line_stats";

/// Counts lines of the dataset files.
///
/// - `ppl`: every dataset reference (file or directory, relative to the
///   workdir unless absolute) expands to a sorted file list; task `i` of `n`
///   takes files `i, i + n, i + 2n, ...` and reports
///   `{"files": <count>, "lines": <count>}`.
/// - `cmp`: sums the `files`/`lines` of every upstream task result and
///   reports how many upstream tasks had no result.
#[derive(Debug)]
pub struct LineStatsHandler {
    workdir: PathBuf,
}

impl PipelineHandler for LineStatsHandler {
    fn capabilities() -> &'static [HandlerMethod] {
        &[HandlerMethod::Ppl, HandlerMethod::Cmp]
    }

    fn construct(context: &Context) -> anyhow::Result<Self> {
        Ok(Self {
            workdir: context.workdir().to_path_buf(),
        })
    }

    fn ppl(&mut self, input: &TaskInput) -> anyhow::Result<Value> {
        let ctx = input.context();
        let mut files = Vec::new();
        for dataset in input.datasets() {
            let path = resolve(&self.workdir, dataset);
            collect_files(&path, &mut files)
                .with_context(|| format!("reading dataset {}", path.display()))?;
        }
        files.sort();

        let mut file_count = 0u64;
        let mut line_count = 0u64;
        for path in files
            .iter()
            .skip(ctx.task_index())
            .step_by(ctx.task_count())
        {
            if input.is_cancelled() {
                bail!("canceled");
            }
            let contents = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            file_count += 1;
            line_count += contents.lines().count() as u64;
        }

        debug!(task = %ctx, files = file_count, lines = line_count, "line stats computed");
        Ok(json!({ "files": file_count, "lines": line_count }))
    }

    fn cmp(&mut self, input: &TaskInput) -> anyhow::Result<Value> {
        let mut files = 0u64;
        let mut lines = 0u64;
        let mut tasks = 0u64;
        let mut missing = 0u64;

        for upstream in input.upstream_all().values() {
            for task in upstream {
                tasks += 1;
                match &task.result {
                    Some(result) => {
                        files += result.get("files").and_then(Value::as_u64).unwrap_or(0);
                        lines += result.get("lines").and_then(Value::as_u64).unwrap_or(0);
                    }
                    None => missing += 1,
                }
            }
        }

        Ok(json!({
            "files": files,
            "lines": lines,
            "tasks": tasks,
            "missing_tasks": missing,
        }))
    }
}

fn resolve(workdir: &Path, reference: &str) -> PathBuf {
    let path = Path::new(reference);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workdir.join(path)
    }
}

fn collect_files(path: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    if path.is_file() {
        out.push(path.to_path_buf());
        return Ok(());
    }
    if !path.is_dir() {
        bail!("{} is neither a file nor a directory", path.display());
    }
    for entry in fs::read_dir(path)? {
        let entry_path = entry?.path();
        collect_files(&entry_path, out)?;
    }
    Ok(())
}
