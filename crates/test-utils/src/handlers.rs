//! Pipeline handlers used by the integration tests.
//!
//! Handlers are constructed by the engine, so they report what happened to a
//! process-wide journal keyed by the model workdir. Every test uses its own
//! temp workdir, which keeps concurrently running tests apart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::bail;
use evalflow::context::Context;
use evalflow::handler::{HandlerCatalog, HandlerMethod, PipelineHandler, TaskInput};
use serde_json::{Value, json};

pub const RECORDING: &str = "test:recording";
pub const FAILING: &str = "test:failing";
pub const PANICKING: &str = "test:panicking";
pub const SLOW: &str = "test:slow";
pub const PPL_ONLY: &str = "test:ppl_only";

/// What the handlers of one workdir did.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    /// `"<method>:<step>-<index>"` per invocation, in call order.
    pub calls: Vec<String>,
    pub constructed: usize,
    pub teardowns: usize,
}

fn journals() -> &'static Mutex<HashMap<PathBuf, Journal>> {
    static JOURNALS: OnceLock<Mutex<HashMap<PathBuf, Journal>>> = OnceLock::new();
    JOURNALS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn key(workdir: &Path) -> PathBuf {
    workdir
        .canonicalize()
        .unwrap_or_else(|_| workdir.to_path_buf())
}

fn with_journal(workdir: &Path, f: impl FnOnce(&mut Journal)) {
    let mut all = journals().lock().expect("journal lock poisoned");
    f(all.entry(key(workdir)).or_default());
}

/// Snapshot of the journal of `workdir`.
pub fn journal(workdir: &Path) -> Journal {
    journals()
        .lock()
        .expect("journal lock poisoned")
        .get(&key(workdir))
        .cloned()
        .unwrap_or_default()
}

/// Built-in handlers plus every test handler.
pub fn test_catalog() -> HandlerCatalog {
    let mut catalog = HandlerCatalog::with_builtins();
    catalog.register::<RecordingHandler>(RECORDING).expect("register");
    catalog.register::<FailingHandler>(FAILING).expect("register");
    catalog.register::<PanickingHandler>(PANICKING).expect("register");
    catalog.register::<SlowHandler>(SLOW).expect("register");
    catalog.register::<PplOnlyHandler>(PPL_ONLY).expect("register");
    catalog
}

fn record_call(ctx: &Context, method: HandlerMethod) {
    let call = format!("{method}:{}-{}", ctx.step(), ctx.task_index());
    with_journal(ctx.workdir(), |j| j.calls.push(call));
}

fn record_construct(ctx: &Context) {
    with_journal(ctx.workdir(), |j| j.constructed += 1);
}

fn record_teardown(workdir: &Path) {
    with_journal(workdir, |j| j.teardowns += 1);
}

/// `ppl` returns `{"task": i, "count": n, "datasets": d}`; `cmp` returns
/// the number of upstream tasks and the sum of their `task` fields.
pub struct RecordingHandler {
    workdir: PathBuf,
}

impl PipelineHandler for RecordingHandler {
    fn capabilities() -> &'static [HandlerMethod] {
        &[HandlerMethod::Ppl, HandlerMethod::Cmp]
    }

    fn construct(context: &Context) -> anyhow::Result<Self> {
        record_construct(context);
        Ok(Self {
            workdir: context.workdir().to_path_buf(),
        })
    }

    fn ppl(&mut self, input: &TaskInput) -> anyhow::Result<Value> {
        let ctx = input.context();
        record_call(ctx, HandlerMethod::Ppl);
        Ok(json!({
            "task": ctx.task_index(),
            "count": ctx.task_count(),
            "datasets": input.datasets().len(),
        }))
    }

    fn cmp(&mut self, input: &TaskInput) -> anyhow::Result<Value> {
        record_call(input.context(), HandlerMethod::Cmp);
        let tasks: Vec<_> = input.upstream_all().values().flatten().collect();
        let sum: u64 = tasks
            .iter()
            .filter_map(|t| t.result.as_ref()?.get("task")?.as_u64())
            .sum();
        Ok(json!({ "upstream_tasks": tasks.len(), "task_sum": sum }))
    }

    fn teardown(&mut self) -> anyhow::Result<()> {
        record_teardown(&self.workdir);
        Ok(())
    }
}

/// `ppl` fails for task index 1 and succeeds otherwise.
pub struct FailingHandler {
    workdir: PathBuf,
}

impl PipelineHandler for FailingHandler {
    fn capabilities() -> &'static [HandlerMethod] {
        &[HandlerMethod::Ppl, HandlerMethod::Cmp]
    }

    fn construct(context: &Context) -> anyhow::Result<Self> {
        record_construct(context);
        Ok(Self {
            workdir: context.workdir().to_path_buf(),
        })
    }

    fn ppl(&mut self, input: &TaskInput) -> anyhow::Result<Value> {
        let ctx = input.context();
        record_call(ctx, HandlerMethod::Ppl);
        if ctx.task_index() == 1 {
            bail!("shard {} is corrupt", ctx.task_index());
        }
        Ok(json!(ctx.task_index()))
    }

    fn cmp(&mut self, input: &TaskInput) -> anyhow::Result<Value> {
        record_call(input.context(), HandlerMethod::Cmp);
        Ok(json!("compared"))
    }

    fn teardown(&mut self) -> anyhow::Result<()> {
        record_teardown(&self.workdir);
        Ok(())
    }
}

/// `ppl` panics; `cmp` succeeds.
pub struct PanickingHandler {
    workdir: PathBuf,
}

impl PipelineHandler for PanickingHandler {
    fn capabilities() -> &'static [HandlerMethod] {
        &[HandlerMethod::Ppl, HandlerMethod::Cmp]
    }

    fn construct(context: &Context) -> anyhow::Result<Self> {
        record_construct(context);
        Ok(Self {
            workdir: context.workdir().to_path_buf(),
        })
    }

    fn ppl(&mut self, input: &TaskInput) -> anyhow::Result<Value> {
        record_call(input.context(), HandlerMethod::Ppl);
        panic!("model exploded");
    }

    fn cmp(&mut self, input: &TaskInput) -> anyhow::Result<Value> {
        record_call(input.context(), HandlerMethod::Cmp);
        Ok(json!("compared"))
    }

    fn teardown(&mut self) -> anyhow::Result<()> {
        record_teardown(&self.workdir);
        Ok(())
    }
}

/// `ppl` works for up to two seconds, checking for cancellation every few
/// milliseconds; `cmp` returns immediately.
pub struct SlowHandler {
    workdir: PathBuf,
}

pub const SLOW_PPL_FOR: Duration = Duration::from_secs(2);

impl PipelineHandler for SlowHandler {
    fn capabilities() -> &'static [HandlerMethod] {
        &[HandlerMethod::Ppl, HandlerMethod::Cmp]
    }

    fn construct(context: &Context) -> anyhow::Result<Self> {
        record_construct(context);
        Ok(Self {
            workdir: context.workdir().to_path_buf(),
        })
    }

    fn ppl(&mut self, input: &TaskInput) -> anyhow::Result<Value> {
        let ctx = input.context();
        record_call(ctx, HandlerMethod::Ppl);
        let started = Instant::now();
        while started.elapsed() < SLOW_PPL_FOR {
            if input.is_cancelled() {
                bail!("stopped at checkpoint");
            }
            thread::sleep(Duration::from_millis(5));
        }
        Ok(json!(ctx.task_index()))
    }

    fn cmp(&mut self, input: &TaskInput) -> anyhow::Result<Value> {
        record_call(input.context(), HandlerMethod::Cmp);
        Ok(json!("done"))
    }

    fn teardown(&mut self) -> anyhow::Result<()> {
        record_teardown(&self.workdir);
        Ok(())
    }
}

/// Declares `ppl` only, so it never satisfies the handler contract.
pub struct PplOnlyHandler;

impl PipelineHandler for PplOnlyHandler {
    fn capabilities() -> &'static [HandlerMethod] {
        &[HandlerMethod::Ppl]
    }

    fn construct(_context: &Context) -> anyhow::Result<Self> {
        Ok(Self)
    }

    fn ppl(&mut self, input: &TaskInput) -> anyhow::Result<Value> {
        Ok(json!(input.context().task_index()))
    }

    fn cmp(&mut self, _input: &TaskInput) -> anyhow::Result<Value> {
        anyhow::bail!("cmp is not supported")
    }
}
