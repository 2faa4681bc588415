// src/lib.rs

pub mod cli;
pub mod compare;
pub mod config;
pub mod confirm;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod handler;
pub mod job;
pub mod logging;
pub mod render;
pub mod types;
pub mod view;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::cli::{CliArgs, Command, JobCommand, RunArgs};
use crate::confirm::{Prompter, StdinPrompter, require};
use crate::errors::Result;
use crate::handler::HandlerCatalog;
use crate::job::{FileJobStore, JobFilter, JobStore, MemoryJobStore, PageRequest};
use crate::types::StoreKind;
use crate::view::{JobView, RunRequest};

/// Environment variable naming the store root when `--root` is absent.
pub const ROOT_ENV: &str = "EVALFLOW_ROOT";

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - store selection
/// - the handler catalog
/// - the job view
/// - confirmation of destructive commands
/// - rendering of results
pub async fn run(args: CliArgs) -> Result<()> {
    let root = resolve_root(args.root.clone());
    let store = open_store(args.store, &root)?;
    debug!(root = %root.display(), store = ?args.store, "opened job store");

    let view = JobView::new(store, HandlerCatalog::with_builtins()).with_ctrl_c();
    let mut prompter = StdinPrompter;

    match args.command {
        Command::Job(cmd) => run_job_command(&view, &mut prompter, cmd).await,
    }
}

/// Execute one `job` subcommand against `view`.
pub async fn run_job_command(
    view: &JobView,
    prompter: &mut dyn Prompter,
    cmd: JobCommand,
) -> Result<()> {
    match cmd {
        JobCommand::List {
            project,
            fullname,
            show_removed,
            page,
        } => {
            let filter = JobFilter {
                project,
                show_removed,
            };
            let jobs = view.list(&filter, PageRequest::new(page.page, page.size)?)?;
            render::print_job_list(&jobs, fullname);
        }
        JobCommand::Run(args) => {
            let summary = view.run(run_request(args)).await?;
            render::print_run_summary(&summary);
            summary.ensure_success()?;
        }
        JobCommand::Remove(r) => {
            let job = view.store().resolve(&r.job)?;
            let confirmed = require(prompter, "remove", &job.id, r.force)?;
            let job = view.remove(&job.id, confirmed)?;
            let was = job
                .pre_removal_state
                .map(|s| s.to_string())
                .unwrap_or_default();
            println!("job {} removed (was {was})", job.id);
        }
        JobCommand::Recover(r) => {
            let job = view.recover(&r.job)?;
            println!("job {} recovered: {}", job.id, job.state);
        }
        JobCommand::Pause(r) => {
            let job = view.store().resolve(&r.job)?;
            let confirmed = require(prompter, "pause", &job.id, r.force)?;
            let job = view.pause(&job.id, confirmed)?;
            println!("job {} paused", job.id);
        }
        JobCommand::Resume(r) => {
            let job = view.resume(&r.job)?;
            println!("job {} resumed", job.id);
        }
        JobCommand::Cancel(r) => {
            let job = view.store().resolve(&r.job)?;
            let confirmed = require(prompter, "cancel", &job.id, r.force)?;
            let job = view.cancel(&job.id, confirmed)?;
            println!("job {} canceled", job.id);
        }
        JobCommand::Info { job, page } => {
            let info = view.info(&job, PageRequest::new(page.page, page.size)?)?;
            render::print_job_info(&info);
        }
        JobCommand::Compare { base_job, jobs } => {
            let report = view.compare(&base_job, &jobs)?;
            render::print_comparison(&report);
        }
    }
    Ok(())
}

fn run_request(args: RunArgs) -> RunRequest {
    RunRequest {
        project: args.project,
        model: args.model,
        datasets: args.datasets,
        runtime: args.runtime,
        name: args.name,
        description: args.description,
        resource: args.resource,
        use_docker: args.use_docker,
        gencmd: args.gencmd,
        step: args.step.filter(|s| !s.trim().is_empty()),
        task_index: args.task_index,
        version: args.version,
    }
}

/// `--root`, then `EVALFLOW_ROOT`, then `~/.evalflow`, then `./.evalflow`.
pub fn resolve_root(cli_root: Option<PathBuf>) -> PathBuf {
    if let Some(root) = cli_root {
        return root;
    }
    if let Some(root) = std::env::var_os(ROOT_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(root);
    }
    match std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        Some(home) => PathBuf::from(home).join(".evalflow"),
        None => PathBuf::from(".evalflow"),
    }
}

fn open_store(kind: StoreKind, root: &std::path::Path) -> Result<Arc<dyn JobStore>> {
    Ok(match kind {
        StoreKind::File => Arc::new(FileJobStore::open(root)?),
        StoreKind::Memory => Arc::new(MemoryJobStore::new()),
    })
}
