// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::job::page::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
use crate::types::StoreKind;

/// Command-line arguments for `evalflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "evalflow",
    version,
    about = "Run and manage evaluation pipeline jobs.",
    long_about = None
)]
pub struct CliArgs {
    /// Directory holding the job store.
    ///
    /// If omitted, `EVALFLOW_ROOT`, then `~/.evalflow` is used.
    #[arg(long, value_name = "DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Job store backend.
    #[arg(long, value_enum, value_name = "KIND", default_value_t = StoreKind::File, global = true)]
    pub store: StoreKind,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `EVALFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Evaluation job management.
    #[command(subcommand)]
    Job(JobCommand),
}

#[derive(Debug, Clone, Subcommand)]
pub enum JobCommand {
    /// List jobs, newest first.
    List {
        /// Only jobs of this project.
        #[arg(long)]
        project: Option<String>,
        /// Show full job ids.
        #[arg(long)]
        fullname: bool,
        /// Include removed jobs.
        #[arg(long)]
        show_removed: bool,
        #[command(flatten)]
        page: PageArgs,
    },

    /// Create a job and run it.
    Run(RunArgs),

    /// Remove a job (reversible with `recover`).
    Remove(JobRef),

    /// Recover a removed job.
    Recover(JobRef),

    /// Pause a running job.
    Pause(JobRef),

    /// Resume a paused job.
    Resume(JobRef),

    /// Cancel a job.
    Cancel(JobRef),

    /// Show a job and a page of its tasks.
    Info {
        /// Job id or unique id prefix.
        job: String,
        #[command(flatten)]
        page: PageArgs,
    },

    /// Compare the results of jobs against a base job.
    Compare {
        /// Base job id or unique id prefix.
        base_job: String,
        /// Jobs to compare against the base.
        #[arg(required = true)]
        jobs: Vec<String>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct JobRef {
    /// Job id or unique id prefix.
    pub job: String,
    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, Args)]
pub struct PageArgs {
    /// 1-based page number.
    #[arg(long, default_value_t = DEFAULT_PAGE)]
    pub page: usize,
    /// Items per page.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub size: usize,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Project the job belongs to.
    #[arg(default_value = "self")]
    pub project: String,

    /// Model workdir containing `evalflow.toml`.
    #[arg(long, value_name = "DIR")]
    pub model: PathBuf,

    /// Dataset reference; repeat for several datasets.
    #[arg(long = "dataset", value_name = "REF", required = true)]
    pub datasets: Vec<String>,

    /// Runtime reference (container image for `--gencmd`).
    #[arg(long)]
    pub runtime: Option<String>,

    #[arg(long, default_value = "default")]
    pub name: String,

    #[arg(long = "desc")]
    pub description: Option<String>,

    /// Resources, e.g. `cpu:1,gpu:2`.
    #[arg(long, default_value = "cpu:1")]
    pub resource: String,

    /// Run inside a container.
    #[arg(long)]
    pub use_docker: bool,

    /// Print the container command instead of running.
    #[arg(long)]
    pub gencmd: bool,

    /// Run only this step.
    #[arg(long)]
    pub step: Option<String>,

    /// Task of `--step` to run.
    #[arg(long, default_value_t = 0)]
    pub task_index: usize,

    /// Job id to use (or continue).
    #[arg(long)]
    pub version: Option<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
