// src/view.rs

//! Job view: the top-level operations behind `evalflow job ...`.
//!
//! Each operation resolves its job reference, goes through the job state
//! machine, and returns plain data; rendering happens in [`crate::render`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::compare::{ComparisonReport, compare};
use crate::config::{ConfigFile, load_from_workdir};
use crate::confirm::Confirmed;
use crate::context::Context;
use crate::dag::{DagGraph, Scheduler, StepName, StepRegistry};
use crate::engine::{
    CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, ScheduledTask, record_outcome,
};
use crate::errors::{EvalflowError, Result};
use crate::exec::{HandlerExecutorBackend, TaskEnv, TaskRequest, run_single_task};
use crate::handler::{HandlerCatalog, HandlerMethod};
use crate::job::state_machine::{JobAction, JobStateMachine};
use crate::job::{
    Job, JobFilter, JobSpec, JobStore, Page, PageRequest, ResourceRequest, TaskRow,
};
use crate::types::{JobState, StepStatus, TaskStatus};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const CONTAINER_MODEL_DIR: &str = "/opt/evalflow/model";
const CONTAINER_ROOT_DIR: &str = "/opt/evalflow/root";
const DEFAULT_IMAGE: &str = "evalflow:latest";

/// Arguments of `job run`.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub project: String,
    /// Model workdir holding `evalflow.toml`.
    pub model: PathBuf,
    pub datasets: Vec<String>,
    pub runtime: Option<String>,
    pub name: String,
    pub description: Option<String>,
    /// Resource spec text, e.g. `cpu:1,gpu:2`.
    pub resource: String,
    pub use_docker: bool,
    pub gencmd: bool,
    /// Run only this step's task `task_index`.
    pub step: Option<StepName>,
    pub task_index: usize,
    /// Use this as the job id; an existing job with that id is reused.
    pub version: Option<String>,
}

/// What `job run` did.
#[derive(Debug, Clone)]
pub enum RunSummary {
    /// `--gencmd`: the container command line, nothing ran.
    Command(String),
    /// Full DAG run; the job as it ended.
    Job(Job),
    /// Single-task run.
    Task {
        job: Job,
        step: StepName,
        task_index: usize,
    },
}

impl RunSummary {
    /// Turn an unsuccessful run into the error the caller should see.
    pub fn ensure_success(&self) -> Result<()> {
        match self {
            RunSummary::Command(_) => Ok(()),
            RunSummary::Job(job) => {
                if job.state == JobState::Succeeded {
                    Ok(())
                } else {
                    Err(EvalflowError::JobFailed {
                        job: job.id.clone(),
                        state: job.state,
                    })
                }
            }
            RunSummary::Task {
                job,
                step,
                task_index,
            } => match job.task(step, *task_index) {
                Some(task) if task.status == TaskStatus::Succeeded => Ok(()),
                Some(task) => Err(EvalflowError::TaskExecution {
                    step: step.clone(),
                    task_index: *task_index,
                    cause: task
                        .error
                        .clone()
                        .unwrap_or_else(|| format!("task ended {}", task.status)),
                }),
                None => Err(EvalflowError::InvalidInput(format!(
                    "job {} has no task {step}-{task_index}",
                    job.id
                ))),
            },
        }
    }
}

/// Per-step line of `job info`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSummary {
    pub name: StepName,
    pub method: HandlerMethod,
    pub needs: Vec<StepName>,
    pub status: StepStatus,
    pub tasks: usize,
    pub succeeded: usize,
}

#[derive(Debug, Clone)]
pub struct JobInfo {
    pub job: Job,
    pub steps: Vec<StepSummary>,
    pub tasks: Page<TaskRow>,
}

pub struct JobView {
    store: Arc<dyn JobStore>,
    machine: JobStateMachine,
    catalog: HandlerCatalog,
    handle_ctrl_c: bool,
}

impl JobView {
    pub fn new(store: Arc<dyn JobStore>, catalog: HandlerCatalog) -> Self {
        let machine = JobStateMachine::new(Arc::clone(&store));
        Self {
            store,
            machine,
            catalog,
            handle_ctrl_c: false,
        }
    }

    /// Translate Ctrl-C during a full run into a cancel of the job.
    pub fn with_ctrl_c(mut self) -> Self {
        self.handle_ctrl_c = true;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn machine(&self) -> &JobStateMachine {
        &self.machine
    }

    /// Jobs newest first, paged. An out-of-range page is empty.
    pub fn list(&self, filter: &JobFilter, page: PageRequest) -> Result<Page<Job>> {
        self.store.list(filter, page)
    }

    pub fn info(&self, reference: &str, page: PageRequest) -> Result<JobInfo> {
        let job = self.store.resolve(reference)?;
        let steps = job
            .steps
            .iter()
            .map(|s| StepSummary {
                name: s.step_name.clone(),
                method: s.method,
                needs: s.needs.clone(),
                status: s.status(),
                tasks: s.task_count(),
                succeeded: s
                    .tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Succeeded)
                    .count(),
            })
            .collect();
        let tasks = page.slice(&job.task_rows());
        Ok(JobInfo { job, steps, tasks })
    }

    pub fn remove(&self, reference: &str, _confirmed: Confirmed) -> Result<Job> {
        self.apply(reference, JobAction::Remove)
    }

    pub fn recover(&self, reference: &str) -> Result<Job> {
        self.apply(reference, JobAction::Recover)
    }

    pub fn pause(&self, reference: &str, _confirmed: Confirmed) -> Result<Job> {
        self.apply(reference, JobAction::Pause)
    }

    pub fn resume(&self, reference: &str) -> Result<Job> {
        self.apply(reference, JobAction::Resume)
    }

    pub fn cancel(&self, reference: &str, _confirmed: Confirmed) -> Result<Job> {
        self.apply(reference, JobAction::Cancel)
    }

    fn apply(&self, reference: &str, action: JobAction) -> Result<Job> {
        let job = self.store.resolve(reference)?;
        self.machine.transition(&job.id, action)
    }

    pub fn compare(&self, base: &str, others: &[String]) -> Result<ComparisonReport> {
        if others.is_empty() {
            return Err(EvalflowError::InvalidInput(
                "compare needs at least one job besides the base job".to_string(),
            ));
        }
        let base = self.store.resolve(base)?;
        let others = others
            .iter()
            .map(|r| self.store.resolve(r))
            .collect::<Result<Vec<_>>>()?;
        compare(&base, &others)
    }

    /// Create (or reuse) a job and run it: the whole DAG, or only
    /// `request.step`'s task `request.task_index`.
    pub async fn run(&self, request: RunRequest) -> Result<RunSummary> {
        let resources = ResourceRequest::parse(&request.resource)?;
        if request.datasets.iter().all(|d| d.trim().is_empty()) {
            return Err(EvalflowError::InvalidInput(
                "at least one --dataset is required".to_string(),
            ));
        }
        if request.use_docker && !request.gencmd {
            return Err(EvalflowError::Unsupported(
                "running inside a container; use --gencmd to print the docker command".to_string(),
            ));
        }

        let cfg = load_from_workdir(&request.model)?;
        let registry = StepRegistry::from_config(&cfg)?;
        let graph = DagGraph::build(&registry)?;

        if request.gencmd {
            return Ok(RunSummary::Command(docker_command(&request, &resources)));
        }

        let job = self.create_or_reuse(&request, resources, &graph)?;

        match request.step.clone() {
            Some(step) => self.run_single(job, &graph, cfg, step, request.task_index).await,
            None => self.run_full(job, graph, cfg).await,
        }
    }

    fn create_or_reuse(&self, request: &RunRequest, resources: ResourceRequest, graph: &DagGraph) -> Result<Job> {
        if let Some(version) = request.version.as_deref() {
            if let Some(existing) = self.store.get(version)? {
                info!(job = %existing.id, state = %existing.state, "reusing job");
                return Ok(existing);
            }
        }

        let workdir = request
            .model
            .canonicalize()
            .unwrap_or_else(|_| request.model.clone());
        let job = Job::new(
            JobSpec {
                id: request.version.clone(),
                project: request.project.clone(),
                name: request.name.clone(),
                description: request.description.clone(),
                model_ref: request.model.display().to_string(),
                workdir,
                dataset_refs: request
                    .datasets
                    .iter()
                    .filter(|d| !d.trim().is_empty())
                    .cloned()
                    .collect(),
                runtime_ref: request.runtime.clone(),
                resources,
            },
            graph,
        )?;
        self.store.insert(&job)?;
        info!(job = %job.id, project = %job.project, steps = job.steps.len(), "created job");
        Ok(job)
    }

    async fn run_full(&self, job: Job, graph: DagGraph, cfg: ConfigFile) -> Result<RunSummary> {
        let job = self.machine.transition(&job.id, JobAction::Run)?;
        let workdir = job.workdir.clone();

        let (tx, rx) = mpsc::channel::<RuntimeEvent>(EVENT_CHANNEL_CAPACITY);
        if self.handle_ctrl_c {
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                    return;
                }
                let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
            });
        }

        let options = RuntimeOptions {
            poll_interval: cfg.poll_interval,
        };
        let executor = HandlerExecutorBackend::new(self.catalog.clone(), cfg, &workdir, tx);
        let core = CoreRuntime::new(Scheduler::new(graph), job.id.clone(), workdir);
        let runtime = Runtime::new(core, rx, executor, self.machine.clone(), options);

        let job = runtime.run().await?;
        info!(job = %job.id, state = %job.state, "job run finished");
        Ok(RunSummary::Job(job))
    }

    async fn run_single(
        &self,
        job: Job,
        graph: &DagGraph,
        cfg: ConfigFile,
        step: StepName,
        task_index: usize,
    ) -> Result<RunSummary> {
        let def = graph.step(&step).ok_or_else(|| {
            EvalflowError::InvalidInput(format!(
                "unknown step '{step}' (steps: {})",
                graph.order_names().join(", ")
            ))
        })?;
        let context = Context::new(&job.id, step.clone(), task_index, def.task_num, &job.workdir)?;
        if job.task(&step, task_index).is_none() {
            return Err(EvalflowError::InvalidInput(format!(
                "job {} has no task {step}-{task_index}",
                job.id
            )));
        }

        let job = match job.state {
            JobState::Created => self.machine.transition(&job.id, JobAction::Run)?,
            JobState::Running => job,
            // A paused job dispatches nothing, externally driven tasks included.
            other => {
                return Err(EvalflowError::InvalidTransition {
                    job: job.id.clone(),
                    from: other,
                    to: JobState::Running,
                    allowed: vec![JobState::Created, JobState::Running],
                });
            }
        };

        self.machine.update_records(&job.id, |j| {
            if let Some(task) = j.task_mut(&step, task_index) {
                task.mark_running();
            }
        })?;

        let request = TaskRequest {
            task: ScheduledTask {
                context,
                method: def.entry,
            },
            datasets: job.dataset_refs.clone(),
            upstream: job.upstream_results(graph.dependencies_of(&step)),
        };
        let env = TaskEnv {
            catalog: self.catalog.clone(),
            config: cfg,
            workdir: job.workdir.clone(),
        };
        let outcome = run_single_task(&env, request).await;

        let job = self.machine.update_records(&job.id, |j| {
            if let Some(task) = j.task_mut(&step, task_index) {
                record_outcome(task, &step, &outcome);
            }
        })?;
        let job = self.finish_if_complete(job)?;

        Ok(RunSummary::Task {
            job,
            step,
            task_index,
        })
    }

    /// Once every task of an externally driven job is terminal, move the job
    /// to its final state.
    fn finish_if_complete(&self, job: Job) -> Result<Job> {
        if !job.all_tasks_terminal() {
            return Ok(job);
        }
        let action = if job.all_steps_succeeded() {
            JobAction::Succeed
        } else {
            JobAction::Fail
        };
        match self.machine.transition(&job.id, action) {
            Ok(job) => Ok(job),
            Err(e @ EvalflowError::InvalidTransition { .. }) => {
                warn!(job = %job.id, error = %e, "could not finish job");
                Ok(job)
            }
            Err(e) => Err(e),
        }
    }
}

/// The container command line that would run `request`.
fn docker_command(request: &RunRequest, resources: &ResourceRequest) -> String {
    let model = absolute(&request.model);
    let image = request.runtime.as_deref().unwrap_or(DEFAULT_IMAGE);

    let mut parts: Vec<String> = vec![
        "docker".into(),
        "run".into(),
        "--rm".into(),
        "-e".into(),
        format!("EVALFLOW_ROOT={CONTAINER_ROOT_DIR}"),
        "-v".into(),
        format!("{}:{CONTAINER_MODEL_DIR}", model.display()),
    ];
    if let Some(gpus) = resources.get("gpu") {
        parts.push("--gpus".into());
        parts.push(gpus.to_string());
    }
    parts.extend([
        image.to_string(),
        "evalflow".into(),
        "job".into(),
        "run".into(),
        request.project.clone(),
        "--model".into(),
        CONTAINER_MODEL_DIR.into(),
    ]);
    for dataset in request.datasets.iter().filter(|d| !d.trim().is_empty()) {
        parts.push("--dataset".into());
        parts.push(dataset.clone());
    }
    parts.extend(["--name".into(), request.name.clone()]);
    parts.extend(["--resource".into(), resources.to_string()]);
    if let Some(version) = &request.version {
        parts.extend(["--version".into(), version.clone()]);
    }
    if let Some(step) = &request.step {
        parts.extend([
            "--step".into(),
            step.clone(),
            "--task-index".into(),
            request.task_index.to_string(),
        ]);
    }

    parts.iter().map(|p| shell_quote(p)).collect::<Vec<_>>().join(" ")
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
