// src/exec/task_runner.rs

//! Individual task runner.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::exec::TaskRequest;
use crate::handler::{CancelSignal, HandlerCatalog, TaskInput, runner};

/// What every task of a job needs to resolve and run its handler.
#[derive(Debug)]
pub struct TaskEnv {
    pub catalog: HandlerCatalog,
    pub config: ConfigFile,
    pub workdir: PathBuf,
}

/// Run one dispatched task and report it to the runtime.
///
/// - Waits for a concurrency permit of the task's step, if it has a limit.
/// - A task whose job was canceled while it waited never starts and is
///   reported as canceled.
/// - Otherwise `TaskStarted` is sent, the handler runs, and exactly one
///   `TaskFinished` follows.
pub async fn run_task(
    request: TaskRequest,
    env: Arc<TaskEnv>,
    limit: Option<Arc<Semaphore>>,
    cancel_rx: watch::Receiver<bool>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let step = request.task.step().to_string();
    let task_index = request.task.task_index();

    let _permit = match limit {
        Some(semaphore) => semaphore.acquire_owned().await.ok(),
        None => None,
    };

    let cancelled = *cancel_rx.borrow();
    let outcome = if cancelled {
        debug!(step = %step, task_index, "job canceled before task start");
        TaskOutcome::Canceled("job canceled before the task started".to_string())
    } else {
        let started = RuntimeEvent::TaskStarted {
            step: step.clone(),
            task_index,
        };
        if runtime_tx.send(started).await.is_err() {
            warn!(step = %step, task_index, "runtime gone; not starting task");
            return;
        }
        execute(&env, request, cancel_rx).await
    };

    let finished = RuntimeEvent::TaskFinished {
        step: step.clone(),
        task_index,
        outcome,
    };
    if runtime_tx.send(finished).await.is_err() {
        warn!(step = %step, task_index, "runtime gone; dropping task outcome");
    }
}

/// Run one task outside of a job runtime (externally driven execution).
pub async fn run_single_task(env: &TaskEnv, request: TaskRequest) -> TaskOutcome {
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    execute(env, request, cancel_rx).await
}

async fn execute(env: &TaskEnv, request: TaskRequest, cancel_rx: watch::Receiver<bool>) -> TaskOutcome {
    let TaskRequest {
        task,
        datasets,
        upstream,
    } = request;
    let step = task.step().to_string();
    let task_index = task.task_index();
    let method = task.method;

    // Resolution failures are confined to the task attempting the load.
    let factory = match env.catalog.load(&env.workdir, &env.config) {
        Ok(factory) => factory,
        Err(e) => {
            warn!(step = %step, task_index, error = %e, "handler resolution failed");
            return TaskOutcome::Failed(e.to_string());
        }
    };

    let input = TaskInput::new(
        task.context,
        datasets,
        upstream,
        CancelSignal::new(cancel_rx.clone()),
    );
    let handle = tokio::task::spawn_blocking(move || runner::run(&factory, method, &input));

    let joined = match env.config.task_timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                // The blocking thread cannot be interrupted; its result is discarded.
                warn!(step = %step, task_index, timeout = ?limit, "task timed out");
                return TaskOutcome::TimedOut(limit);
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(value)) => {
            info!(step = %step, task_index, "task succeeded");
            TaskOutcome::Succeeded(value)
        }
        Ok(Err(e)) => {
            let cancelled = *cancel_rx.borrow();
            if cancelled {
                TaskOutcome::Canceled(e.to_string())
            } else {
                TaskOutcome::Failed(e.to_string())
            }
        }
        Err(join_err) => TaskOutcome::Failed(format!(
            "task {step}-{task_index} aborted: {join_err}"
        )),
    }
}
