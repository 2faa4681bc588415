// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning handler
//! invocations itself. This makes it easy to swap in a fake executor in
//! tests while keeping the production implementation here.
//!
//! - `HandlerExecutorBackend` is the default implementation. Each task runs
//!   on its own tokio task, bounded per step by the step's `concurrency`.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskFinished` events.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::dag::StepName;
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::TaskRequest;
use crate::exec::task_runner::{TaskEnv, run_task};
use crate::handler::HandlerCatalog;

/// Trait abstracting how dispatched tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution. Completion is reported
    /// asynchronously through `RuntimeEvent::TaskFinished`.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<TaskRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask running tasks to stop at their next cancellation checkpoint.
    fn signal_cancel(&mut self);
}

/// Production backend: resolves the job's handler and runs its methods on
/// blocking threads.
pub struct HandlerExecutorBackend {
    env: Arc<TaskEnv>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel_tx: watch::Sender<bool>,
    limits: HashMap<StepName, Arc<Semaphore>>,
}

impl HandlerExecutorBackend {
    pub fn new(
        catalog: HandlerCatalog,
        config: ConfigFile,
        workdir: impl AsRef<Path>,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Self {
        let limits = config
            .steps
            .iter()
            .filter_map(|(name, step)| {
                step.concurrency
                    .map(|n| (name.clone(), Arc::new(Semaphore::new(n))))
            })
            .collect();
        let (cancel_tx, _) = watch::channel(false);

        Self {
            env: Arc::new(TaskEnv {
                catalog,
                config,
                workdir: PathBuf::from(workdir.as_ref()),
            }),
            runtime_tx,
            cancel_tx,
            limits,
        }
    }
}

impl ExecutorBackend for HandlerExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<TaskRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for request in tasks {
                let limit = self.limits.get(request.task.step()).cloned();
                debug!(
                    task = %request.task.context,
                    limited = limit.is_some(),
                    "spawning task"
                );
                tokio::spawn(run_task(
                    request,
                    Arc::clone(&self.env),
                    limit,
                    self.cancel_tx.subscribe(),
                    self.runtime_tx.clone(),
                ));
            }
            Ok(())
        })
    }

    fn signal_cancel(&mut self) {
        info!("signalling cancellation to running tasks");
        self.cancel_tx.send_replace(true);
    }
}
