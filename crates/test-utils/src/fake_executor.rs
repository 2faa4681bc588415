use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use evalflow::engine::{RuntimeEvent, TaskOutcome};
use evalflow::errors::Result;
use evalflow::exec::{ExecutorBackend, TaskRequest};
use serde_json::json;
use tokio::sync::mpsc;

type OutcomeFn = Arc<dyn Fn(&TaskRequest) -> TaskOutcome + Send + Sync>;

/// What a `FakeExecutor` saw; clone it before handing the executor to a
/// runtime.
#[derive(Clone, Default)]
pub struct FakeExecutorLog {
    executed: Arc<Mutex<Vec<String>>>,
    cancel_signalled: Arc<AtomicBool>,
}

impl FakeExecutorLog {
    /// Dispatched tasks as `"<step>-<index>"`, in dispatch order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn cancel_signalled(&self) -> bool {
        self.cancel_signalled.load(Ordering::SeqCst)
    }
}

/// A fake executor that:
/// - records which tasks were dispatched
/// - reports `TaskStarted`, then `TaskFinished` with the outcome chosen by
///   its outcome function (success with `{"task": i}` by default)
/// - in manual mode only reports `TaskStarted`; the test sends completions.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    log: FakeExecutorLog,
    outcome: Option<OutcomeFn>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            log: FakeExecutorLog::default(),
            outcome: Some(Arc::new(|req: &TaskRequest| {
                TaskOutcome::Succeeded(json!({ "task": req.task.task_index() }))
            })),
        }
    }

    pub fn with_outcomes<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskRequest) -> TaskOutcome + Send + Sync + 'static,
    {
        self.outcome = Some(Arc::new(f));
        self
    }

    pub fn manual(mut self) -> Self {
        self.outcome = None;
        self
    }

    pub fn log(&self) -> FakeExecutorLog {
        self.log.clone()
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<TaskRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.log.executed);
        let outcome = self.outcome.clone();

        Box::pin(async move {
            let mut events = Vec::new();
            for req in tasks {
                let step = req.task.step().to_string();
                let task_index = req.task.task_index();
                executed.lock().unwrap().push(format!("{step}-{task_index}"));

                events.push(RuntimeEvent::TaskStarted {
                    step: step.clone(),
                    task_index,
                });
                if let Some(f) = &outcome {
                    events.push(RuntimeEvent::TaskFinished {
                        step,
                        task_index,
                        outcome: f(&req),
                    });
                }
            }

            // Sent from a separate task: the runtime is not receiving while
            // it awaits this future.
            tokio::spawn(async move {
                for event in events {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            });
            Ok(())
        })
    }

    fn signal_cancel(&mut self) {
        self.log.cancel_signalled.store(true, Ordering::SeqCst);
    }
}
