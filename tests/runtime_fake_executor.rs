// tests/runtime_fake_executor.rs

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use evalflow::dag::{DagGraph, Scheduler, StepDef};
use evalflow::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, TaskOutcome};
use evalflow::job::{Job, JobAction, JobStateMachine, JobStore, MemoryJobStore};
use evalflow::types::{JobState, TaskStatus};
use evalflow::handler::HandlerMethod;
use evalflow_test_utils::builders::{JobSpecBuilder, graph_of};
use evalflow_test_utils::fake_executor::{FakeExecutor, FakeExecutorLog};
use evalflow_test_utils::{init_tracing, with_timeout};
use serde_json::json;
use tokio::sync::mpsc;

type TestResult = Result<(), Box<dyn Error>>;

fn pipeline(ppl_tasks: usize) -> DagGraph {
    graph_of(vec![
        StepDef::new("ppl", HandlerMethod::Ppl).task_num(ppl_tasks),
        StepDef::new("cmp", HandlerMethod::Cmp).needs(["ppl"]),
    ])
}

struct Harness {
    machine: JobStateMachine,
    job_id: String,
    tx: mpsc::Sender<RuntimeEvent>,
    log: FakeExecutorLog,
}

fn harness(
    graph: DagGraph,
    make_executor: impl FnOnce(FakeExecutor) -> FakeExecutor,
) -> Result<(Harness, Runtime<FakeExecutor>), Box<dyn Error>> {
    harness_polling(graph, Duration::from_millis(10), make_executor)
}

/// Insert a RUNNING job for `graph` and build a runtime over it.
fn harness_polling(
    graph: DagGraph,
    poll_interval: Duration,
    make_executor: impl FnOnce(FakeExecutor) -> FakeExecutor,
) -> Result<(Harness, Runtime<FakeExecutor>), Box<dyn Error>> {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let machine = JobStateMachine::new(Arc::clone(&store));
    let job = Job::new(JobSpecBuilder::new(Path::new("/m")).build(), &graph)?;
    store.insert(&job)?;
    machine.transition(&job.id, JobAction::Run)?;

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = make_executor(FakeExecutor::new(tx.clone()));
    let log = executor.log();

    let core = CoreRuntime::new(Scheduler::new(graph), job.id.clone(), "/m");
    let options = RuntimeOptions { poll_interval };
    let runtime = Runtime::new(core, rx, executor, machine.clone(), options);

    Ok((
        Harness {
            machine,
            job_id: job.id,
            tx,
            log,
        },
        runtime,
    ))
}

async fn wait_for_dispatch(log: &FakeExecutorLog, n: usize) {
    while log.executed().len() < n {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn runs_a_pipeline_to_success() -> TestResult {
    init_tracing();
    let (h, runtime) = harness(pipeline(2), |e| e)?;

    let job = with_timeout(runtime.run()).await?;

    assert_eq!(job.state, JobState::Succeeded);
    assert!(job.finished_at.is_some());
    assert_eq!(h.log.executed(), vec!["ppl-0", "ppl-1", "cmp-0"]);
    assert_eq!(job.task("ppl", 1).and_then(|t| t.result.clone()), Some(json!({ "task": 1 })));
    assert!(job.task_rows().iter().all(|r| r.task.status == TaskStatus::Succeeded));
    assert!(job.task("cmp", 0).and_then(|t| t.started_at).is_some());
    Ok(())
}

#[tokio::test]
async fn zero_poll_interval_still_runs() -> TestResult {
    let (_h, runtime) = harness_polling(pipeline(1), Duration::ZERO, |e| e)?;

    let job = with_timeout(runtime.run()).await?;

    assert_eq!(job.state, JobState::Succeeded);
    Ok(())
}

#[tokio::test]
async fn failed_task_fails_the_job_and_cancels_dependents() -> TestResult {
    init_tracing();
    let (h, runtime) = harness(pipeline(3), |e| {
        e.with_outcomes(|req| {
            if req.task.task_index() == 1 {
                TaskOutcome::Failed("bad shard".to_string())
            } else {
                TaskOutcome::Succeeded(json!(req.task.task_index()))
            }
        })
    })?;

    let job = with_timeout(runtime.run()).await?;

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(h.log.executed(), vec!["ppl-0", "ppl-1", "ppl-2"]);
    let ppl = job.step("ppl").unwrap();
    assert_eq!(ppl.task(0).map(|t| t.status), Some(TaskStatus::Succeeded));
    assert_eq!(ppl.task(1).map(|t| t.status), Some(TaskStatus::Failed));
    assert_eq!(ppl.task(1).and_then(|t| t.error.clone()).as_deref(), Some("bad shard"));
    assert_eq!(ppl.task(2).map(|t| t.status), Some(TaskStatus::Succeeded));

    let cmp = job.task("cmp", 0).unwrap();
    assert_eq!(cmp.status, TaskStatus::Canceled);
    assert!(cmp.error.as_deref().unwrap_or("").contains("ppl"));
    Ok(())
}

#[tokio::test]
async fn timed_out_task_is_recorded_as_failed() -> TestResult {
    let (_h, runtime) = harness(pipeline(1), |e| {
        e.with_outcomes(|_| TaskOutcome::TimedOut(Duration::from_millis(250)))
    })?;

    let job = with_timeout(runtime.run()).await?;

    assert_eq!(job.state, JobState::Failed);
    let ppl = job.task("ppl", 0).unwrap();
    assert_eq!(ppl.status, TaskStatus::Failed);
    assert!(ppl.error.as_deref().unwrap_or("").contains("timed out"));
    Ok(())
}

#[tokio::test]
async fn external_cancel_stops_the_run() -> TestResult {
    init_tracing();
    let (h, runtime) = harness(pipeline(2), FakeExecutor::manual)?;

    let driver = async {
        wait_for_dispatch(&h.log, 2).await;
        h.machine.transition(&h.job_id, JobAction::Cancel)?;
        while !h.log.cancel_signalled() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for index in 0..2 {
            h.tx.send(RuntimeEvent::TaskFinished {
                step: "ppl".to_string(),
                task_index: index,
                outcome: TaskOutcome::Canceled("stopped at checkpoint".to_string()),
            })
            .await?;
        }
        Ok::<(), Box<dyn Error>>(())
    };

    let (job, driven) = with_timeout(async { tokio::join!(runtime.run(), driver) }).await;
    driven?;
    let job = job?;

    assert_eq!(job.state, JobState::Canceled);
    assert_eq!(h.log.executed(), vec!["ppl-0", "ppl-1"]);
    assert!(job.task_rows().iter().all(|r| r.task.status == TaskStatus::Canceled));
    assert_eq!(
        job.task("cmp", 0).and_then(|t| t.error.clone()).as_deref(),
        Some("job canceled")
    );
    Ok(())
}

#[tokio::test]
async fn pause_holds_dependents_until_resume() -> TestResult {
    init_tracing();
    let (h, runtime) = harness(pipeline(1), FakeExecutor::manual)?;

    let driver = async {
        wait_for_dispatch(&h.log, 1).await;
        h.machine.transition(&h.job_id, JobAction::Pause)?;
        // Several poll intervals.
        tokio::time::sleep(Duration::from_millis(60)).await;

        h.tx.send(RuntimeEvent::TaskFinished {
            step: "ppl".to_string(),
            task_index: 0,
            outcome: TaskOutcome::Succeeded(json!(0)),
        })
        .await?;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(h.log.executed(), vec!["ppl-0"], "cmp must wait while paused");

        h.machine.transition(&h.job_id, JobAction::Resume)?;
        wait_for_dispatch(&h.log, 2).await;
        h.tx.send(RuntimeEvent::TaskFinished {
            step: "cmp".to_string(),
            task_index: 0,
            outcome: TaskOutcome::Succeeded(json!("ok")),
        })
        .await?;
        Ok::<(), Box<dyn Error>>(())
    };

    let (job, driven) = with_timeout(async { tokio::join!(runtime.run(), driver) }).await;
    driven?;
    let job = job?;

    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(h.log.executed(), vec!["ppl-0", "cmp-0"]);
    Ok(())
}

#[tokio::test]
async fn shutdown_request_cancels_the_job() -> TestResult {
    let (h, runtime) = harness(pipeline(1), FakeExecutor::manual)?;

    let driver = async {
        wait_for_dispatch(&h.log, 1).await;
        h.tx.send(RuntimeEvent::ShutdownRequested).await?;
        h.tx.send(RuntimeEvent::TaskFinished {
            step: "ppl".to_string(),
            task_index: 0,
            outcome: TaskOutcome::Canceled("interrupted".to_string()),
        })
        .await?;
        Ok::<(), Box<dyn Error>>(())
    };

    let (job, driven) = with_timeout(async { tokio::join!(runtime.run(), driver) }).await;
    driven?;
    let job = job?;

    assert_eq!(job.state, JobState::Canceled);
    assert!(h.log.cancel_signalled());
    Ok(())
}
