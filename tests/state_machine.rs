// tests/state_machine.rs

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use evalflow::dag::StepRegistry;
use evalflow::dag::DagGraph;
use evalflow::errors::{ErrorKind, EvalflowError};
use evalflow::job::state_machine::apply;
use evalflow::job::{Job, JobAction, JobStateMachine, JobStore, MemoryJobStore};
use evalflow::types::JobState;
use evalflow_test_utils::builders::JobSpecBuilder;

type TestResult = Result<(), Box<dyn Error>>;

fn job_in(state: JobState) -> Job {
    let graph = DagGraph::build(&StepRegistry::default_pipeline()).unwrap();
    let mut job = Job::new(JobSpecBuilder::new(Path::new("/m")).build(), &graph).unwrap();
    job.state = state;
    if state == JobState::Removed {
        job.removed = true;
        job.pre_removal_state = Some(JobState::Failed);
    }
    job
}

fn expected_target(from: JobState, action: JobAction) -> Option<JobState> {
    use JobState::*;
    match (action, from) {
        (JobAction::Run, Created) => Some(Running),
        (JobAction::Pause, Running) => Some(Paused),
        (JobAction::Resume, Paused) => Some(Running),
        (JobAction::Cancel, Created | Running | Paused) => Some(Canceled),
        (JobAction::Remove, Created | Paused | Succeeded | Failed | Canceled) => Some(Removed),
        // Restores the state recorded by `job_in`.
        (JobAction::Recover, Removed) => Some(Failed),
        (JobAction::Succeed, Running | Paused) => Some(Succeeded),
        (JobAction::Fail, Running | Paused) => Some(Failed),
        _ => None,
    }
}

#[test]
fn every_state_action_pair_follows_the_lifecycle_table() {
    for from in JobState::ALL {
        for action in JobAction::ALL {
            let job = job_in(from);
            let result = apply(&job, action);
            match expected_target(from, action) {
                Some(to) => {
                    let next = result.unwrap_or_else(|e| panic!("{action} from {from}: {e}"));
                    assert_eq!(next.state, to, "{action} from {from}");
                }
                None => {
                    let err = result.expect_err(&format!("{action} from {from} must be rejected"));
                    assert_eq!(err.kind(), ErrorKind::Transition, "{action} from {from}: {err}");
                }
            }
        }
    }
}

#[test]
fn rejected_move_names_the_allowed_states() {
    let job = job_in(JobState::Succeeded);

    match apply(&job, JobAction::Pause) {
        Err(EvalflowError::InvalidTransition { from, to, allowed, .. }) => {
            assert_eq!(from, JobState::Succeeded);
            assert_eq!(to, JobState::Paused);
            assert_eq!(allowed, vec![JobState::Running]);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
}

#[test]
fn recover_on_a_live_job_is_not_removed() {
    let err = apply(&job_in(JobState::Running), JobAction::Recover).unwrap_err();
    assert!(matches!(err, EvalflowError::NotRemoved(_)), "{err:?}");
}

#[test]
fn remove_then_recover_restores_every_removable_state() -> TestResult {
    for from in [
        JobState::Created,
        JobState::Paused,
        JobState::Succeeded,
        JobState::Failed,
        JobState::Canceled,
    ] {
        let removed = apply(&job_in(from), JobAction::Remove)?;
        assert_eq!(removed.state, JobState::Removed);
        assert!(removed.removed);
        assert_eq!(removed.pre_removal_state, Some(from));

        let recovered = apply(&removed, JobAction::Recover)?;
        assert_eq!(recovered.state, from);
        assert!(!recovered.removed);
        assert_eq!(recovered.pre_removal_state, None);
    }
    Ok(())
}

#[test]
fn running_job_cannot_be_removed() {
    let err = apply(&job_in(JobState::Running), JobAction::Remove).unwrap_err();
    assert!(matches!(err, EvalflowError::InvalidTransition { .. }), "{err:?}");
}

#[test]
fn terminal_moves_stamp_finished_at() -> TestResult {
    let done = apply(&job_in(JobState::Running), JobAction::Succeed)?;
    assert!(done.finished_at.is_some());

    let paused = apply(&job_in(JobState::Running), JobAction::Pause)?;
    assert!(paused.finished_at.is_none());
    Ok(())
}

#[test]
fn machine_persists_moves_and_leaves_rejections_untouched() -> TestResult {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let machine = JobStateMachine::new(Arc::clone(&store));
    let job = job_in(JobState::Created);
    store.insert(&job)?;

    let running = machine.transition(&job.id, JobAction::Run)?;
    assert_eq!(running.state, JobState::Running);
    let stored = store.get(&job.id)?.unwrap();
    assert_eq!(stored.state, JobState::Running);
    assert_eq!(stored.revision, running.revision);

    let err = machine.transition(&job.id, JobAction::Resume).unwrap_err();
    assert!(matches!(err, EvalflowError::InvalidTransition { .. }));
    assert_eq!(store.get(&job.id)?.unwrap(), stored);
    Ok(())
}

#[test]
fn stale_revision_loses_compare_and_set() -> TestResult {
    let store = MemoryJobStore::new();
    let job = job_in(JobState::Running);
    store.insert(&job)?;

    let mut first = job.clone();
    first.name = "first".to_string();
    assert!(store.compare_and_set(JobState::Running, &first)?);

    // Same expected state, but based on the old revision.
    let mut second = job.clone();
    second.name = "second".to_string();
    assert!(!store.compare_and_set(JobState::Running, &second)?);

    assert_eq!(store.get(&job.id)?.unwrap().name, "first");
    Ok(())
}

#[test]
fn update_records_keeps_the_state() -> TestResult {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let machine = JobStateMachine::new(Arc::clone(&store));
    let job = job_in(JobState::Paused);
    store.insert(&job)?;

    let updated = machine.update_records(&job.id, |j| {
        j.state = JobState::Succeeded;
        if let Some(task) = j.task_mut("ppl", 0) {
            task.mark_running();
        }
    })?;

    assert_eq!(updated.state, JobState::Paused);
    let stored = store.get(&job.id)?.unwrap();
    assert_eq!(stored.state, JobState::Paused);
    assert_eq!(
        stored.task("ppl", 0).map(|t| t.status),
        Some(evalflow::types::TaskStatus::Running)
    );
    Ok(())
}

#[test]
fn unknown_job_is_a_lookup_error() {
    let machine = JobStateMachine::new(Arc::new(MemoryJobStore::new()));
    let err = machine.transition("nope", JobAction::Run).unwrap_err();
    assert!(matches!(err, EvalflowError::JobNotFound(_)));
    assert_eq!(err.exit_code(), 2);
}
