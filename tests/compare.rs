// tests/compare.rs

use std::error::Error;
use std::path::Path;

use evalflow::compare::{CellDiff, compare};
use evalflow::dag::StepDef;
use evalflow::errors::EvalflowError;
use evalflow::handler::HandlerMethod;
use evalflow::job::Job;
use evalflow::types::JobState;
use evalflow_test_utils::builders::{JobSpecBuilder, graph_of};
use serde_json::{Value, json};

type TestResult = Result<(), Box<dyn Error>>;

/// A finished job whose `ppl` task `i` produced `score(i)`.
fn finished_job(id: &str, ppl_tasks: usize, score: impl Fn(usize) -> Value) -> Job {
    let graph = graph_of(vec![
        StepDef::new("ppl", HandlerMethod::Ppl).task_num(ppl_tasks),
        StepDef::new("cmp", HandlerMethod::Cmp).needs(["ppl"]),
    ]);
    let mut job = Job::new(JobSpecBuilder::new(Path::new("/m")).id(id).build(), &graph).unwrap();
    for i in 0..ppl_tasks {
        job.task_mut("ppl", i).unwrap().mark_succeeded(score(i));
    }
    job.task_mut("cmp", 0).unwrap().mark_succeeded(json!({ "tasks": ppl_tasks }));
    job.state = JobState::Succeeded;
    job
}

#[test]
fn a_job_compared_with_itself_is_identical() -> TestResult {
    let job = finished_job("base", 4, |i| json!(i as f64 * 0.5));

    let report = compare(&job, &[job.clone()])?;

    assert!(!report.partial);
    assert_eq!(report.differing_rows(), 0);
    assert_eq!(report.missing_cells(), 0);
    assert_eq!(report.rows().count(), 5);
    assert!(report.rows().all(|r| r.others == vec![CellDiff::Same]));
    let summary = &report.summary[0];
    assert_eq!((summary.compared, summary.identical), (5, 5));
    assert_eq!(summary.mean_abs_delta, None);
    Ok(())
}

#[test]
fn task_absent_from_the_other_job_is_missing() -> TestResult {
    let base = finished_job("base", 8, |i| json!(i));
    let other = finished_job("other", 7, |i| json!(i));

    let report = compare(&base, &[other])?;

    let row = report.row("ppl", 7).expect("base has ppl-7");
    assert_eq!(row.base_value, Some(json!(7)));
    assert_eq!(row.others, vec![CellDiff::Missing]);
    assert_eq!(report.missing_cells(), 1);
    // The cmp results differ ({"tasks": 8} vs {"tasks": 7}).
    assert_eq!(report.summary[0].missing, 1);
    assert_eq!(report.summary[0].differing, 1);
    Ok(())
}

#[test]
fn task_without_result_is_missing() -> TestResult {
    let base = finished_job("base", 2, |i| json!(i));
    let mut other = finished_job("other", 2, |i| json!(i));
    other.task_mut("ppl", 1).unwrap().mark_failed("boom");
    other.task_mut("ppl", 1).unwrap().result = None;
    other.state = JobState::Failed;

    let report = compare(&base, &[other])?;

    assert_eq!(report.row("ppl", 1).map(|r| r.others.clone()), Some(vec![CellDiff::Missing]));
    assert_eq!(report.row("ppl", 0).map(|r| r.others.clone()), Some(vec![CellDiff::Same]));
    Ok(())
}

#[test]
fn numeric_differences_carry_a_delta() -> TestResult {
    let base = finished_job("base", 2, |i| json!(1.0 + i as f64));
    let a = finished_job("a", 2, |i| json!(1.5 + i as f64));
    let b = finished_job("b", 2, |_| json!("n/a"));

    let report = compare(&base, &[a, b])?;
    let row = report.row("ppl", 0).unwrap();

    assert_eq!(
        row.others[0],
        CellDiff::Differs {
            value: Some(json!(1.5)),
            delta: Some(0.5)
        }
    );
    assert_eq!(
        row.others[1],
        CellDiff::Differs {
            value: Some(json!("n/a")),
            delta: None
        }
    );
    assert_eq!(report.summary[0].mean_abs_delta, Some(0.5));
    assert_eq!(report.other_job_ids, vec!["a", "b"]);
    Ok(())
}

#[test]
fn live_jobs_give_a_partial_report() -> TestResult {
    let base = finished_job("base", 2, |i| json!(i));
    let mut running = finished_job("running", 2, |i| json!(i));
    running.state = JobState::Running;

    let report = compare(&base, &[running])?;
    assert!(report.partial);
    Ok(())
}

#[test]
fn never_run_or_removed_jobs_are_not_comparable() {
    let base = finished_job("base", 1, |i| json!(i));

    let mut created = finished_job("created", 1, |i| json!(i));
    created.state = JobState::Created;
    let err = compare(&base, &[created]).unwrap_err();
    assert!(
        matches!(err, EvalflowError::NotComparable { ref job, state: JobState::Created } if job == "created"),
        "{err:?}"
    );

    let mut removed = finished_job("removed", 1, |i| json!(i));
    removed.state = JobState::Removed;
    removed.removed = true;
    assert!(compare(&removed, &[base]).is_err());
}
