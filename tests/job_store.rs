// tests/job_store.rs

use std::error::Error;
use std::fs;
use std::path::Path;

use chrono::{Duration, Utc};
use evalflow::dag::{DagGraph, StepRegistry};
use evalflow::errors::EvalflowError;
use evalflow::job::{
    FileJobStore, Job, JobFilter, JobStore, MemoryJobStore, PageRequest, validate_job_id,
};
use evalflow::types::JobState;
use evalflow_test_utils::builders::JobSpecBuilder;

type TestResult = Result<(), Box<dyn Error>>;

fn graph() -> DagGraph {
    DagGraph::build(&StepRegistry::default_pipeline()).unwrap()
}

/// `n` jobs created one minute apart, oldest first.
fn jobs(n: usize) -> Vec<Job> {
    let start = Utc::now() - Duration::hours(1);
    (0..n)
        .map(|i| {
            let spec = JobSpecBuilder::new(Path::new("/m"))
                .id(&format!("job{i:02}"))
                .project(if i % 2 == 0 { "even" } else { "odd" })
                .build();
            let mut job = Job::new(spec, &graph()).unwrap();
            job.created_at = start + Duration::minutes(i as i64);
            job
        })
        .collect()
}

fn fill(store: &dyn JobStore, jobs: &[Job]) -> TestResult {
    for job in jobs {
        store.insert(job)?;
    }
    Ok(())
}

#[test]
fn new_job_has_one_pending_record_per_task() -> TestResult {
    let mut registry = StepRegistry::new();
    registry.register(
        evalflow::dag::StepDef::new("ppl", evalflow::handler::HandlerMethod::Ppl).task_num(3),
    )?;
    let graph = DagGraph::build(&registry)?;
    let job = Job::new(JobSpecBuilder::new(Path::new("/m")).build(), &graph)?;

    assert_eq!(job.state, JobState::Created);
    assert_eq!(job.steps.len(), 1);
    assert_eq!(job.steps[0].task_count(), 3);
    assert_eq!(job.task_rows().len(), 3);
    assert!(!job.all_tasks_terminal());
    assert_eq!(job.id.len(), 32);
    assert_eq!(job.short_id().len(), 12);
    Ok(())
}

#[test]
fn job_without_datasets_is_rejected() {
    let spec = JobSpecBuilder::new(Path::new("/m")).datasets(&[]).build();
    let err = Job::new(spec, &graph()).unwrap_err();
    assert!(matches!(err, EvalflowError::InvalidInput(_)), "{err:?}");
}

#[test]
fn job_ids_must_be_file_name_safe() {
    assert!(validate_job_id("eval-2024_01").is_ok());
    for bad in ["", "../etc", "a/b", "v1.0", "a b"] {
        assert!(validate_job_id(bad).is_err(), "{bad}");
    }
}

#[test]
fn list_pages_newest_first() -> TestResult {
    let store = MemoryJobStore::new();
    fill(&store, &jobs(15))?;

    let first = store.list(&JobFilter::default(), PageRequest::new(1, 10)?)?;
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total, 15);
    assert_eq!(first.total_pages(), 2);
    assert_eq!(first.items[0].id, "job14");

    let second = store.list(&JobFilter::default(), PageRequest::new(2, 10)?)?;
    assert_eq!(second.items.len(), 5);
    assert_eq!(second.items.last().map(|j| j.id.as_str()), Some("job00"));

    let beyond = store.list(&JobFilter::default(), PageRequest::new(99, 10)?)?;
    assert!(beyond.is_empty());
    assert_eq!(beyond.total, 15);
    Ok(())
}

#[test]
fn page_zero_is_rejected() {
    assert!(matches!(
        PageRequest::new(0, 10),
        Err(EvalflowError::InvalidPage { page: 0, size: 10 })
    ));
    assert!(PageRequest::new(1, 0).is_err());
}

#[test]
fn list_filters_project_and_removed() -> TestResult {
    let store = MemoryJobStore::new();
    let mut all = jobs(6);
    all[0].state = JobState::Removed;
    all[0].removed = true;
    all[0].pre_removal_state = Some(JobState::Created);
    fill(&store, &all)?;

    let even = JobFilter {
        project: Some("even".to_string()),
        show_removed: false,
    };
    let page = store.list(&even, PageRequest::default())?;
    assert_eq!(page.total, 2);

    let even_with_removed = JobFilter {
        show_removed: true,
        ..even
    };
    assert_eq!(store.list(&even_with_removed, PageRequest::default())?.total, 3);
    Ok(())
}

#[test]
fn resolve_accepts_full_ids_and_unique_prefixes() -> TestResult {
    let store = MemoryJobStore::new();
    let mut a = jobs(1).remove(0);
    a.id = "abcd1234".to_string();
    let mut b = a.clone();
    b.id = "abcd9999".to_string();
    let mut c = a.clone();
    c.id = "ffff0000".to_string();
    fill(&store, &[a, b, c])?;

    assert_eq!(store.resolve("abcd1234")?.id, "abcd1234");
    assert_eq!(store.resolve("ffff")?.id, "ffff0000");
    assert_eq!(store.resolve("abcd12")?.id, "abcd1234");

    match store.resolve("abcd") {
        Err(EvalflowError::AmbiguousJob { candidates, .. }) => {
            assert_eq!(candidates, vec!["abcd1234", "abcd9999"]);
        }
        other => panic!("expected AmbiguousJob, got {other:?}"),
    }
    // Too short to be treated as a prefix.
    assert!(matches!(store.resolve("ff"), Err(EvalflowError::JobNotFound(_))));
    assert!(matches!(store.resolve("0000"), Err(EvalflowError::JobNotFound(_))));
    Ok(())
}

#[test]
fn duplicate_insert_fails() -> TestResult {
    let store = MemoryJobStore::new();
    let job = jobs(1).remove(0);
    store.insert(&job)?;
    assert!(store.insert(&job).is_err());
    Ok(())
}

#[test]
fn file_store_round_trips_and_survives_reopen() -> TestResult {
    let root = tempfile::tempdir()?;
    let all = jobs(3);
    {
        let store = FileJobStore::open(root.path())?;
        fill(&store, &all)?;
    }

    let store = FileJobStore::open(root.path())?;
    let loaded = store.get("job01")?.unwrap();
    assert_eq!(loaded, all[1]);
    assert_eq!(store.ids()?.len(), 3);
    assert_eq!(store.get("missing")?, None);
    // Path-like ids never touch the filesystem.
    assert_eq!(store.get("../job01")?, None);
    Ok(())
}

#[test]
fn file_store_compare_and_set_checks_state_and_revision() -> TestResult {
    let root = tempfile::tempdir()?;
    let store = FileJobStore::open(root.path())?;
    let job = jobs(1).remove(0);
    store.insert(&job)?;

    let mut running = job.clone();
    running.state = JobState::Running;
    assert!(!store.compare_and_set(JobState::Paused, &running)?);
    assert!(store.compare_and_set(JobState::Created, &running)?);

    let stored = store.get(&job.id)?.unwrap();
    assert_eq!(stored.state, JobState::Running);
    assert_eq!(stored.revision, 1);

    // Based on revision 0: stale.
    assert!(!store.compare_and_set(JobState::Running, &running)?);

    // No lock or temp file is left behind.
    let leftovers: Vec<_> = fs::read_dir(store.jobs_dir())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| !name.ends_with(".json"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
    Ok(())
}

#[test]
fn file_store_ignores_foreign_files() -> TestResult {
    let root = tempfile::tempdir()?;
    let store = FileJobStore::open(root.path())?;
    fill(&store, &jobs(2))?;
    fs::write(store.jobs_dir().join("notes.txt"), "hello")?;

    assert_eq!(store.all()?.len(), 2);
    Ok(())
}

#[test]
fn file_store_waits_for_a_held_lock() -> TestResult {
    let root = tempfile::tempdir()?;
    let store = FileJobStore::open(root.path())?;
    let job = jobs(1).remove(0);
    store.insert(&job)?;

    // A fresh lock held by someone else blocks writers until released.
    let lock = store.jobs_dir().join(format!("{}.lock", job.id));
    fs::write(&lock, "12345")?;
    let releaser = {
        let lock = lock.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            fs::remove_file(lock)
        })
    };

    let mut running = job.clone();
    running.state = JobState::Running;
    assert!(store.compare_and_set(JobState::Created, &running)?);
    releaser.join().unwrap()?;
    Ok(())
}
