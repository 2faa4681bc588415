// tests/config_validation.rs

use std::error::Error;
use std::fs;
use std::time::Duration;

use evalflow::config::{
    CONFIG_FILE_NAME, ConfigFile, RawConfigFile, load_from_workdir, parse_duration,
};
use evalflow::errors::{ErrorKind, EvalflowError};
use evalflow::handler::HandlerMethod;
use evalflow_test_utils::builders::{StepToml, WorkdirBuilder};

type TestResult = Result<(), Box<dyn Error>>;

fn validate(toml_text: &str) -> Result<ConfigFile, EvalflowError> {
    let raw: RawConfigFile = toml::from_str(toml_text)?;
    ConfigFile::try_from(raw)
}

#[test]
fn missing_step_tables_give_the_default_pipeline() -> TestResult {
    let cfg = validate("[run]\nhandler = \"builtin:line_stats\"\n")?;

    let names: Vec<&str> = cfg.steps.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["ppl", "cmp"]);
    assert_eq!(cfg.steps["cmp"].needs, vec!["ppl".to_string()]);
    assert_eq!(cfg.steps["ppl"].task_num, 1);
    assert_eq!(cfg.task_timeout, None);
    assert_eq!(cfg.poll_interval, Duration::from_millis(200));
    Ok(())
}

#[test]
fn step_tables_keep_declaration_order_and_options() -> TestResult {
    let builder = WorkdirBuilder::new("test:recording")
        .task_timeout("30s")
        .step(StepToml::new("score").method("ppl").task_num(4).concurrency(2))
        .step(StepToml::new("report").method("cmp").needs("score"));
    let cfg = validate(&builder.toml())?;

    let names: Vec<&str> = cfg.steps.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["score", "report"]);
    assert_eq!(cfg.steps["score"].method, HandlerMethod::Ppl);
    assert_eq!(cfg.steps["score"].task_num, 4);
    assert_eq!(cfg.steps["score"].concurrency, Some(2));
    assert_eq!(cfg.task_timeout, Some(Duration::from_secs(30)));
    assert_eq!(cfg.poll_interval, Duration::from_millis(20));
    assert_eq!(cfg.steps["report"].method, HandlerMethod::Cmp);
    Ok(())
}

#[test]
fn method_defaults_to_step_name() -> TestResult {
    let cfg = validate("[run]\nhandler = \"h\"\n[step.ppl]\n[step.cmp]\nneeds = [\"ppl\"]\n")?;
    assert_eq!(cfg.steps["cmp"].method, HandlerMethod::Cmp);
    Ok(())
}

#[test]
fn unknown_method_is_a_config_error() {
    let err = validate("[run]\nhandler = \"h\"\n[step.eval]\n").unwrap_err();
    assert!(matches!(err, EvalflowError::Config(_)), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Definition);
}

#[test]
fn zero_task_num_is_invalid_parallelism() {
    let err = validate("[run]\nhandler = \"h\"\n[step.ppl]\ntask_num = 0\n").unwrap_err();
    assert!(
        matches!(err, EvalflowError::InvalidParallelism { ref step, parallelism: 0 } if step == "ppl"),
        "{err:?}"
    );
}

#[test]
fn zero_concurrency_is_rejected() {
    let err = validate("[run]\nhandler = \"h\"\n[step.ppl]\nconcurrency = 0\n").unwrap_err();
    assert!(matches!(err, EvalflowError::Config(_)), "{err:?}");
}

#[test]
fn graph_errors_surface_at_load_time() {
    let err = validate(
        "[run]\nhandler = \"h\"\n[step.ppl]\nneeds = [\"cmp\"]\n[step.cmp]\nneeds = [\"ppl\"]\n",
    )
    .unwrap_err();
    assert!(matches!(err, EvalflowError::CyclicDependency(_)), "{err:?}");

    let err = validate("[run]\nhandler = \"h\"\n[step.cmp]\nneeds = [\"missing\"]\n").unwrap_err();
    assert!(matches!(err, EvalflowError::UnknownDependency { .. }), "{err:?}");
}

#[test]
fn empty_handler_and_bad_durations_are_rejected() {
    let err = validate("[run]\nhandler = \"  \"\n").unwrap_err();
    assert!(matches!(err, EvalflowError::Config(_)), "{err:?}");

    let err = validate("[run]\nhandler = \"h\"\n[config]\ntask_timeout = \"10 parsecs\"\n").unwrap_err();
    assert!(matches!(err, EvalflowError::Config(ref msg) if msg.contains("task_timeout")));
}

#[test]
fn zero_durations_are_rejected() {
    let err = validate("[run]\nhandler = \"h\"\n[config]\npoll_interval = \"0ms\"\n").unwrap_err();
    assert!(
        matches!(err, EvalflowError::Config(ref msg) if msg.contains("poll_interval")),
        "{err:?}"
    );

    let err = validate("[run]\nhandler = \"h\"\n[config]\ntask_timeout = \"0s\"\n").unwrap_err();
    assert!(
        matches!(err, EvalflowError::Config(ref msg) if msg.contains("task_timeout")),
        "{err:?}"
    );
}

#[test]
fn oversized_durations_are_errors_not_overflows() {
    assert!(parse_duration("10000000000000000h").is_err());
    assert!(parse_duration("400000000000000000m").is_err());
    assert_eq!(
        parse_duration("18446744073709551615s"),
        Ok(Duration::from_secs(u64::MAX))
    );

    let err = validate("[run]\nhandler = \"h\"\n[config]\ntask_timeout = \"10000000000000000h\"\n")
        .unwrap_err();
    assert!(matches!(err, EvalflowError::Config(ref msg) if msg.contains("too large")), "{err:?}");
}

#[test]
fn parse_duration_units() {
    assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
    assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
    assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
    assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("15").is_err());
    assert!(parse_duration("3d").is_err());
}

#[test]
fn workdir_loading_checks_directory_and_file() -> TestResult {
    let dir = tempfile::tempdir()?;

    let err = load_from_workdir(dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, EvalflowError::InvalidInput(_)), "{err:?}");

    let err = load_from_workdir(dir.path()).unwrap_err();
    assert!(matches!(err, EvalflowError::InvalidInput(ref m) if m.contains(CONFIG_FILE_NAME)));

    fs::write(dir.path().join(CONFIG_FILE_NAME), "[run]\nhandler = \"h\"\n")?;
    let cfg = load_from_workdir(dir.path())?;
    assert_eq!(cfg.run.handler, "h");
    Ok(())
}

#[test]
fn malformed_toml_is_a_toml_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join(CONFIG_FILE_NAME), "[run\nhandler = ")?;

    let err = load_from_workdir(dir.path()).unwrap_err();
    assert!(matches!(err, EvalflowError::Toml(_)), "{err:?}");
    Ok(())
}
