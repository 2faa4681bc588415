// tests/resource_spec.rs

use std::error::Error;

use evalflow::errors::{ErrorKind, EvalflowError};
use evalflow::job::ResourceRequest;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn parses_name_count_pairs_in_order() -> TestResult {
    let req = ResourceRequest::parse("cpu:1, gpu:2")?;

    assert_eq!(req.get("cpu"), Some(1));
    assert_eq!(req.get("gpu"), Some(2));
    assert_eq!(req.get("tpu"), None);
    let names: Vec<&str> = req.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["cpu", "gpu"]);
    assert_eq!(req.to_string(), "cpu:1,gpu:2");
    Ok(())
}

#[test]
fn from_str_matches_parse() -> TestResult {
    let req: ResourceRequest = "mem_gb:16".parse()?;
    assert_eq!(req.get("mem_gb"), Some(16));
    Ok(())
}

#[test]
fn malformed_specs_are_input_errors() {
    for spec in ["", "cpu", "cpu:", ":1", "cpu:one", "cpu:1,", "cpu:-1", "1cpu:1", "cpu:1;gpu:1"] {
        let err = ResourceRequest::parse(spec).unwrap_err();
        assert!(matches!(err, EvalflowError::ResourceSpec { .. }), "{spec}: {err:?}");
        assert_eq!(err.kind(), ErrorKind::Input);
    }
}

#[test]
fn zero_counts_and_repeats_are_rejected() {
    let err = ResourceRequest::parse("gpu:0").unwrap_err();
    assert!(matches!(err, EvalflowError::ResourceSpec { ref reason, .. } if reason.contains(">= 1")));

    let err = ResourceRequest::parse("cpu:1,cpu:2").unwrap_err();
    assert!(matches!(err, EvalflowError::ResourceSpec { ref reason, .. } if reason.contains("more than once")));
}
