// tests/partition.rs

use std::error::Error;
use std::path::Path;

use evalflow::context::Context;
use evalflow::dag::{StepDef, partition, partition_step};
use evalflow::errors::EvalflowError;
use evalflow::handler::HandlerMethod;
use proptest::prelude::*;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn splits_a_step_into_indexed_contexts() -> TestResult {
    let step = StepDef::new("ppl", HandlerMethod::Ppl);
    let contexts = partition("job1", &step, 3, Path::new("/models/m"))?;

    assert_eq!(contexts.len(), 3);
    for (i, ctx) in contexts.iter().enumerate() {
        assert_eq!(ctx.job_id(), "job1");
        assert_eq!(ctx.step(), "ppl");
        assert_eq!(ctx.task_index(), i);
        assert_eq!(ctx.task_count(), 3);
        assert_eq!(ctx.workdir(), Path::new("/models/m"));
    }
    assert_eq!(contexts[1].to_string(), "ppl-1 (2/3)");
    Ok(())
}

#[test]
fn zero_parallelism_is_rejected() {
    let step = StepDef::new("ppl", HandlerMethod::Ppl);

    match partition("job1", &step, 0, Path::new(".")) {
        Err(EvalflowError::InvalidParallelism { step, parallelism }) => {
            assert_eq!(step, "ppl");
            assert_eq!(parallelism, 0);
        }
        other => panic!("expected InvalidParallelism, got {other:?}"),
    }
}

#[test]
fn partition_step_uses_declared_task_num() -> TestResult {
    let step = StepDef::new("cmp", HandlerMethod::Cmp).task_num(2);
    let contexts = partition_step("j", &step, Path::new("."))?;
    assert_eq!(contexts.len(), 2);
    Ok(())
}

#[test]
fn context_rejects_out_of_range_index() {
    let err = Context::new("j", "ppl", 2, 2, ".").unwrap_err();
    assert!(matches!(err, EvalflowError::InvalidInput(_)), "{err:?}");

    let err = Context::new("j", "ppl", 0, 0, ".").unwrap_err();
    assert!(matches!(err, EvalflowError::InvalidParallelism { .. }), "{err:?}");
}

proptest! {
    #[test]
    fn indices_cover_zero_to_k(k in 1usize..64) {
        let step = StepDef::new("ppl", HandlerMethod::Ppl);
        let contexts = partition("j", &step, k, Path::new(".")).unwrap();

        prop_assert_eq!(contexts.len(), k);
        let indices: Vec<usize> = contexts.iter().map(Context::task_index).collect();
        prop_assert_eq!(indices, (0..k).collect::<Vec<_>>());
        prop_assert!(contexts.iter().all(|c| c.task_count() == k));
    }
}
