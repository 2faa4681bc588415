// tests/dag_graph.rs

use std::collections::HashMap;
use std::error::Error;

use evalflow::dag::{DagGraph, StepDef, StepRegistry};
use evalflow::errors::EvalflowError;
use evalflow::handler::HandlerMethod;
use evalflow_test_utils::builders::{graph_of, registry_of};
use proptest::prelude::*;

type TestResult = Result<(), Box<dyn Error>>;

fn ppl(name: &str) -> StepDef {
    StepDef::new(name, HandlerMethod::Ppl)
}

fn cmp(name: &str) -> StepDef {
    StepDef::new(name, HandlerMethod::Cmp)
}

#[test]
fn default_pipeline_runs_ppl_before_cmp() -> TestResult {
    let graph = DagGraph::build(&StepRegistry::default_pipeline())?;

    assert_eq!(graph.order_names(), vec!["ppl", "cmp"]);
    assert_eq!(graph.dependencies_of("cmp"), ["ppl".to_string()]);
    assert_eq!(graph.dependents_of("ppl"), ["cmp".to_string()]);
    assert!(graph.dependencies_of("ppl").is_empty());
    Ok(())
}

#[test]
fn order_follows_needs_not_declaration() {
    // Declared dependent-first.
    let graph = graph_of(vec![cmp("report").needs(["infer"]), ppl("infer")]);
    assert_eq!(graph.order_names(), vec!["infer", "report"]);
}

#[test]
fn ties_are_broken_by_declaration_order() {
    let steps = || {
        vec![
            ppl("b"),
            ppl("a"),
            cmp("join").needs(["a", "b"]),
            ppl("c"),
        ]
    };

    let first = graph_of(steps()).order_names();
    let second = graph_of(steps()).order_names();

    assert_eq!(first, vec!["b", "a", "join", "c"]);
    assert_eq!(first, second);
}

#[test]
fn diamond_keeps_every_need_ahead_of_its_step() {
    let graph = graph_of(vec![
        ppl("load"),
        ppl("left").needs(["load"]),
        ppl("right").needs(["load"]),
        cmp("merge").needs(["left", "right"]),
    ]);

    assert_eq!(graph.order_names(), vec!["load", "left", "right", "merge"]);
    assert_eq!(
        graph.dependents_of("load"),
        ["left".to_string(), "right".to_string()]
    );
}

#[test]
fn unknown_dependency_is_rejected() {
    let registry = registry_of(vec![ppl("ppl"), cmp("cmp").needs(["pp1"])]);

    match DagGraph::build(&registry) {
        Err(EvalflowError::UnknownDependency { step, dependency }) => {
            assert_eq!(step, "cmp");
            assert_eq!(dependency, "pp1");
        }
        other => panic!("expected UnknownDependency, got {other:?}"),
    }
}

#[test]
fn cycle_is_rejected() {
    let registry = registry_of(vec![
        ppl("a").needs(["c"]),
        ppl("b").needs(["a"]),
        ppl("c").needs(["b"]),
    ]);

    let err = DagGraph::build(&registry).unwrap_err();
    assert!(matches!(err, EvalflowError::CyclicDependency(_)), "{err:?}");
}

#[test]
fn self_dependency_is_a_cycle() {
    let registry = registry_of(vec![ppl("loop").needs(["loop"])]);

    match DagGraph::build(&registry) {
        Err(EvalflowError::CyclicDependency(step)) => assert_eq!(step, "loop"),
        other => panic!("expected CyclicDependency, got {other:?}"),
    }
}

#[test]
fn duplicate_registration_fails_and_keeps_the_first() -> TestResult {
    let mut registry = StepRegistry::new();
    registry.register(ppl("ppl").task_num(4))?;

    let err = registry.register(ppl("ppl")).unwrap_err();
    assert!(matches!(err, EvalflowError::DuplicateStep(ref name) if name == "ppl"));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("ppl").map(|s| s.task_num), Some(4));
    Ok(())
}

#[test]
fn repeated_needs_are_deduplicated() {
    let graph = graph_of(vec![ppl("a"), cmp("b").needs(["a", "a"])]);
    assert_eq!(graph.dependencies_of("b"), ["a".to_string()]);
    assert_eq!(graph.dependents_of("a"), ["b".to_string()]);
}

// Acyclic by construction: step i may only need steps 0..i.
fn acyclic_steps(max: usize) -> impl Strategy<Value = Vec<StepDef>> {
    (1..=max).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n).prop_map(
            move |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let needs: Vec<String> = if i == 0 {
                            Vec::new()
                        } else {
                            picks.iter().map(|p| format!("s{}", p % i)).collect()
                        };
                        ppl(&format!("s{i}")).needs(needs)
                    })
                    .collect()
            },
        )
    })
}

proptest! {
    #[test]
    fn every_step_comes_after_its_needs(steps in acyclic_steps(12)) {
        let graph = graph_of(steps.clone());
        let order = graph.order_names();
        prop_assert_eq!(order.len(), steps.len());

        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect();
        for step in steps.iter() {
            for need in step.needs.iter() {
                prop_assert!(position[need.as_str()] < position[step.name.as_str()]);
            }
        }
    }

    #[test]
    fn order_is_deterministic(steps in acyclic_steps(12)) {
        prop_assert_eq!(graph_of(steps.clone()).order_names(), graph_of(steps).order_names());
    }
}
