//! Context-driven trait dispatch: implementations selected by the expected
//! result type rather than by argument types.

mod common;

use common::*;
use std::sync::Arc;
use vela::{DispatchStrategy, EvalTracer, Interp, RecordingTracer, TraceEvent, TypeMap, Value};

/// A `Producer` trait with nullary `produce`, instances for Int and String.
fn producer_decls() -> Vec<vela::NodeRef> {
    vec![
        trait_decl("Producer", vec!["a"], vec![method_decl("produce", 0)]),
        instance("Producer", vec!["Int"], vec![("produce", fn_lit(None, vec![], int(42)))]),
        instance(
            "Producer",
            vec!["String"],
            vec![("produce", fn_lit(None, vec![], string("test")))],
        ),
    ]
}

/// `i : Int :- produce()` selects the Int instance.
#[test]
fn annotated_declaration_drives_nullary_dispatch_to_int() {
    let mut decls = producer_decls();
    decls.push(declare("i", Some(con("Int")), call(ident("produce"), vec![])));
    decls.push(ident("i"));
    assert_evals(decls, &Value::Int(42));
}

/// `s : String :- produce()` selects the String instance.
#[test]
fn annotated_declaration_drives_nullary_dispatch_to_string() {
    let mut decls = producer_decls();
    decls.push(declare("s", Some(con("String")), call(ident("produce"), vec![])));
    decls.push(ident("s"));
    assert_evals(decls, &Value::string("test"));
}

/// An annotated expression that evaluates to a nullary class method invokes
/// it immediately under the annotation's context.
#[test]
fn annotated_nullary_class_method_is_invoked() {
    let mut decls = producer_decls();
    decls.push(annotated(ident("produce"), con("Int")));
    assert_evals(decls, &Value::Int(42));
}

/// `pure(42) : Option<Int>` produces `Some(42)`; the argument-based candidate
/// is suppressed for `Applicative.pure`.
#[test]
fn pure_dispatches_into_option_context() {
    let decls = vec![
        instance(
            "Applicative",
            vec!["Option"],
            vec![("pure", fn_lit(None, vec![param("v")], call(ident("Some"), vec![ident("v")])))],
        ),
        instance(
            "Applicative",
            vec!["List"],
            vec![("pure", fn_lit(None, vec![param("v")], list(vec![ident("v")])))],
        ),
        annotated(call(ident("pure"), vec![int(42)]), app("Option", vec![con("Int")])),
    ];
    assert_evals(decls, &Value::some(Value::Int(42)));
}

/// `pure(42) : List<Int>` produces `[42]` from the same registrations.
#[test]
fn pure_dispatches_into_list_context() {
    let decls = vec![
        instance(
            "Applicative",
            vec!["Option"],
            vec![("pure", fn_lit(None, vec![param("v")], call(ident("Some"), vec![ident("v")])))],
        ),
        instance(
            "Applicative",
            vec!["List"],
            vec![("pure", fn_lit(None, vec![param("v")], list(vec![ident("v")])))],
        ),
        annotated(call(ident("pure"), vec![int(42)]), app("List", vec![con("Int")])),
    ];
    assert_evals(decls, &Value::List(vec![Value::Int(42)].into_iter().collect()));
}

/// For fixed registries and contexts, value-equal calls select the same
/// implementation: the dispatcher's decisions are reproducible.
#[test]
fn dispatch_is_deterministic_across_identical_calls() {
    let tracer = Arc::new(RecordingTracer::new());
    let mut interp = Interp::new(TypeMap::new(), DispatchStrategy::new());
    interp.set_tracer(Arc::clone(&tracer) as Arc<dyn EvalTracer>);

    let mut decls = producer_decls();
    decls.push(declare("a", Some(con("Int")), call(ident("produce"), vec![])));
    decls.push(declare("b", Some(con("Int")), call(ident("produce"), vec![])));
    interp.run(&program(decls)).expect("program should evaluate");

    let dispatches: Vec<TraceEvent> = tracer.dispatches();
    let produce_picks: Vec<&TraceEvent> = dispatches
        .iter()
        .filter(|e| matches!(e, TraceEvent::Dispatch { method, .. } if method == "produce"))
        .collect();
    assert_eq!(produce_picks.len(), 2);
    assert_eq!(produce_picks[0], produce_picks[1]);
}

/// Without any context, a nullary method falls back to the registered
/// instances deterministically (registration order).
#[test]
fn nullary_dispatch_without_context_is_stable() {
    let mut decls = producer_decls();
    decls.push(call(ident("produce"), vec![]));
    assert_evals(decls, &Value::Int(42));
}

/// A user-defined trait default fills in when no instance exists, and is
/// JIT-registered for the context type: the second call resolves through the
/// instance table instead of the default lookup.
#[test]
fn trait_default_applies_and_jit_registers() {
    let tracer = Arc::new(RecordingTracer::new());
    let mut interp = Interp::new(TypeMap::new(), DispatchStrategy::new());
    interp.set_tracer(Arc::clone(&tracer) as Arc<dyn EvalTracer>);

    let fall_decl = vela::TraitMethodDecl {
        name: "fall".to_owned(),
        arity: 0,
        operator: None,
        default: Some(fn_lit(None, vec![], int(7))),
    };
    let decls = vec![
        trait_decl("Fallback", vec!["a"], vec![fall_decl]),
        declare("a", Some(con("Int")), call(ident("fall"), vec![])),
        declare("b", Some(con("Int")), call(ident("fall"), vec![])),
        ident("b"),
    ];
    let result = interp.run(&program(decls)).expect("program should evaluate");
    assert!(result.value_eq(&Value::Int(7)));

    let paths: Vec<String> = tracer
        .dispatches()
        .into_iter()
        .filter_map(|e| match e {
            TraceEvent::Dispatch { method, path, .. } if method == "fall" => Some(path.to_owned()),
            _ => None,
        })
        .collect();
    assert_eq!(paths.first().map(String::as_str), Some("default"));
    assert_ne!(paths.get(1).map(String::as_str), Some("default"));
}
