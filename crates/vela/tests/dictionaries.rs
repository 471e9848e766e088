//! Dictionaries: explicit witness dispatch, placeholder stripping,
//! witness-parameter binding, and super-trait chaining.

mod common;

use std::sync::Arc;

use common::*;
use vela::{Dictionary, DispatchStrategy, Interp, NodeKind, TraitDecl, TypeMap, Value};

/// Declares `Greeter` with Int and String instances and returns an
/// interpreter that has evaluated them.
fn greeter_interp() -> Interp {
    let mut interp = Interp::new(TypeMap::new(), DispatchStrategy::new());
    let decls = vec![
        trait_decl("Greeter", vec!["a"], vec![method_decl("greet", 1)]),
        instance(
            "Greeter",
            vec!["Int"],
            vec![("greet", fn_lit(None, vec![param("x")], string("int-greet")))],
        ),
        instance(
            "Greeter",
            vec!["String"],
            vec![("greet", fn_lit(None, vec![param("x")], string("string-greet")))],
        ),
    ];
    interp.run(&program(decls)).expect("declarations evaluate");
    interp
}

/// An explicit dictionary passed as a call witness overrides argument-based
/// dispatch: the Int argument still runs the String instance's method.
#[test]
fn explicit_dictionary_overrides_argument_dispatch() {
    let mut interp = greeter_interp();
    let dict = interp.with_registry(|r| r.build_dictionary("Greeter", "String")).unwrap();
    interp.global_env().define("string_greeter", Value::Dictionary(dict));
    let result = interp
        .run(&program(vec![call_with_witnesses(
            ident("greet"),
            vec![ident("string_greeter")],
            vec![int(5)],
        )]))
        .expect("dispatch succeeds");
    assert!(result.value_eq(&Value::string("string-greet")));
}

/// A `$placeholder` witness is always stripped; dispatch proceeds on the
/// arguments as if it were never passed.
#[test]
fn placeholder_witness_is_stripped() {
    let mut interp = greeter_interp();
    interp.global_env().define(
        "hole",
        Value::Dictionary(Arc::new(Dictionary {
            trait_name: "$placeholder".to_owned(),
            methods: Vec::new(),
            supers: Vec::new(),
        })),
    );
    let result = interp
        .run(&program(vec![call_with_witnesses(
            ident("greet"),
            vec![ident("hole")],
            vec![int(5)],
        )]))
        .expect("dispatch succeeds");
    assert!(result.value_eq(&Value::string("int-greet")));
}

/// A dictionary whose slot for the method is unimplemented is stripped and
/// dispatch falls through to the argument-based candidate.
#[test]
fn dictionary_with_dead_slot_is_stripped() {
    let mut interp = greeter_interp();
    // A dictionary for a different trait entirely: no greet slot.
    interp
        .run(&program(vec![trait_decl(
            "Other",
            vec!["a"],
            vec![method_decl("other", 1)],
        )]))
        .expect("trait declares");
    let dict = interp.with_registry(|r| r.build_dictionary("Other", "Int")).unwrap();
    interp.global_env().define("other_dict", Value::Dictionary(dict));
    let result = interp
        .run(&program(vec![call_with_witnesses(
            ident("greet"),
            vec![ident("other_dict")],
            vec![int(5)],
        )]))
        .expect("dispatch succeeds");
    assert!(result.value_eq(&Value::string("int-greet")));
}

/// Calling an unimplemented dictionary slot surfaces its stored error.
#[test]
fn invoking_dead_slot_surfaces_no_implementation() {
    let mut interp = greeter_interp();
    interp
        .run(&program(vec![node(NodeKind::TraitDecl(TraitDecl {
            name: "Empty".to_owned(),
            type_params: vec!["a".to_owned()],
            supers: vec![],
            methods: vec![method_decl("nothing", 1)],
        }))]))
        .expect("trait declares");
    let dict = interp.with_registry(|r| r.build_dictionary("Empty", "Int")).unwrap();
    let slot = dict.method("nothing").expect("slot exists").clone();
    let err = interp.apply_value(slot, vec![Value::Int(1)]).expect_err("slot holds an error");
    assert_eq!(err.kind, vela::ErrorKind::NoImplementation);
}

/// Leading dictionaries bind to witness parameters; a missing trailing
/// witness is extracted from the first dictionary's super list.
#[test]
fn witness_params_bind_with_super_extraction() {
    let mut interp = Interp::new(TypeMap::new(), DispatchStrategy::new());
    let decls = vec![
        trait_decl("Base", vec!["a"], vec![method_decl("base", 1)]),
        node(NodeKind::TraitDecl(TraitDecl {
            name: "Derived".to_owned(),
            type_params: vec!["a".to_owned()],
            supers: vec!["Base".to_owned()],
            methods: vec![method_decl("derived", 1)],
        })),
        instance(
            "Base",
            vec!["Int"],
            vec![("base", fn_lit(None, vec![param("x")], string("base")))],
        ),
        instance(
            "Derived",
            vec!["Int"],
            vec![("derived", fn_lit(None, vec![param("x")], string("derived")))],
        ),
    ];
    interp.run(&program(decls)).expect("declarations evaluate");
    let dict = interp.with_registry(|r| r.build_dictionary("Derived", "Int")).unwrap();
    assert_eq!(dict.supers.len(), 1);
    interp.global_env().define("derived_dict", Value::Dictionary(dict));

    // The function declares two witness parameters; only one dictionary is
    // passed, so the second fills from the first's supers.
    let lit = fn_lit_with_witnesses(vec!["d0", "d1"], vec![], ident("d1"));
    interp.global_env().define(
        "probe",
        Value::Function(Arc::new(vela::Function {
            name: Some("probe".to_owned()),
            params: lit.params.clone(),
            witness_params: lit.witness_params.clone(),
            return_type: None,
            body: lit.body.clone(),
            env: interp.global_env().clone(),
            captured_witnesses: None,
            loc: vela::CodeLoc::default(),
        })),
    );
    let result = interp
        .run(&program(vec![call_with_witnesses(
            ident("probe"),
            vec![ident("derived_dict")],
            vec![],
        )]))
        .expect("probe runs");
    let Value::Dictionary(super_dict) = &result else {
        panic!("expected the super dictionary, got {}", result.inspect());
    };
    assert_eq!(super_dict.trait_name, "Base");
}
