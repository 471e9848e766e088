//! Multi-parameter trait dispatch: instance keys combine argument and result
//! types, so one call site can resolve differently under different expected
//! types.

mod common;

use common::*;
use vela::{InfixOp, Value};

/// `Converter<Int, String>` and `Converter<Int, Int>`: same argument type,
/// different result types.
fn converter_decls() -> Vec<vela::NodeRef> {
    vec![
        trait_decl("Converter", vec!["a", "b"], vec![method_decl("convert", 1)]),
        instance(
            "Converter",
            vec!["Int", "String"],
            vec![("convert", fn_lit(None, vec![param("v")], string("int_to_string")))],
        ),
        instance(
            "Converter",
            vec!["Int", "Int"],
            vec![(
                "convert",
                fn_lit(None, vec![param("v")], infix(InfixOp::Add, ident("v"), int(1))),
            )],
        ),
    ]
}

/// `s : String :- convert(10)` resolves the `Int_String` key.
#[test]
fn convert_to_string_uses_arg_and_return_key() {
    let mut decls = converter_decls();
    decls.push(declare("s", Some(con("String")), call(ident("convert"), vec![int(10)])));
    decls.push(ident("s"));
    assert_evals(decls, &Value::string("int_to_string"));
}

/// `i : Int :- convert(10)` resolves the `Int_Int` key and computes 11.
#[test]
fn convert_to_int_uses_arg_and_return_key() {
    let mut decls = converter_decls();
    decls.push(declare("i", Some(con("Int")), call(ident("convert"), vec![int(10)])));
    decls.push(ident("i"));
    assert_evals(decls, &Value::Int(11));
}

/// A mismatched argument type finds no instance and reports the trait, type,
/// and method in the error.
#[test]
fn convert_with_unknown_argument_type_errors() {
    let mut decls = converter_decls();
    decls.push(declare("x", Some(con("String")), call(ident("convert"), vec![boolean(true)])));
    let err = run_program(decls).expect_err("no Bool instance");
    assert_eq!(err.kind, vela::ErrorKind::NoImplementation);
    assert!(err.message.contains("Converter"));
    assert!(err.message.contains("convert"));
}

/// Fuzzy matching tolerates a type-variable part: an instance keyed
/// `Int_anything` (lowercase part) accepts any context.
#[test]
fn type_variable_key_part_matches_any_context() {
    let decls = vec![
        trait_decl("Tagger", vec!["a", "b"], vec![method_decl("tag", 1)]),
        instance(
            "Tagger",
            vec!["Int", "b"],
            vec![("tag", fn_lit(None, vec![param("v")], string("tagged")))],
        ),
        declare("r", Some(con("Float")), call(ident("tag"), vec![int(7)])),
        ident("r"),
    ];
    assert_evals(decls, &Value::string("tagged"));
}
