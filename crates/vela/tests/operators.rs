//! Operator semantics: show, monadic binds, coercions, error locations,
//! pipes, and the early-return postfix.

mod common;

use common::*;
use vela::{ErrorKind, InfixOp, Pattern, PostfixOp, Value};

/// `show("hi")` is the string itself; String Show is identity.
#[test]
fn show_string_is_identity() {
    let decls = vec![call(ident("show"), vec![string("hi")])];
    assert_evals(decls, &Value::string("hi"));
}

/// `show([1,2])` renders through inspect: `[1, 2]`.
#[test]
fn show_list_renders_elements() {
    let decls = vec![call(ident("show"), vec![list(vec![int(1), int(2)])])];
    assert_evals(decls, &Value::string("[1, 2]"));
}

/// `[1,2] >>= (x) -> [x, x*10]` flattens to `[1, 10, 2, 20]`.
#[test]
fn list_bind_flattens() {
    let decls = vec![infix(
        InfixOp::Bind,
        list(vec![int(1), int(2)]),
        lambda(
            vec![param("x")],
            list(vec![ident("x"), infix(InfixOp::Mul, ident("x"), int(10))]),
        ),
    )];
    assert_evals(
        decls,
        &Value::List(
            vec![Value::Int(1), Value::Int(10), Value::Int(2), Value::Int(20)]
                .into_iter()
                .collect(),
        ),
    );
}

/// A user `Monad` instance overrides the built-in list bind.
#[test]
fn user_monad_instance_wins_over_primitive() {
    let decls = vec![
        instance(
            "Monad",
            vec!["List"],
            vec![("bind", fn_lit(None, vec![param("m"), param("f")], string("custom")))],
        ),
        infix(InfixOp::Bind, list(vec![int(1)]), lambda(vec![param("x")], ident("x"))),
    ];
    assert_evals(decls, &Value::string("custom"));
}

/// Int/Float coercion applies at arithmetic: `1 + 2.5 == 3.5`.
#[test]
fn int_float_coercion_in_arithmetic() {
    let decls = vec![infix(InfixOp::Add, int(1), float(2.5))];
    assert_evals(decls, &Value::Float(3.5));
}

/// Int/Float coercion applies at comparison: `1 == 1.0` under `==` even
/// though the values are not structurally equal.
#[test]
fn int_float_coercion_in_comparison() {
    let decls = vec![infix(InfixOp::Eq, int(1), float(1.0))];
    assert_evals(decls, &Value::Bool(true));
}

/// Int overflow promotes to BigInt instead of wrapping.
#[test]
fn int_overflow_promotes_to_bigint() {
    let decls = vec![infix(InfixOp::Mul, int(i64::MAX), int(2))];
    let result = run_program(decls).expect("should promote");
    assert!(matches!(result, Value::BigInt(_)), "got {}", result.inspect());
}

/// Division by zero reports the operator node's line and column 0.
#[test]
fn division_by_zero_reports_zero_column() {
    let decls = vec![at(
        7,
        13,
        vela::NodeKind::Infix {
            op: InfixOp::Div,
            left: int(1),
            right: int(0),
        },
    )];
    let err = run_program(decls).expect_err("division by zero");
    assert_eq!(err.kind, ErrorKind::DivisionByZero);
    let loc = err.loc.expect("location is tagged");
    assert_eq!(loc.line, 7);
    assert_eq!(loc.column, 0);
}

/// `++` concatenates lists and preserves the string shape.
#[test]
fn concat_preserves_string_shape() {
    let decls = vec![infix(InfixOp::Concat, string("ab"), string("cd"))];
    assert_evals(decls, &Value::string("abcd"));
}

/// `x :: xs` prepends.
#[test]
fn cons_prepends() {
    let decls = vec![infix(InfixOp::Cons, int(0), list(vec![int(1), int(2)]))];
    assert_evals(
        decls,
        &Value::List(vec![Value::Int(0), Value::Int(1), Value::Int(2)].into_iter().collect()),
    );
}

/// `x |> f` pipes into a call, appending when no placeholder is present and
/// replacing a `_` placeholder when one is.
#[test]
fn pipe_appends_or_replaces_placeholder() {
    let appended = vec![
        func("sub", vec![param("a"), param("b")], infix(InfixOp::Sub, ident("a"), ident("b"))),
        infix(InfixOp::Pipe, int(3), call(ident("sub"), vec![int(10)])),
    ];
    // sub(10, 3)
    assert_evals(appended, &Value::Int(7));

    let placed = vec![
        func("sub", vec![param("a"), param("b")], infix(InfixOp::Sub, ident("a"), ident("b"))),
        infix(InfixOp::Pipe, int(10), call(ident("sub"), vec![ident("_"), int(3)])),
    ];
    // sub(10, 3) again, via the placeholder
    assert_evals(placed, &Value::Int(7));
}

/// `|>>` additionally unwraps an Ok result and fails on Fail.
#[test]
fn pipe_unwrap_unwraps_ok_and_raises_on_fail() {
    let ok_case = vec![
        func("wrap", vec![param("x")], call(ident("Ok"), vec![ident("x")])),
        infix(InfixOp::PipeUnwrap, int(5), call(ident("wrap"), vec![])),
    ];
    assert_evals(ok_case, &Value::Int(5));

    let fail_case = vec![
        func("reject", vec![param("x")], call(ident("Fail"), vec![string("no")])),
        infix(InfixOp::PipeUnwrap, int(5), call(ident("reject"), vec![])),
    ];
    let err = run_program(fail_case).expect_err("Fail must raise through |>>");
    assert_eq!(err.kind, ErrorKind::Invalid);
}

/// `??` takes the right side for Nil and for None, unwraps Some, and passes
/// non-optional values through.
#[test]
fn null_coalesce_forms() {
    assert_evals(vec![infix(InfixOp::Coalesce, nil(), int(3))], &Value::Int(3));
    assert_evals(
        vec![infix(InfixOp::Coalesce, ident("None"), int(3))],
        &Value::Int(3),
    );
    assert_evals(
        vec![infix(InfixOp::Coalesce, call(ident("Some"), vec![int(2)]), int(3))],
        &Value::Int(2),
    );
    assert_evals(vec![infix(InfixOp::Coalesce, int(5), int(3))], &Value::Int(5));
}

/// Postfix `?` unwraps Ok inline and early-returns the original Fail from
/// the enclosing function.
#[test]
fn postfix_try_unwraps_or_early_returns() {
    let ok_body = infix(
        InfixOp::Add,
        postfix(PostfixOp::Try, call(ident("Ok"), vec![int(41)])),
        int(1),
    );
    let decls = vec![func("f", vec![], ok_body), call(ident("f"), vec![])];
    assert_evals(decls, &Value::Int(42));

    let fail_body = infix(
        InfixOp::Add,
        postfix(PostfixOp::Try, call(ident("Fail"), vec![string("boom")])),
        int(1),
    );
    let decls = vec![func("g", vec![], fail_body), call(ident("g"), vec![])];
    assert_evals(decls, &Value::fail(Value::string("boom")));
}

/// Match destructures tuples with exact arity and binds on success only.
#[test]
fn match_destructures_tuples() {
    let decls = vec![match_expr(
        tuple(vec![int(1), int(2)]),
        vec![
            arm(
                Pattern::Tuple(vec![Pattern::Int(9), Pattern::Ident("x".to_owned())]),
                string("first"),
            ),
            arm(
                Pattern::Tuple(vec![Pattern::Int(1), Pattern::Ident("x".to_owned())]),
                ident("x"),
            ),
        ],
    )];
    assert_evals(decls, &Value::Int(2));
}
