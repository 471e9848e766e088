//! Loops, comprehensions, ranges, match, and the loop signals.

mod common;

use common::*;
use vela::{CompClause, InfixOp, NodeKind, Pattern, Value};

/// A for loop over a range accumulates through rebinding assignment.
#[test]
fn for_loop_accumulates_over_range() {
    let decls = vec![
        declare("total", None, int(0)),
        for_loop(
            Pattern::Ident("i".to_owned()),
            range(int(1), int(4), true),
            assign("total", infix(InfixOp::Add, ident("total"), ident("i"))),
        ),
        ident("total"),
    ];
    assert_evals(decls, &Value::Int(10));
}

/// `break` with a value becomes the loop's result.
#[test]
fn break_value_is_loop_result() {
    let decls = vec![for_loop(
        Pattern::Ident("i".to_owned()),
        range(int(1), int(100), false),
        iff(
            infix(InfixOp::Eq, ident("i"), int(5)),
            node(NodeKind::Break {
                value: Some(ident("i")),
            }),
            None,
        ),
    )];
    assert_evals(decls, &Value::Int(5));
}

/// `continue` skips to the next iteration.
#[test]
fn continue_skips_iteration() {
    let decls = vec![
        declare("total", None, int(0)),
        for_loop(
            Pattern::Ident("i".to_owned()),
            range(int(1), int(5), true),
            block(vec![
                iff(
                    infix(InfixOp::Eq, ident("i"), int(3)),
                    node(NodeKind::Continue),
                    None,
                ),
                assign("total", infix(InfixOp::Add, ident("total"), ident("i"))),
            ]),
        ),
        ident("total"),
    ];
    // 1 + 2 + 4 + 5
    assert_evals(decls, &Value::Int(12));
}

/// A comprehension with a generator and a filter.
#[test]
fn comprehension_with_filter() {
    let decls = vec![comprehension(
        infix(InfixOp::Mul, ident("x"), int(2)),
        vec![
            generator(Pattern::Ident("x".to_owned()), range(int(1), int(3), true)),
            CompClause::Filter(infix(InfixOp::Ne, ident("x"), int(2))),
        ],
    )];
    assert_evals(
        decls,
        &Value::List(vec![Value::Int(2), Value::Int(6)].into_iter().collect()),
    );
}

/// A destructuring generator drops non-matching elements without error.
#[test]
fn comprehension_generator_skips_match_failures() {
    let decls = vec![comprehension(
        ident("a"),
        vec![generator(
            Pattern::Tuple(vec![Pattern::Ident("a".to_owned()), Pattern::Int(1)]),
            list(vec![
                tuple(vec![int(10), int(1)]),
                tuple(vec![int(20), int(2)]),
                tuple(vec![int(30), int(1)]),
            ]),
        )],
    )];
    assert_evals(
        decls,
        &Value::List(vec![Value::Int(10), Value::Int(30)].into_iter().collect()),
    );
}

/// Nested generators multiply out in order.
#[test]
fn comprehension_nested_generators() {
    let decls = vec![comprehension(
        tuple(vec![ident("x"), ident("y")]),
        vec![
            generator(Pattern::Ident("x".to_owned()), range(int(1), int(2), true)),
            generator(Pattern::Ident("y".to_owned()), range(int(1), int(2), true)),
        ],
    )];
    let result = run_program(decls).expect("program should evaluate");
    let Value::List(list) = &result else { panic!("expected list") };
    assert_eq!(list.len(), 4);
    assert!(list.get(1).unwrap().value_eq(&Value::Tuple(std::sync::Arc::new(vec![
        Value::Int(1),
        Value::Int(2)
    ]))));
}

/// Match guards gate arms; an exhausted match is a PatternMatchFailed error.
#[test]
fn match_guard_and_exhaustion() {
    let guarded = vec![
        declare("x", None, int(10)),
        match_expr(
            ident("x"),
            vec![
                vela::MatchArm {
                    pattern: Pattern::Ident("n".to_owned()),
                    guard: Some(infix(InfixOp::Gt, ident("n"), int(5))),
                    body: string("big"),
                },
                arm(Pattern::Wildcard, string("small")),
            ],
        ),
    ];
    assert_evals(guarded, &Value::string("big"));

    let exhausted = vec![match_expr(int(3), vec![arm(Pattern::Int(1), string("one"))])];
    let err = run_program(exhausted).expect_err("no arm matches");
    assert_eq!(err.kind, vela::ErrorKind::PatternMatchFailed);
}

/// Pattern assignment binds on success and errors on failure.
#[test]
fn pattern_assignment_binds_or_errors() {
    let ok = vec![
        node(NodeKind::PatternAssign {
            pattern: Pattern::Tuple(vec![Pattern::Ident("a".to_owned()), Pattern::Ident("b".to_owned())]),
            value: tuple(vec![int(1), int(2)]),
        }),
        infix(InfixOp::Add, ident("a"), ident("b")),
    ];
    assert_evals(ok, &Value::Int(3));

    let bad = vec![node(NodeKind::PatternAssign {
        pattern: Pattern::List(vec![Pattern::Ident("a".to_owned())]),
        value: list(vec![int(1), int(2)]),
    })];
    let err = run_program(bad).expect_err("arity mismatch in pattern");
    assert_eq!(err.kind, vela::ErrorKind::PatternMatchFailed);
}

/// Blocks scope their declarations: names defined inside do not leak out.
#[test]
fn block_scopes_declarations() {
    let decls = vec![
        block(vec![declare("inner", None, int(1)), ident("inner")]),
        ident("inner"),
    ];
    let err = run_program(decls).expect_err("inner should be out of scope");
    assert_eq!(err.kind, vela::ErrorKind::UnknownIdentifier);
}
