//! Shared helpers for integration tests: a tiny builder over the analyser's
//! node contract, so tests read close to the surface language.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};

use vela::{
    CodeLoc, CompClause, DispatchStrategy, FuncLit, InfixOp, InstanceDecl, Interp, MatchArm, Node,
    NodeId, NodeKind, NodeRef, Param, Pattern, PostfixOp, PrefixOp, RunResult, TraitDecl,
    TraitMethodDecl, TypeMap, TypeTerm, Value,
};

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

pub fn node(kind: NodeKind) -> NodeRef {
    at(1, 1, kind)
}

pub fn at(line: u32, column: u32, kind: NodeKind) -> NodeRef {
    Node::new(
        NodeId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
        CodeLoc::new(line, column),
        kind,
    )
}

pub fn program(decls: Vec<NodeRef>) -> NodeRef {
    node(NodeKind::Program { decls })
}

pub fn int(i: i64) -> NodeRef {
    node(NodeKind::IntLit(i))
}

pub fn float(f: f64) -> NodeRef {
    node(NodeKind::FloatLit(f))
}

pub fn boolean(b: bool) -> NodeRef {
    node(NodeKind::BoolLit(b))
}

pub fn string(s: &str) -> NodeRef {
    node(NodeKind::StringLit(s.to_owned()))
}

pub fn nil() -> NodeRef {
    node(NodeKind::NilLit)
}

pub fn ident(name: &str) -> NodeRef {
    node(NodeKind::Ident { name: name.to_owned() })
}

pub fn list(items: Vec<NodeRef>) -> NodeRef {
    node(NodeKind::ListLit { items })
}

pub fn tuple(items: Vec<NodeRef>) -> NodeRef {
    node(NodeKind::TupleLit { items })
}

pub fn call(target: NodeRef, args: Vec<NodeRef>) -> NodeRef {
    node(NodeKind::Call {
        target,
        args,
        witnesses: Vec::new(),
        instantiation: Vec::new(),
    })
}

pub fn call_with_witnesses(target: NodeRef, witnesses: Vec<NodeRef>, args: Vec<NodeRef>) -> NodeRef {
    node(NodeKind::Call {
        target,
        args,
        witnesses,
        instantiation: Vec::new(),
    })
}

pub fn infix(op: InfixOp, left: NodeRef, right: NodeRef) -> NodeRef {
    node(NodeKind::Infix { op, left, right })
}

pub fn prefix(op: PrefixOp, operand: NodeRef) -> NodeRef {
    node(NodeKind::Prefix { op, operand })
}

pub fn postfix(op: PostfixOp, operand: NodeRef) -> NodeRef {
    node(NodeKind::Postfix { op, operand })
}

pub fn block(stmts: Vec<NodeRef>) -> NodeRef {
    node(NodeKind::Block { stmts })
}

pub fn declare(name: &str, annotation: Option<TypeTerm>, value: NodeRef) -> NodeRef {
    node(NodeKind::Declare {
        name: name.to_owned(),
        annotation,
        value,
    })
}

pub fn assign(name: &str, value: NodeRef) -> NodeRef {
    node(NodeKind::Assign {
        target: ident(name),
        value,
    })
}

pub fn annotated(expr: NodeRef, ty: TypeTerm) -> NodeRef {
    node(NodeKind::Annotated { expr, ty })
}

pub fn iff(cond: NodeRef, then: NodeRef, alt: Option<NodeRef>) -> NodeRef {
    node(NodeKind::If { cond, then, alt })
}

pub fn ret(value: NodeRef) -> NodeRef {
    node(NodeKind::Return { value: Some(value) })
}

pub fn param(name: &str) -> Param {
    Param {
        name: name.to_owned(),
        default: None,
        variadic: false,
    }
}

pub fn param_default(name: &str, default: NodeRef) -> Param {
    Param {
        name: name.to_owned(),
        default: Some(default),
        variadic: false,
    }
}

pub fn param_variadic(name: &str) -> Param {
    Param {
        name: name.to_owned(),
        default: None,
        variadic: true,
    }
}

pub fn fn_lit(name: Option<&str>, params: Vec<Param>, body: NodeRef) -> FuncLit {
    FuncLit {
        name: name.map(str::to_owned),
        params,
        witness_params: Vec::new(),
        return_type: None,
        body,
    }
}

pub fn fn_lit_with_witnesses(
    witness_params: Vec<&str>,
    params: Vec<Param>,
    body: NodeRef,
) -> FuncLit {
    FuncLit {
        name: None,
        params,
        witness_params: witness_params.into_iter().map(str::to_owned).collect(),
        return_type: None,
        body,
    }
}

pub fn lambda(params: Vec<Param>, body: NodeRef) -> NodeRef {
    node(NodeKind::Lambda(fn_lit(None, params, body)))
}

pub fn func(name: &str, params: Vec<Param>, body: NodeRef) -> NodeRef {
    node(NodeKind::FuncStmt {
        name: name.to_owned(),
        func: fn_lit(Some(name), params, body),
    })
}

pub fn con(name: &str) -> TypeTerm {
    TypeTerm::con(name)
}

pub fn app(head: &str, args: Vec<TypeTerm>) -> TypeTerm {
    TypeTerm::app(head, args)
}

pub fn trait_decl(name: &str, type_params: Vec<&str>, methods: Vec<TraitMethodDecl>) -> NodeRef {
    node(NodeKind::TraitDecl(TraitDecl {
        name: name.to_owned(),
        type_params: type_params.into_iter().map(str::to_owned).collect(),
        supers: Vec::new(),
        methods,
    }))
}

pub fn method_decl(name: &str, arity: usize) -> TraitMethodDecl {
    TraitMethodDecl {
        name: name.to_owned(),
        arity,
        operator: None,
        default: None,
    }
}

pub fn instance(trait_name: &str, type_key: Vec<&str>, methods: Vec<(&str, FuncLit)>) -> NodeRef {
    node(NodeKind::InstanceDecl(InstanceDecl {
        trait_name: trait_name.to_owned(),
        type_key: type_key.into_iter().map(str::to_owned).collect(),
        methods: methods.into_iter().map(|(n, f)| (n.to_owned(), f)).collect(),
    }))
}

pub fn match_expr(subject: NodeRef, arms: Vec<MatchArm>) -> NodeRef {
    node(NodeKind::Match { subject, arms })
}

pub fn arm(pattern: Pattern, body: NodeRef) -> MatchArm {
    MatchArm {
        pattern,
        guard: None,
        body,
    }
}

pub fn for_loop(pattern: Pattern, iterable: NodeRef, body: NodeRef) -> NodeRef {
    node(NodeKind::For {
        pattern,
        iterable,
        body,
    })
}

pub fn range(start: NodeRef, end: NodeRef, inclusive: bool) -> NodeRef {
    node(NodeKind::Range {
        start,
        end,
        step: None,
        inclusive,
    })
}

pub fn comprehension(element: NodeRef, clauses: Vec<CompClause>) -> NodeRef {
    node(NodeKind::ListComp { element, clauses })
}

pub fn generator(pattern: Pattern, iterable: NodeRef) -> CompClause {
    CompClause::Generator { pattern, iterable }
}

pub fn record(name: Option<&str>, fields: Vec<(&str, NodeRef)>) -> NodeRef {
    node(NodeKind::RecordLit {
        name: name.map(str::to_owned),
        spread: None,
        fields: fields.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
    })
}

pub fn record_spread(base: NodeRef, fields: Vec<(&str, NodeRef)>) -> NodeRef {
    node(NodeKind::RecordLit {
        name: None,
        spread: Some(base),
        fields: fields.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
    })
}

/// Runs a program made of the given declarations and returns its last value.
pub fn run_program(decls: Vec<NodeRef>) -> RunResult<Value> {
    let mut interp = Interp::new(TypeMap::new(), DispatchStrategy::new());
    interp.run(&program(decls))
}

/// Asserts the program evaluates to the expected value.
pub fn assert_evals(decls: Vec<NodeRef>, expected: &Value) {
    let result = run_program(decls).expect("program should evaluate");
    assert!(
        result.value_eq(expected),
        "expected {}, got {}",
        expected.inspect(),
        result.inspect()
    );
}
