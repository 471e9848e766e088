//! The evaluator driver: a recursive walk over the typed AST.
//!
//! Every entry checks cancellation, counts recursion depth against the
//! configured bound, and tracks the current call node and environment so the
//! dispatcher can read annotation and type-map information. Control flow
//! (return, break, continue, tail calls) travels as signal values on the
//! normal return path and is unwrapped at its boundary.

use std::sync::Arc;

use crate::{
    ast::{CompClause, FuncLit, Node, NodeKind, NodeRef, TypeDeclBody},
    env::Env,
    error::{RunError, RunResult},
    pattern::match_pattern,
    registry::{MethodTable, TraitInfo, TraitMethod},
    run::Interp,
    tracer::TraceEvent,
    typesys::TypeTerm,
    value::{
        AdtInstance, ClassMethod, Constructor, Function, PartialApp, RangeValue, Signal, TailCall,
        Value,
    },
    witness::WitnessFrame,
};

impl Interp {
    /// Evaluates a node in non-tail position.
    pub(crate) fn eval(&mut self, node: &NodeRef, env: &Env) -> RunResult<Value> {
        self.eval_entry(node, env, false)
    }

    /// Evaluates a node, preserving the caller's tail position.
    pub(crate) fn eval_tail(&mut self, node: &NodeRef, env: &Env) -> RunResult<Value> {
        self.eval_entry(node, env, self.in_tail)
    }

    /// Evaluates a function body: the body itself is in tail position.
    pub(crate) fn eval_fn_body(&mut self, node: &NodeRef, env: &Env) -> RunResult<Value> {
        self.eval_entry(node, env, true)
    }

    fn eval_entry(&mut self, node: &NodeRef, env: &Env, tail: bool) -> RunResult<Value> {
        self.check_cancelled()?;
        self.depth += 1;
        if self.depth > self.max_recursion() {
            self.depth -= 1;
            return Err(RunError::max_recursion(self.max_recursion()).with_loc(node.loc));
        }
        let saved_tail = self.in_tail;
        self.in_tail = tail;
        let result = self.eval_inner(node, env);
        self.in_tail = saved_tail;
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, node: &NodeRef, env: &Env) -> RunResult<Value> {
        self.tracer.event(TraceEvent::Enter {
            node: node.kind.describe(),
            line: node.loc.line,
        });
        match &node.kind {
            NodeKind::Program { decls } => {
                let mut last = Value::Nil;
                for decl in decls {
                    last = self.eval(decl, env)?;
                    if matches!(last, Value::Signal(_)) {
                        break;
                    }
                }
                Ok(last)
            }
            // Module linking belongs to the host; by the time a tree reaches
            // the engine its imports are already bound.
            NodeKind::Import { .. } => Ok(Value::Nil),

            NodeKind::TypeDecl(decl) => {
                self.eval_type_decl(decl, env)?;
                Ok(Value::Nil)
            }
            NodeKind::TraitDecl(decl) => {
                self.eval_trait_decl(decl, env)?;
                Ok(Value::Nil)
            }
            NodeKind::InstanceDecl(decl) => {
                let methods = decl
                    .methods
                    .iter()
                    .map(|(name, func)| (name.clone(), self.make_function(func, env, node)))
                    .collect::<Vec<_>>();
                self.registry
                    .write()
                    .expect("registry lock poisoned")
                    .register_instance(&decl.trait_name, &decl.type_key, MethodTable::new(methods))
                    .map_err(|err| err.with_loc(node.loc))?;
                Ok(Value::Nil)
            }
            NodeKind::ExtensionDecl { type_name, methods } => {
                let methods = methods
                    .iter()
                    .map(|(name, func)| (name.clone(), self.make_function(func, env, node)))
                    .collect::<Vec<_>>();
                self.registry
                    .write()
                    .expect("registry lock poisoned")
                    .register_instance("Extension", &[type_name.clone()], MethodTable::new(methods))
                    .map_err(|err| err.with_loc(node.loc))?;
                Ok(Value::Nil)
            }

            NodeKind::ConstDecl { name, annotation, value }
            | NodeKind::Declare { name, annotation, value } => {
                let bound = match annotation {
                    Some(ty) => self.eval_with_annotation(value, env, ty, false)?,
                    None => self.eval(value, env)?,
                };
                if matches!(bound, Value::Signal(_)) {
                    return Ok(bound);
                }
                env.define(name.clone(), bound);
                Ok(Value::Nil)
            }
            NodeKind::FuncStmt { name, func } => {
                let function = self.make_function(func, env, node);
                env.define(name.clone(), function);
                Ok(Value::Nil)
            }
            NodeKind::Block { stmts } => {
                let scope = env.enclosed();
                let mut last = Value::Nil;
                for (i, stmt) in stmts.iter().enumerate() {
                    last = if i + 1 == stmts.len() {
                        self.eval_tail(stmt, &scope)?
                    } else {
                        self.eval(stmt, &scope)?
                    };
                    if matches!(last, Value::Signal(_)) {
                        break;
                    }
                }
                Ok(last)
            }

            NodeKind::IntLit(i) => Ok(Value::Int(*i)),
            NodeKind::BigIntLit(digits) => digits
                .parse()
                .map(|big| Value::BigInt(Arc::new(big)))
                .map_err(|_| RunError::invalid(format!("malformed integer literal {digits}")).with_loc(node.loc)),
            NodeKind::FloatLit(f) => Ok(Value::Float(*f)),
            NodeKind::BoolLit(b) => Ok(Value::Bool(*b)),
            NodeKind::CharLit(c) => Ok(Value::Char(*c)),
            NodeKind::StringLit(s) => Ok(Value::string(s)),
            NodeKind::NilLit => Ok(Value::Nil),

            NodeKind::Ident { name } => match env.lookup(name) {
                Some(value) => Ok(value),
                None => {
                    Self::operator_value(name).ok_or_else(|| RunError::unknown_identifier(name).with_loc(node.loc))
                }
            },

            NodeKind::ListLit { items } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let value = self.eval(item, env)?;
                    if matches!(value, Value::Signal(_)) {
                        return Ok(value);
                    }
                    values.push(value);
                }
                Ok(Value::List(values.into_iter().collect()))
            }
            NodeKind::TupleLit { items } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let value = self.eval(item, env)?;
                    if matches!(value, Value::Signal(_)) {
                        return Ok(value);
                    }
                    values.push(value);
                }
                Ok(Value::Tuple(Arc::new(values)))
            }
            NodeKind::MapLit { pairs } => {
                let mut map = crate::types::Map::new();
                for (key_node, value_node) in pairs {
                    let key = self.eval(key_node, env)?;
                    let value = self.eval(value_node, env)?;
                    map = map.put(key, value);
                }
                Ok(Value::Map(map))
            }
            NodeKind::RecordLit { name, spread, fields } => {
                let mut evaluated = Vec::with_capacity(fields.len());
                for (key, value_node) in fields {
                    evaluated.push((key.clone(), self.eval(value_node, env)?));
                }
                match spread {
                    Some(base_node) => {
                        let base = self.eval(base_node, env)?;
                        let Value::Record(base) = base else {
                            return Err(RunError::type_mismatch(format!(
                                "record spread requires a record, found {}",
                                base.type_name()
                            ))
                            .with_loc(base_node.loc));
                        };
                        Ok(Value::Record(base.extend_with(evaluated)))
                    }
                    None => Ok(Value::Record(crate::types::Record::new(
                        evaluated,
                        name.as_deref().map(Arc::from),
                    ))),
                }
            }
            NodeKind::ListComp { element, clauses } => {
                let mut out = Vec::new();
                if let Some(signal) = self.eval_comp(element, clauses, env, &mut out)? {
                    return Ok(signal);
                }
                Ok(Value::List(out.into_iter().collect()))
            }

            NodeKind::Annotated { expr, ty } => {
                let tail = self.in_tail;
                self.eval_with_annotation(expr, env, ty, tail)
            }

            NodeKind::Prefix { op, operand } => {
                let result = self.eval_prefix(*op, operand, env);
                self.tag_operator_error(result, node)
            }
            NodeKind::Infix { op, left, right } => {
                let result = self.eval_infix(*op, left, right, env, node);
                self.tag_operator_error(result, node)
            }
            NodeKind::Postfix { op, operand } => {
                let result = self.eval_postfix(*op, operand, env);
                self.tag_operator_error(result, node)
            }

            NodeKind::If { cond, then, alt } => {
                let cond_value = self.eval(cond, env)?;
                if matches!(cond_value, Value::Signal(_)) {
                    return Ok(cond_value);
                }
                if cond_value.as_bool().map_err(|e| e.with_loc(cond.loc))? {
                    self.eval_tail(then, env)
                } else {
                    match alt {
                        Some(alt) => self.eval_tail(alt, env),
                        None => Ok(Value::Nil),
                    }
                }
            }
            NodeKind::Match { subject, arms } => {
                let subject_value = self.eval(subject, env)?;
                if matches!(subject_value, Value::Signal(_)) {
                    return Ok(subject_value);
                }
                for arm in arms {
                    let scope = env.enclosed();
                    if !match_pattern(&arm.pattern, &subject_value, &scope) {
                        continue;
                    }
                    if let Some(guard) = &arm.guard {
                        let guard_value = self.eval(guard, &scope)?;
                        if matches!(guard_value, Value::Signal(_)) {
                            return Ok(guard_value);
                        }
                        if !guard_value.as_bool().map_err(|e| e.with_loc(guard.loc))? {
                            continue;
                        }
                    }
                    return self.eval_tail(&arm.body, &scope);
                }
                Err(RunError::pattern_match_failed().with_loc(node.loc))
            }
            NodeKind::For { pattern, iterable, body } => {
                let iterable_value = self.eval(iterable, env)?;
                if matches!(iterable_value, Value::Signal(_)) {
                    return Ok(iterable_value);
                }
                let items = self.iterate(&iterable_value).map_err(|e| e.with_loc(iterable.loc))?;
                for item in items {
                    let scope = env.enclosed();
                    // A non-matching element drops the iteration, mirroring
                    // comprehension generators.
                    if !match_pattern(pattern, &item, &scope) {
                        continue;
                    }
                    let result = self.eval(body, &scope)?;
                    if let Value::Signal(signal) = result {
                        match &*signal {
                            Signal::Break(value) => return Ok(value.clone()),
                            Signal::Continue => {}
                            Signal::Return(_) | Signal::TailCall(_) => {
                                return Ok(Value::Signal(signal));
                            }
                        }
                    }
                }
                Ok(Value::Nil)
            }
            NodeKind::Range { start, end, step, inclusive } => {
                let start = self.int_operand(start, env)?;
                let end = self.int_operand(end, env)?;
                let step = match step {
                    Some(step) => self.int_operand(step, env)?,
                    None => 1,
                };
                Ok(Value::Range(Arc::new(RangeValue {
                    start,
                    end,
                    step,
                    inclusive: *inclusive,
                })))
            }

            NodeKind::Lambda(func) => Ok(self.make_function(func, env, node)),

            NodeKind::Member { target, name } => {
                let target_value = self.eval(target, env)?;
                if matches!(target_value, Value::Signal(_)) {
                    return Ok(target_value);
                }
                self.member_get(&target_value, name).map_err(|e| e.with_loc(node.loc))
            }
            NodeKind::Index { target, index } => {
                let target_value = self.eval(target, env)?;
                let index_value = self.eval(index, env)?;
                self.index_get(&target_value, &index_value).map_err(|e| e.with_loc(node.loc))
            }

            NodeKind::Assign { target, value } => self.eval_assign(target, value, env, node),
            NodeKind::PatternAssign { pattern, value } => {
                let bound = self.eval(value, env)?;
                if matches!(bound, Value::Signal(_)) {
                    return Ok(bound);
                }
                if match_pattern(pattern, &bound, env) {
                    Ok(Value::Nil)
                } else {
                    Err(RunError::pattern_match_failed().with_loc(node.loc))
                }
            }

            NodeKind::Return { value } => {
                // The returned expression is in tail position by construction.
                let result = match value {
                    Some(value) => self.eval_entry(value, env, true)?,
                    None => Value::Nil,
                };
                // A tail call inside `return` keeps its frame reuse.
                if matches!(&result, Value::Signal(signal) if matches!(&**signal, Signal::TailCall(_) | Signal::Return(_)))
                {
                    return Ok(result);
                }
                Ok(Value::signal(Signal::Return(result)))
            }
            NodeKind::Break { value } => {
                let result = match value {
                    Some(value) => self.eval(value, env)?,
                    None => Value::Nil,
                };
                Ok(Value::signal(Signal::Break(result)))
            }
            NodeKind::Continue => Ok(Value::signal(Signal::Continue)),

            NodeKind::Call { target, args, witnesses, .. } => {
                self.eval_call(node, target, args, witnesses, env)
            }
            NodeKind::TypeApply { target, args } => self.eval_type_apply(target, args, env, node),
        }
    }

    /// Operator errors that lack a position are tagged with the operator
    /// node's location; the innermost stack frame is rewritten to the
    /// instruction site. Division and modulo by zero report column 0 to
    /// mirror the paired VM backend.
    fn tag_operator_error(&self, result: RunResult<Value>, node: &Node) -> RunResult<Value> {
        result.map_err(|mut err| {
            if err.loc.is_none() {
                let mut loc = node.loc;
                if err.kind == crate::error::ErrorKind::DivisionByZero {
                    loc.column = 0;
                }
                err.loc = Some(loc);
                err.retarget_top_frame(loc);
            }
            err
        })
    }

    /// Evaluates `expr` under the annotation `ty`: the annotation's head goes
    /// on the type-context stack and a `{$ContextType, $Return}` witness is
    /// pushed for the duration. A nullary class method produced by `expr` is
    /// invoked immediately under the same context.
    ///
    /// `tail` preserves the annotated expression's own tail position;
    /// annotated declarations pass false so their binding still happens.
    pub(crate) fn eval_with_annotation(
        &mut self,
        expr: &NodeRef,
        env: &Env,
        ty: &TypeTerm,
        tail: bool,
    ) -> RunResult<Value> {
        let head = self.resolve_type_head(ty, env);
        self.type_context.push(head);
        self.witnesses.push(WitnessFrame::context(ty.clone()));
        let mut result = if tail {
            self.eval_entry(expr, env, true)
        } else {
            self.eval(expr, env)
        };
        if let Ok(Value::ClassMethod(method)) = &result
            && method.arity == 0
        {
            let callee = Value::ClassMethod(Arc::clone(method));
            result = self.apply(callee, Vec::new());
        }
        // A tail call escaping the annotation keeps its context witness.
        if let Ok(Value::Signal(signal)) = &result
            && let Signal::TailCall(tail) = &**signal
            && tail.witness.is_none()
        {
            let mut tail = tail.clone();
            tail.witness = Some(WitnessFrame::context(ty.clone()));
            result = Ok(Value::signal(Signal::TailCall(tail)));
        }
        self.witnesses.pop();
        self.type_context.pop();
        result
    }

    /// Resolves a type term's head constructor name against the environment,
    /// following type-variable bindings installed by call instantiation.
    pub(crate) fn resolve_type_head(&self, term: &TypeTerm, env: &Env) -> String {
        match term {
            TypeTerm::Var(name) => match env.lookup(name) {
                Some(Value::TypeObject(bound)) => self.resolve_type_head(&bound, env),
                _ => name.clone(),
            },
            other => other.head_name().unwrap_or("?").to_owned(),
        }
    }

    fn eval_call(
        &mut self,
        node: &NodeRef,
        target: &NodeRef,
        args: &[NodeRef],
        witnesses: &[NodeRef],
        env: &Env,
    ) -> RunResult<Value> {
        let callee = self.eval(target, env)?;
        if matches!(callee, Value::Signal(_)) {
            return Ok(callee);
        }
        // Witness expressions evaluate to dictionaries (or placeholders);
        // non-dictionaries are stripped here, placeholder dictionaries at
        // dispatch.
        let mut call_args = Vec::with_capacity(witnesses.len() + args.len());
        for witness in witnesses {
            let value = self.eval(witness, env)?;
            if matches!(value, Value::Dictionary(_)) {
                call_args.push(value);
            }
        }
        for arg in args {
            let value = self.eval(arg, env)?;
            if matches!(value, Value::Signal(_)) {
                return Ok(value);
            }
            call_args.push(value);
        }
        if self.in_tail && self.fn_depth > 0 {
            return Ok(Value::signal(Signal::TailCall(TailCall {
                target: callee,
                args: call_args,
                witness: None,
                loc: node.loc,
            })));
        }
        let saved_node = self.current_call_node.replace(Arc::clone(node));
        let saved_env = self.current_env.replace(env.clone());
        let result = self.apply(callee, call_args);
        self.current_call_node = saved_node;
        self.current_env = saved_env;
        result
    }

    fn eval_type_apply(
        &mut self,
        target: &NodeRef,
        args: &[TypeTerm],
        env: &Env,
        node: &NodeRef,
    ) -> RunResult<Value> {
        let callee = self.eval(target, env)?;
        match callee {
            Value::TypeObject(term) => Ok(Value::TypeObject(Arc::new(TypeTerm::App(
                Box::new((*term).clone()),
                args.to_vec(),
            )))),
            Value::Constructor(ctor) => {
                let applied = args
                    .iter()
                    .map(|term| Value::TypeObject(Arc::new(term.clone())))
                    .collect::<Vec<_>>();
                if ctor.arity == 0 {
                    return Ok(Value::Adt(Arc::new(AdtInstance {
                        constructor: ctor.name.clone(),
                        type_name: ctor.type_name.clone(),
                        fields: Vec::new(),
                        type_args: args.to_vec(),
                    })));
                }
                let remaining = ctor.arity;
                Ok(Value::Partial(Arc::new(PartialApp {
                    target: Value::Constructor(ctor),
                    applied,
                    remaining,
                })))
            }
            Value::ClassMethod(method) => {
                let hint = args.first().cloned().ok_or_else(|| {
                    RunError::invalid("type application with no type arguments").with_loc(node.loc)
                })?;
                Ok(Value::ClassMethod(Arc::new(ClassMethod {
                    trait_name: method.trait_name.clone(),
                    method: method.method.clone(),
                    arity: method.arity,
                    hint: Some(hint),
                })))
            }
            // Functions pick their instantiation up from the call node.
            other => Ok(other),
        }
    }

    fn eval_assign(
        &mut self,
        target: &NodeRef,
        value: &NodeRef,
        env: &Env,
        node: &NodeRef,
    ) -> RunResult<Value> {
        match &target.kind {
            NodeKind::Ident { name } => {
                let bound = self.eval(value, env)?;
                if matches!(bound, Value::Signal(_)) {
                    return Ok(bound);
                }
                env.rebind(name, bound.clone());
                Ok(bound)
            }
            NodeKind::Member { target: base, name: field } => {
                let NodeKind::Ident { name: base_name } = &base.kind else {
                    return Err(RunError::invalid("field assignment requires a named record").with_loc(node.loc));
                };
                let record_value = self.eval(base, env)?;
                let Value::Record(mut record) = record_value else {
                    return Err(RunError::type_mismatch("field assignment on a non-record").with_loc(node.loc));
                };
                let bound = self.eval(value, env)?;
                record.set_in_place(field, bound.clone());
                env.rebind(base_name, Value::Record(record));
                Ok(bound)
            }
            NodeKind::Index { target: base, index } => {
                let NodeKind::Ident { name: base_name } = &base.kind else {
                    return Err(RunError::invalid("index assignment requires a named map").with_loc(node.loc));
                };
                let map_value = self.eval(base, env)?;
                let Value::Map(map) = map_value else {
                    return Err(RunError::type_mismatch("index assignment on a non-map").with_loc(node.loc));
                };
                let key = self.eval(index, env)?;
                let bound = self.eval(value, env)?;
                env.rebind(base_name, Value::Map(map.put(key, bound.clone())));
                Ok(bound)
            }
            _ => Err(RunError::invalid("unsupported assignment target").with_loc(node.loc)),
        }
    }

    /// Recursive comprehension expansion. Returns a signal value if one
    /// escaped a clause body.
    fn eval_comp(
        &mut self,
        element: &NodeRef,
        clauses: &[CompClause],
        env: &Env,
        out: &mut Vec<Value>,
    ) -> RunResult<Option<Value>> {
        let Some((clause, rest)) = clauses.split_first() else {
            let value = self.eval(element, env)?;
            if matches!(value, Value::Signal(_)) {
                return Ok(Some(value));
            }
            out.push(value);
            return Ok(None);
        };
        match clause {
            CompClause::Generator { pattern, iterable } => {
                let iterable_value = self.eval(iterable, env)?;
                if matches!(iterable_value, Value::Signal(_)) {
                    return Ok(Some(iterable_value));
                }
                let items = self.iterate(&iterable_value).map_err(|e| e.with_loc(iterable.loc))?;
                for item in items {
                    let scope = env.enclosed();
                    // A match failure drops the iteration without error.
                    if !match_pattern(pattern, &item, &scope) {
                        continue;
                    }
                    if let Some(signal) = self.eval_comp(element, rest, &scope, out)? {
                        return Ok(Some(signal));
                    }
                }
                Ok(None)
            }
            CompClause::Filter(cond) => {
                let cond_value = self.eval(cond, env)?;
                if matches!(cond_value, Value::Signal(_)) {
                    return Ok(Some(cond_value));
                }
                if cond_value.as_bool().map_err(|e| e.with_loc(cond.loc))? {
                    self.eval_comp(element, rest, env, out)
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn eval_type_decl(&mut self, decl: &crate::ast::TypeDecl, env: &Env) -> RunResult<()> {
        match &decl.body {
            TypeDeclBody::Adt { constructors } => {
                for (ctor_name, arity) in constructors {
                    let value = if *arity == 0 {
                        Value::adt(&decl.name, ctor_name, Vec::new())
                    } else {
                        Value::Constructor(Arc::new(Constructor {
                            name: ctor_name.clone(),
                            type_name: decl.name.clone(),
                            arity: *arity,
                        }))
                    };
                    env.define(ctor_name.clone(), value);
                }
            }
            TypeDeclBody::Alias(target) => {
                if let Some(head) = target.head_name() {
                    self.aliases
                        .write()
                        .expect("alias lock poisoned")
                        .insert(decl.name.clone(), head.to_owned());
                }
            }
            TypeDeclBody::Record { .. } => {}
        }
        env.define(
            decl.name.clone(),
            Value::TypeObject(Arc::new(TypeTerm::con(decl.name.clone()))),
        );
        Ok(())
    }

    fn eval_trait_decl(&mut self, decl: &crate::ast::TraitDecl, env: &Env) -> RunResult<()> {
        let info = TraitInfo {
            name: decl.name.clone(),
            type_params: decl.type_params.clone(),
            supers: decl.supers.clone(),
            methods: decl
                .methods
                .iter()
                .map(|m| TraitMethod {
                    name: m.name.clone(),
                    arity: m.arity,
                    operator: m.operator.clone(),
                })
                .collect(),
            defaults: Default::default(),
        };
        {
            let mut registry = self.registry.write().expect("registry lock poisoned");
            registry.declare_trait(info)?;
            for method in &decl.methods {
                if let Some(default) = &method.default {
                    let body = self.make_function_in(default, env, None);
                    registry.set_trait_default(&decl.name, &method.name, body)?;
                }
            }
        }
        for method in &decl.methods {
            if method.operator.is_none() {
                env.define(
                    method.name.clone(),
                    Value::ClassMethod(Arc::new(ClassMethod {
                        trait_name: decl.name.clone(),
                        method: method.name.clone(),
                        arity: method.arity,
                        hint: None,
                    })),
                );
            }
        }
        Ok(())
    }

    /// Builds a function value from a literal, capturing the environment and
    /// a snapshot of the current witness stack.
    pub(crate) fn make_function(&self, func: &FuncLit, env: &Env, node: &Node) -> Value {
        self.make_function_at(func, env, node.loc)
    }

    fn make_function_at(&self, func: &FuncLit, env: &Env, loc: crate::error::CodeLoc) -> Value {
        Value::Function(Arc::new(Function {
            name: func.name.clone(),
            params: func.params.clone(),
            witness_params: func.witness_params.clone(),
            return_type: func.return_type.clone(),
            body: Arc::clone(&func.body),
            env: env.clone(),
            captured_witnesses: Some(self.witnesses.snapshot()),
            loc,
        }))
    }

    fn make_function_in(&self, func: &FuncLit, env: &Env, loc: Option<crate::error::CodeLoc>) -> Value {
        self.make_function_at(func, env, loc.unwrap_or_default())
    }

    fn int_operand(&mut self, node: &NodeRef, env: &Env) -> RunResult<i64> {
        match self.eval(node, env)? {
            Value::Int(i) => Ok(i),
            other => Err(RunError::type_mismatch(format!(
                "range bounds must be Int, found {}",
                other.type_name()
            ))
            .with_loc(node.loc)),
        }
    }

    /// Member access: record fields and map string keys first, then methods
    /// registered for the receiver's type (extensions, then trait instances).
    pub(crate) fn member_get(&self, target: &Value, name: &str) -> RunResult<Value> {
        match target {
            Value::Record(record) => {
                if let Some(value) = record.get(name) {
                    return Ok(value.clone());
                }
            }
            Value::Map(map) => {
                if let Some(value) = map.get(&Value::string(name)) {
                    return Ok(value.clone());
                }
            }
            _ => {}
        }
        let type_name = target.type_name().into_owned();
        let registry = self.registry.read().expect("registry lock poisoned");
        let aliases = self.aliases.read().expect("alias lock poisoned");
        let mut candidates = vec![type_name.clone()];
        if let Some(alias) = aliases.resolve(&type_name) {
            candidates.push(alias.to_owned());
        }
        for key in &candidates {
            if let Some(method) = registry.instance("Extension", key).and_then(|t| t.get(name)) {
                return Ok(Value::Bound(Arc::new(crate::value::BoundMethod {
                    receiver: target.clone(),
                    callable: method.clone(),
                })));
            }
        }
        for trait_name in registry.trait_names() {
            for key in &candidates {
                if let Some(method) = registry.instance(trait_name, key).and_then(|t| t.get(name)) {
                    return Ok(Value::Bound(Arc::new(crate::value::BoundMethod {
                        receiver: target.clone(),
                        callable: method.clone(),
                    })));
                }
            }
        }
        Err(RunError::type_mismatch(format!("{type_name} has no member {name}")))
    }

    pub(crate) fn index_get(&self, target: &Value, index: &Value) -> RunResult<Value> {
        match (target, index) {
            (Value::List(list), Value::Int(i)) => {
                let idx = usize::try_from(*i).map_err(|_| RunError::index_out_of_range(*i, list.len()))?;
                list.get(idx)
                    .cloned()
                    .ok_or_else(|| RunError::index_out_of_range(*i, list.len()))
            }
            (Value::Tuple(items), Value::Int(i)) => {
                let idx = usize::try_from(*i).map_err(|_| RunError::index_out_of_range(*i, items.len()))?;
                items
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| RunError::index_out_of_range(*i, items.len()))
            }
            (Value::Bytes(bytes), Value::Int(i)) => {
                let idx = usize::try_from(*i).map_err(|_| RunError::index_out_of_range(*i, bytes.len()))?;
                bytes
                    .get(idx)
                    .map(|b| Value::Int(i64::from(b)))
                    .ok_or_else(|| RunError::index_out_of_range(*i, bytes.len()))
            }
            (Value::Bits(bits), Value::Int(i)) => {
                let idx = usize::try_from(*i).map_err(|_| RunError::index_out_of_range(*i, bits.len()))?;
                bits.get(idx)
                    .map(Value::Bool)
                    .ok_or_else(|| RunError::index_out_of_range(*i, bits.len()))
            }
            // Missing map keys read as Nil so `??` composes naturally.
            (Value::Map(map), key) => Ok(map.get(key).cloned().unwrap_or(Value::Nil)),
            (Value::Record(record), Value::List(key)) if key.is_string() => {
                let key = key.as_string().unwrap_or_default();
                record
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| RunError::type_mismatch(format!("record has no field {key}")))
            }
            (target, index) => Err(RunError::type_mismatch(format!(
                "cannot index {} with {}",
                target.type_name(),
                index.type_name()
            ))),
        }
    }

    /// Materializes an iterable value for loops and comprehensions.
    pub(crate) fn iterate(&self, value: &Value) -> RunResult<Vec<Value>> {
        match value {
            Value::List(list) => Ok(list.to_vec()),
            Value::Range(range) => Ok(range.iter().map(Value::Int).collect()),
            Value::Map(map) => Ok(map
                .iter()
                .map(|(k, v)| Value::Tuple(Arc::new(vec![k.clone(), v.clone()])))
                .collect()),
            Value::Bytes(bytes) => Ok(bytes.as_slice().iter().map(|&b| Value::Int(i64::from(b))).collect()),
            Value::Bits(bits) => Ok(bits.iter().map(Value::Bool).collect()),
            other => Err(RunError::type_mismatch(format!("{} is not iterable", other.type_name()))),
        }
    }
}
