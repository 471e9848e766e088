//! The applier: the single entry point for function application, covering
//! every callable shape, and the tail-call trampoline.
//!
//! User functions run inside a loop: a body that evaluates to a tail-call
//! signal replaces the current frame's function, environment, and arguments
//! and continues, so self-recursion in tail position runs in constant host
//! stack. Every other callable shape either computes directly or reduces to
//! another `apply`.

use std::sync::Arc;

use crate::{
    ast::NodeKind,
    env::Env,
    error::{RunError, RunResult, StackFrame},
    run::Interp,
    tracer::TraceEvent,
    typesys::TypeTerm,
    value::{AdtInstance, Function, PartialApp, Signal, Value},
    witness::WitnessFrame,
};

/// Outcome of binding a call environment: either a full environment or a
/// partial application for under-applied calls.
enum Binding {
    Env(Env),
    Partial(Value),
}

impl Interp {
    /// Applies a callable to evaluated arguments.
    pub(crate) fn apply(&mut self, callable: Value, args: Vec<Value>) -> RunResult<Value> {
        match callable {
            Value::Function(func) => self.apply_function(func, args),
            Value::Builtin(builtin) => self.apply_builtin(&builtin, args),
            Value::Partial(partial) => {
                let mut all = partial.applied.clone();
                all.extend(args);
                self.apply(partial.target.clone(), all)
            }
            Value::Constructor(ctor) => self.apply_constructor(&ctor, args),
            Value::TypeObject(term) => self.apply_type_object(&term, args),
            Value::ClassMethod(method) => self.dispatch_class_method(&method, args),
            Value::Bound(bound) => {
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(bound.receiver.clone());
                all.extend(args);
                self.apply(bound.callable.clone(), all)
            }
            Value::OperatorFn(op) => match args.len() {
                0 | 1 => Ok(Value::Partial(Arc::new(PartialApp {
                    target: Value::OperatorFn(op),
                    remaining: 2 - args.len(),
                    applied: args,
                }))),
                2 => {
                    let mut iter = args.into_iter();
                    let left = iter.next().expect("len checked");
                    let right = iter.next().expect("len checked");
                    self.infix_values(op, left, right)
                }
                n => Err(RunError::arity_mismatch(&format!("({op})"), 2, n)),
            },
            Value::Composed(composed) => {
                if args.is_empty() {
                    return Ok(Value::Partial(Arc::new(PartialApp {
                        target: Value::Composed(composed),
                        applied: Vec::new(),
                        remaining: 1,
                    })));
                }
                let inner_result = self.apply(composed.inner.clone(), args)?;
                self.apply(composed.outer.clone(), vec![inner_result])
            }
            Value::HostClosure(closure) => {
                let handler = self
                    .bridge
                    .host_call
                    .clone()
                    .ok_or_else(|| RunError::host_call("no host-call handler installed"))?;
                handler(&closure, args)
            }
            // Calling an error value (e.g. an unimplemented dictionary slot)
            // surfaces the error itself.
            Value::Error(err) => Err((*err).clone()),
            other => Err(RunError::not_callable(&other.type_name())),
        }
    }

    fn apply_function(&mut self, mut func: Arc<Function>, mut args: Vec<Value>) -> RunResult<Value> {
        let mut env = match self.bind_call_env(&func, args)? {
            Binding::Env(env) => env,
            Binding::Partial(partial) => return Ok(partial),
        };

        // Enter the closure's trait-resolution context, remembering ours.
        let saved_witnesses = func
            .captured_witnesses
            .as_ref()
            .map(|captured| std::mem::replace(&mut self.witnesses, captured.snapshot()));
        let entry_depth = self.witnesses.depth();
        if let Some(return_type) = &func.return_type {
            self.witnesses.push(WitnessFrame::context(return_type.clone()));
        }
        let initial_depth = self.witnesses.depth();

        let frame_loc = self.current_call_node.as_ref().map_or(func.loc, |n| n.loc);
        self.call_stack
            .push(StackFrame::new(func.describe(), self.script_name.clone(), frame_loc));
        self.fn_depth += 1;

        let result = loop {
            let body = Arc::clone(&func.body);
            match self.eval_fn_body(&body, &env) {
                Ok(Value::Signal(signal)) => match &*signal {
                    Signal::Return(value) => break Ok(value.clone()),
                    Signal::TailCall(tail) => {
                        let tail = tail.clone();
                        self.witnesses.truncate(initial_depth);
                        if let Some(frame) = tail.witness {
                            self.witnesses.push(frame);
                        }
                        match tail.target {
                            Value::Function(next) => {
                                args = tail.args;
                                env = match self.bind_call_env(&next, args)? {
                                    Binding::Env(env) => env,
                                    Binding::Partial(partial) => break Ok(partial),
                                };
                                self.tracer.event(TraceEvent::TailLoop {
                                    callee: next.describe().to_owned(),
                                });
                                if let Some(frame) = self.call_stack.last_mut() {
                                    frame.name = next.describe().to_owned();
                                    frame.line = tail.loc.line;
                                    frame.column = tail.loc.column;
                                }
                                func = next;
                                continue;
                            }
                            // Tail targets that own no frame of ours fall
                            // back to a regular application.
                            other => break self.apply(other, tail.args),
                        }
                    }
                    Signal::Break(_) | Signal::Continue => {
                        break Err(RunError::invalid("loop signal escaped its loop").with_loc(func.loc));
                    }
                },
                Ok(value) => break Ok(value),
                Err(mut err) => {
                    if !err.has_trace() {
                        err.attach_frames(self.call_stack.iter().rev().cloned().collect());
                    }
                    break Err(err);
                }
            }
        };

        self.fn_depth -= 1;
        self.call_stack.pop();
        if let Some(previous) = saved_witnesses {
            self.witnesses = previous;
        } else {
            self.witnesses.truncate(entry_depth);
        }
        result
    }

    /// Builds the call environment for a user function: instantiation
    /// bindings, witness-parameter consumption, then positional binding with
    /// defaults and the variadic tail.
    fn bind_call_env(&mut self, func: &Arc<Function>, mut args: Vec<Value>) -> RunResult<Binding> {
        let env = func.env.enclosed();

        // Call-site type-variable instantiation binds each variable as a
        // type value, so later head resolution sees concrete types.
        if let Some(node) = &self.current_call_node
            && let NodeKind::Call { instantiation, .. } = &node.kind
        {
            for (var, term) in instantiation {
                env.define(var.clone(), Value::TypeObject(Arc::new(term.clone())));
            }
        }

        // Leading dictionaries feed witness parameters; all of them are
        // stripped from the argument list either way.
        let leading = args
            .iter()
            .take_while(|arg| matches!(arg, Value::Dictionary(_)))
            .count();
        for (i, name) in func.witness_params.iter().enumerate() {
            if i < leading {
                env.define(name.clone(), args[i].clone());
            } else if let Some(Value::Dictionary(first)) = args.first() {
                // Missing witnesses come from the first dictionary's supers.
                if let Some(super_dict) = first.supers.get(i - leading) {
                    env.define(name.clone(), Value::Dictionary(Arc::clone(super_dict)));
                }
            }
        }
        let args_tail = args.split_off(leading);
        args = args_tail;

        // Positional parameters: fill left to right, defaults for the rest,
        // variadic tail collects what remains.
        let params = &func.params;
        let variadic = func.is_variadic();
        let positional_count = params.len() - usize::from(variadic);
        let needed = params
            .iter()
            .take(positional_count)
            .rposition(|p| p.default.is_none())
            .map_or(0, |i| i + 1);
        if args.len() < needed {
            let remaining = needed - args.len();
            return Ok(Binding::Partial(Value::Partial(Arc::new(PartialApp {
                target: Value::Function(Arc::clone(func)),
                applied: args,
                remaining,
            }))));
        }
        if !variadic && args.len() > positional_count {
            return Err(RunError::arity_mismatch(func.describe(), positional_count, args.len()));
        }

        let mut arg_iter = args.into_iter();
        for param in params.iter().take(positional_count) {
            match arg_iter.next() {
                Some(value) => env.define(param.name.clone(), value),
                None => {
                    let default = param.default.as_ref().expect("needed prefix was checked");
                    let value = self.eval(default, &env)?;
                    env.define(param.name.clone(), value);
                }
            }
        }
        if variadic {
            let rest: Vec<Value> = arg_iter.collect();
            let name = &params.last().expect("variadic implies a parameter").name;
            env.define(name.clone(), Value::List(rest.into_iter().collect()));
        }
        Ok(Binding::Env(env))
    }

    fn apply_builtin(&mut self, builtin: &Arc<crate::value::Builtin>, mut args: Vec<Value>) -> RunResult<Value> {
        if let Some(count) = builtin.param_count
            && args.len() < count
        {
            let missing = count - args.len();
            if missing <= builtin.defaults.len() {
                let start = builtin.defaults.len() - missing;
                args.extend(builtin.defaults[start..].iter().cloned());
            } else {
                return Ok(Value::Partial(Arc::new(PartialApp {
                    target: Value::Builtin(Arc::clone(builtin)),
                    applied: args,
                    remaining: missing - builtin.defaults.len(),
                })));
            }
        }
        (builtin.func.clone())(self, args)
    }

    fn apply_constructor(&mut self, ctor: &Arc<crate::value::Constructor>, args: Vec<Value>) -> RunResult<Value> {
        // Leading type values reify as type arguments, not fields.
        let type_arg_count = args
            .iter()
            .take_while(|arg| matches!(arg, Value::TypeObject(_)))
            .count();
        let field_count = args.len() - type_arg_count;
        if field_count < ctor.arity {
            let remaining = ctor.arity - field_count;
            return Ok(Value::Partial(Arc::new(PartialApp {
                target: Value::Constructor(Arc::clone(ctor)),
                applied: args,
                remaining,
            })));
        }
        if field_count > ctor.arity {
            return Err(RunError::arity_mismatch(&ctor.name, ctor.arity, field_count));
        }
        let mut type_args = Vec::with_capacity(type_arg_count);
        let mut fields = Vec::with_capacity(field_count);
        for arg in args {
            match arg {
                Value::TypeObject(term) if fields.is_empty() => type_args.push((*term).clone()),
                other => fields.push(other),
            }
        }
        Ok(Value::Adt(Arc::new(AdtInstance {
            constructor: ctor.name.clone(),
            type_name: ctor.type_name.clone(),
            fields,
            type_args,
        })))
    }

    /// Type objects are callable in two modes: a single value argument is an
    /// ADT cast (records adopt the type name, aliases pass through), while
    /// type-value arguments build a type application.
    fn apply_type_object(&mut self, term: &Arc<TypeTerm>, args: Vec<Value>) -> RunResult<Value> {
        if !args.is_empty() && args.iter().all(|a| matches!(a, Value::TypeObject(_))) {
            let arg_terms = args
                .iter()
                .map(|a| match a {
                    Value::TypeObject(t) => (**t).clone(),
                    _ => unreachable!("all type objects per the guard"),
                })
                .collect();
            return Ok(Value::TypeObject(Arc::new(TypeTerm::App(
                Box::new((**term).clone()),
                arg_terms,
            ))));
        }
        match args.len() {
            1 => {
                let value = args.into_iter().next().expect("len checked");
                match (term.head_name(), value) {
                    (Some(name), Value::Record(record)) => {
                        Ok(Value::Record(record.with_type_name(Arc::from(name))))
                    }
                    // Alias cast: the value passes through unchanged.
                    (_, value) => Ok(value),
                }
            }
            n => Err(RunError::arity_mismatch("type cast", 1, n)),
        }
    }
}
