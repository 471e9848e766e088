//! The dispatcher: resolves a class-method call to a concrete implementation.
//!
//! Four inputs have to be reconciled deterministically: the runtime types of
//! the positional arguments, explicitly-passed dictionaries, the expected
//! return context (annotations, the container context, or the type map), and
//! the trait's defaults. The algorithm runs in numbered steps; candidates are
//! collected first and a fixed decision rule picks the winner, so two calls
//! with value-equal inputs against the same registries always select the same
//! implementation.

use std::sync::Arc;

use crate::{
    error::{RunError, RunResult},
    run::Interp,
    tracer::TraceEvent,
    typesys::TypeTerm,
    value::{ClassMethod, Value},
    witness::{self, WitnessFrame},
};

/// An argument-based candidate: the winning key and whether it matched the
/// full key exactly.
struct ArgCandidate {
    key: String,
    method: Value,
    exact: bool,
}

/// A context candidate: the expected-type name, the full term when one was
/// available, and whether the context came from an explicit annotation
/// rather than the inferred type map.
struct ContextCandidate {
    type_name: String,
    term: Option<TypeTerm>,
    method: Value,
    explicit: bool,
}

impl Interp {
    /// Resolves and applies a class method. `args` still carries any leading
    /// witness dictionaries.
    pub(crate) fn dispatch_class_method(
        &mut self,
        method: &Arc<ClassMethod>,
        mut args: Vec<Value>,
    ) -> RunResult<Value> {
        let trait_name = method.trait_name.clone();
        let method_name = method.method.clone();
        let arity = method.arity;

        // A type-application hint acts like a trailing type-value argument.
        if let Some(hint) = &method.hint {
            args.push(Value::TypeObject(Arc::new(hint.clone())));
        }

        // Step 2 precursor: explicit dictionaries always win when one of them
        // implements the method; placeholders and dead slots are stripped.
        let mut dict_index = 0;
        while let Some(Value::Dictionary(dict)) = args.get(dict_index) {
            let dict = Arc::clone(dict);
            if dict.trait_name != witness::PLACEHOLDER
                && let Some(implementation) = dict.method(&method_name)
                && !matches!(implementation, Value::Error(_))
            {
                let implementation = implementation.clone();
                let rest: Vec<Value> = args[dict_index + 1..].to_vec();
                if Self::check_args_match(&implementation, rest.len()) {
                    self.trace_dispatch(&trait_name, &method_name, &dict.trait_name, "dictionary");
                    return if Self::wants_witness(&implementation) {
                        // The dictionary itself becomes the witness argument.
                        let full: Vec<Value> = args[dict_index..].to_vec();
                        self.apply(implementation, full)
                    } else {
                        self.apply(implementation, rest)
                    };
                }
            }
            dict_index += 1;
        }
        // Every leading dictionary was stripped without matching.
        let mut positional: Vec<Value> = args.split_off(dict_index);
        drop(args);

        // Step 5: a trailing type-value (or, legacy, a String) with k+1 args
        // is an explicit container hint, removed from the argument list. The
        // hint witness lives exactly as long as the call.
        let mut hint_name: Option<String> = None;
        if positional.len() == arity + 1 {
            let hint = match positional.last() {
                Some(Value::TypeObject(term)) => term.head_name().map(str::to_owned),
                // Removable legacy branch: a String hint is accepted on input
                // and normalised to a type name immediately.
                Some(Value::List(list)) if list.is_string() => list.as_string(),
                _ => None,
            };
            if let Some(name) = hint {
                positional.pop();
                self.witnesses
                    .push(WitnessFrame::single(trait_name.clone(), TypeTerm::con(name.clone())));
                hint_name = Some(name);
            }
        }
        let pushed_hint = hint_name.is_some();
        let result = self.dispatch_positional(&trait_name, &method_name, arity, positional, hint_name);
        if pushed_hint {
            self.witnesses.pop();
        }
        result
    }

    fn dispatch_positional(
        &mut self,
        trait_name: &str,
        method_name: &str,
        arity: usize,
        positional: Vec<Value>,
        hint_name: Option<String>,
    ) -> RunResult<Value> {
        let mut arg_candidate = self.argument_candidate(trait_name, method_name, &positional);

        // Dispatch of `Applicative.pure` is by result type only; the
        // argument-based candidate is suppressed before the decision rule.
        if trait_name == "Applicative" && method_name == "pure" {
            arg_candidate = None;
        }

        let context_candidate = self.context_candidate(trait_name, method_name, arity, &positional, hint_name);

        let decision = self.decide(trait_name, arg_candidate, context_candidate, arity, &positional);
        match decision {
            Decision::Argument { key, method } => {
                self.trace_dispatch(trait_name, method_name, &key, "argument");
                self.apply(method, positional)
            }
            Decision::Context { type_name, term, method } => {
                self.trace_dispatch(trait_name, method_name, &type_name, "context");
                // Nested dispatches during the call see the expected type.
                let frame = WitnessFrame::single(
                    trait_name.to_owned(),
                    term.unwrap_or_else(|| TypeTerm::con(type_name)),
                );
                self.witnesses.push(frame);
                let result = self.apply(method, positional);
                self.witnesses.pop();
                result
            }
            Decision::None => self.dispatch_default(trait_name, method_name, positional),
        }
    }

    /// Steps 0 and 1: the argument-based candidate.
    fn argument_candidate(
        &self,
        trait_name: &str,
        method_name: &str,
        positional: &[Value],
    ) -> Option<ArgCandidate> {
        let registry = self.registry.read().expect("registry lock poisoned");
        let aliases = self.aliases.read().expect("alias lock poisoned");
        let key_arity = registry.key_arity(trait_name)?;
        let arg_types: Vec<String> = positional.iter().map(|a| a.type_name().into_owned()).collect();
        let context = self.type_context.last();

        // Step 0 — exact key: all key positions covered by argument types,
        // with the top type-context string filling one trailing slot when the
        // arguments fall one short.
        let exact_keys: Vec<Vec<String>> = if arg_types.len() == key_arity {
            let direct = arg_types.clone();
            let aliased: Vec<String> = arg_types
                .iter()
                .map(|t| aliases.resolve(t).unwrap_or(t).to_owned())
                .collect();
            if aliased == direct {
                vec![direct]
            } else {
                vec![direct, aliased]
            }
        } else if arg_types.len() + 1 == key_arity && context.is_some() {
            let mut with_context = arg_types.clone();
            with_context.push(context.expect("checked above").clone());
            vec![with_context]
        } else {
            Vec::new()
        };
        for key_parts in exact_keys {
            let key = key_parts.join("_");
            if let Some(table) = registry.instance(trait_name, &key)
                && let Some(implementation) = table.get(method_name)
                && Self::check_args_match(implementation, positional.len())
            {
                return Some(ArgCandidate {
                    key,
                    method: implementation.clone(),
                    exact: true,
                });
            }
        }

        // Step 1 — fuzzy key: every supplied argument position must match its
        // key part (lowercase parts are type variables and match anything);
        // score prefers exact part matches and a later part equal to the
        // current type context.
        let mut best: Option<(usize, ArgCandidate)> = None;
        for (key, table) in registry.instances_of(trait_name) {
            let parts: Vec<&str> = key.split('_').collect();
            if parts.len() < arg_types.len() {
                continue;
            }
            let mut score = 0usize;
            let mut matched = true;
            for (i, arg_type) in arg_types.iter().enumerate() {
                let part = parts[i];
                if part == arg_type {
                    score += 1;
                } else if !part.chars().next().is_some_and(char::is_lowercase) {
                    matched = false;
                    break;
                }
            }
            if !matched {
                continue;
            }
            if let Some(context) = context
                && parts[arg_types.len()..].iter().any(|part| part == context)
            {
                score += 1;
            }
            let Some(implementation) = table.get(method_name) else { continue };
            if !Self::check_args_match(implementation, positional.len()) {
                continue;
            }
            let better = best.as_ref().is_none_or(|(best_score, _)| score > *best_score);
            if better {
                best = Some((
                    score,
                    ArgCandidate {
                        key: key.to_owned(),
                        method: implementation.clone(),
                        exact: false,
                    },
                ));
            }
        }
        best.map(|(_, candidate)| candidate)
    }

    /// Steps 3, 4, and 6: the context candidate, in priority order — hint
    /// witness, implicit trait witness (nullary only), `$ContextType`,
    /// container context, type-context stack, then the type map.
    fn context_candidate(
        &self,
        trait_name: &str,
        method_name: &str,
        arity: usize,
        positional: &[Value],
        hint_name: Option<String>,
    ) -> Option<ContextCandidate> {
        let mut source: Option<(String, Option<TypeTerm>, bool)> = None;

        if let Some(name) = hint_name {
            source = Some((name, None, true));
        }

        // Step 3 — implicit witness from the stack, nullary methods only.
        if source.is_none()
            && arity == 0
            && let Some(terms) = self.witnesses.lookup(trait_name)
        {
            let env = self.current_env.clone().unwrap_or_else(|| self.global_env().clone());
            let key = terms
                .iter()
                .map(|t| self.resolve_type_head(t, &env))
                .collect::<Vec<_>>()
                .join("_");
            source = Some((key, terms.first().cloned(), true));
        }

        // Step 4 — `$ContextType` witness.
        if source.is_none()
            && let Some(terms) = self.witnesses.lookup(witness::CONTEXT_TYPE)
            && let Some(term) = terms.first()
        {
            let env = self.current_env.clone().unwrap_or_else(|| self.global_env().clone());
            source = Some((self.resolve_type_head(term, &env), Some(term.clone()), true));
        }

        // Step 6 — container context, then the annotation stack, then the
        // inferred type of the call node.
        if source.is_none()
            && let Some(container) = &self.container_context
        {
            source = Some((container.clone(), None, true));
        }
        if source.is_none()
            && let Some(context) = self.type_context.last()
        {
            source = Some((context.clone(), None, true));
        }
        // The inferred type of the call node applies only when the analyser's
        // dispatch strategy admits return-position dispatch for this method
        // (or recorded no strategy at all).
        let return_dispatch_ok = self
            .strategy
            .get(trait_name, method_name)
            .is_none_or(|sources| sources.contains(&crate::typesys::DispatchSource::Return));
        if source.is_none()
            && return_dispatch_ok
            && let Some(node) = &self.current_call_node
            && let Some(term) = self.type_map.get(node.id)
        {
            let env = self.current_env.clone().unwrap_or_else(|| self.global_env().clone());
            source = Some((self.resolve_type_head(term, &env), Some(term.clone()), false));
        }

        let (type_name, term, explicit) = source?;
        let registry = self.registry.read().expect("registry lock poisoned");
        let aliases = self.aliases.read().expect("alias lock poisoned");
        let lookup = |name: &str| -> Option<Value> {
            registry
                .instance(trait_name, name)
                .and_then(|table| table.get(method_name))
                .filter(|implementation| Self::check_args_match(implementation, positional.len()))
                .cloned()
        };
        let method = lookup(&type_name)
            .or_else(|| aliases.resolve(&type_name).and_then(|alias| lookup(alias)))
            .or_else(|| aliases.reverse(&type_name).and_then(|alias| lookup(alias)))?;
        Some(ContextCandidate {
            type_name,
            term,
            method,
            explicit,
        })
    }

    /// Step 7 — the decision rule, first match wins.
    fn decide(
        &self,
        trait_name: &str,
        arg_candidate: Option<ArgCandidate>,
        context_candidate: Option<ContextCandidate>,
        arity: usize,
        positional: &[Value],
    ) -> Decision {
        let context_feeds_container = context_candidate
            .as_ref()
            .is_some_and(|context| self.container_slot_matches(context, positional));
        let arg_is_exact = arg_candidate.as_ref().is_some_and(|arg| arg.exact);
        let context_is_explicit = context_candidate.as_ref().is_some_and(|context| context.explicit);
        let context_differs_from_arg_key = match (&context_candidate, &arg_candidate) {
            (Some(context), Some(arg)) => context.type_name != arg.key,
            (Some(_), None) => true,
            _ => false,
        };

        let pick_context = |context: ContextCandidate| Decision::Context {
            type_name: context.type_name,
            term: context.term,
            method: context.method,
        };
        let pick_argument = |arg: ArgCandidate| Decision::Argument {
            key: arg.key,
            method: arg.method,
        };

        // Show renders what it was given; arguments always win.
        if trait_name == "Show" && arg_candidate.is_some() {
            return pick_argument(arg_candidate.expect("checked above"));
        }
        // A container context whose argument slot matches a positional
        // argument's runtime type is producing into that container.
        if context_feeds_container {
            return pick_context(context_candidate.expect("checked above"));
        }
        if arg_is_exact {
            return pick_argument(arg_candidate.expect("checked above"));
        }
        if arity == 0 && context_candidate.is_some() {
            return pick_context(context_candidate.expect("checked above"));
        }
        if context_is_explicit && context_differs_from_arg_key {
            return pick_context(context_candidate.expect("checked above"));
        }
        if let Some(arg) = arg_candidate {
            return pick_argument(arg);
        }
        if context_is_explicit {
            return pick_context(context_candidate.expect("checked above"));
        }
        Decision::None
    }

    /// True when the context is a container type application with an argument
    /// slot resolving (directly or via alias, either direction) to the
    /// runtime type of some positional argument.
    fn container_slot_matches(&self, context: &ContextCandidate, positional: &[Value]) -> bool {
        let Some(term) = &context.term else { return false };
        let Some(app_args) = term.app_args() else { return false };
        let aliases = self.aliases.read().expect("alias lock poisoned");
        app_args.iter().any(|slot| {
            slot.head_name().is_some_and(|slot_name| {
                positional
                    .iter()
                    .any(|arg| aliases.same_type(slot_name, &arg.type_name()))
            })
        })
    }

    /// Step 8 — trait defaults: the user default (JIT-registered under the
    /// context type), then the built-in default, then a structured error.
    fn dispatch_default(
        &mut self,
        trait_name: &str,
        method_name: &str,
        positional: Vec<Value>,
    ) -> RunResult<Value> {
        let context_name = self
            .type_context
            .last()
            .cloned()
            .or_else(|| self.container_context.clone())
            .or_else(|| positional.first().map(|a| a.type_name().into_owned()));

        let user_default = {
            let registry = self.registry.read().expect("registry lock poisoned");
            registry.trait_default(trait_name, method_name).cloned()
        };
        if let Some(default) = user_default {
            if let Some(context_name) = &context_name {
                // Register the default as the instance for this type so the
                // next call resolves without the default lookup.
                let mut registry = self.registry.write().expect("registry lock poisoned");
                let mut table = registry
                    .instance(trait_name, context_name)
                    .cloned()
                    .unwrap_or_default();
                table.insert(method_name.to_owned(), default.clone());
                registry.register_instance_unchecked(trait_name, context_name, table);
            }
            self.trace_dispatch(trait_name, method_name, context_name.as_deref().unwrap_or("?"), "default");
            return self.apply(default, positional);
        }

        if let Some(result) = self.builtin_trait_default(trait_name, method_name, &positional) {
            self.trace_dispatch(trait_name, method_name, context_name.as_deref().unwrap_or("?"), "default");
            return result;
        }

        Err(RunError::no_implementation(
            trait_name,
            context_name.as_deref().unwrap_or("?"),
            method_name,
        ))
    }

    /// Built-in fallbacks for the seeded traits.
    fn builtin_trait_default(
        &mut self,
        trait_name: &str,
        method_name: &str,
        positional: &[Value],
    ) -> Option<RunResult<Value>> {
        match (trait_name, method_name, positional) {
            ("Show", "show", [value]) | ("Inspect", "inspect", [value]) => {
                Some(Ok(Value::string(&value.inspect())))
            }
            ("Eq", "(==)", [a, b]) => Some(Ok(Value::Bool(a.value_eq(b)))),
            ("Eq", "(!=)", [a, b]) => Some(Ok(Value::Bool(!a.value_eq(b)))),
            ("Ord", method, [a, b]) => {
                let ordering = self.primitive_compare(a, b).ok()?;
                let outcome = match method {
                    "(<)" => ordering.is_lt(),
                    "(<=)" => ordering.is_le(),
                    "(>)" => ordering.is_gt(),
                    "(>=)" => ordering.is_ge(),
                    _ => return None,
                };
                Some(Ok(Value::Bool(outcome)))
            }
            ("Optional", "isEmpty", [value]) => match value.success_payload() {
                Some((success, _)) => Some(Ok(Value::Bool(!success))),
                None => Some(Ok(Value::Bool(matches!(value, Value::Nil)))),
            },
            ("Optional", "unwrap", [value]) => match value.success_payload() {
                Some((true, payload)) => Some(Ok(payload.cloned().unwrap_or(Value::Nil))),
                Some((false, _)) => Some(Err(RunError::type_mismatch("unwrap of an empty value"))),
                None => None,
            },
            _ => None,
        }
    }

    /// Argument validation: a callable accepts `count` positional arguments
    /// when it is variadic with a satisfied minimum, or when its positional
    /// parameters plus defaults cover the count. Witness parameters are
    /// transparent.
    pub(crate) fn check_args_match(callable: &Value, count: usize) -> bool {
        match callable {
            Value::Function(func) => {
                let positional = func.params.len() - usize::from(func.is_variadic());
                let required = func
                    .params
                    .iter()
                    .take(positional)
                    .rposition(|p| p.default.is_none())
                    .map_or(0, |i| i + 1);
                if func.is_variadic() {
                    count >= required
                } else {
                    count >= required && count <= positional
                }
            }
            Value::Builtin(builtin) => match builtin.param_count {
                Some(param_count) => count <= param_count && count + builtin.defaults.len() >= param_count,
                None => true,
            },
            Value::Partial(partial) => count <= partial.remaining,
            _ => true,
        }
    }

    fn wants_witness(callable: &Value) -> bool {
        matches!(callable, Value::Function(func) if !func.witness_params.is_empty())
    }

    fn trace_dispatch(&self, trait_name: &str, method_name: &str, key: &str, path: &'static str) {
        self.tracer.event(TraceEvent::Dispatch {
            trait_name: trait_name.to_owned(),
            method: method_name.to_owned(),
            key: key.to_owned(),
            path,
        });
    }
}

enum Decision {
    Argument { key: String, method: Value },
    Context { type_name: String, term: Option<TypeTerm>, method: Value },
    None,
}
