//! The operator engine.
//!
//! Binary operators resolve in a fixed order: the operator-trait table (left
//! type, then alias, then context), then any user instance providing a
//! parenthesised operator method, then the built-in primitive rules. Implicit
//! Int/Float coercion applies to arithmetic and comparison only. The lazy
//! forms — short-circuit booleans, pipes, composition, null-coalesce — are
//! evaluated here before their operands are forced.

use std::{cmp::Ordering, sync::Arc};

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::{
    ast::{InfixOp, NodeKind, NodeRef, PostfixOp, PrefixOp},
    env::Env,
    error::{RunError, RunResult},
    run::Interp,
    types::Rational,
    value::{Composed, Signal, Value},
};

impl Interp {
    pub(crate) fn eval_prefix(&mut self, op: PrefixOp, operand: &NodeRef, env: &Env) -> RunResult<Value> {
        let value = self.eval(operand, env)?;
        if matches!(value, Value::Signal(_)) {
            return Ok(value);
        }
        match (op, &value) {
            (PrefixOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (PrefixOp::Neg, Value::Int(i)) => match i.checked_neg() {
                Some(negated) => Ok(Value::Int(negated)),
                None => Ok(Value::BigInt(Arc::new(-BigInt::from(*i)))),
            },
            (PrefixOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (PrefixOp::Neg, Value::BigInt(big)) => Ok(Value::BigInt(Arc::new(-(**big).clone()))),
            (PrefixOp::Neg, Value::Rational(r)) => Ok(Value::Rational(Arc::new(r.neg()))),
            (PrefixOp::BitNot, Value::Int(i)) => Ok(Value::Int(!i)),
            (op, value) => Err(RunError::unknown_operator(op.into(), &value.type_name())),
        }
    }

    /// Postfix `?`: unwraps `Ok`/`Some`, or turns `Fail`/`None` into an
    /// early-return signal the enclosing function propagates verbatim.
    pub(crate) fn eval_postfix(&mut self, op: PostfixOp, operand: &NodeRef, env: &Env) -> RunResult<Value> {
        let value = self.eval(operand, env)?;
        if matches!(value, Value::Signal(_)) {
            return Ok(value);
        }
        match op {
            PostfixOp::Try => match value.success_payload() {
                Some((true, payload)) => Ok(payload.cloned().unwrap_or(Value::Nil)),
                Some((false, _)) => Ok(Value::signal(Signal::Return(value))),
                None => Err(RunError::type_mismatch(format!(
                    "? requires an Option or Result, found {}",
                    value.type_name()
                ))),
            },
        }
    }

    pub(crate) fn eval_infix(
        &mut self,
        op: InfixOp,
        left: &NodeRef,
        right: &NodeRef,
        env: &Env,
        node: &NodeRef,
    ) -> RunResult<Value> {
        match op {
            InfixOp::And => {
                let left_value = self.eval(left, env)?;
                if matches!(left_value, Value::Signal(_)) {
                    return Ok(left_value);
                }
                if !left_value.as_bool()? {
                    return Ok(Value::Bool(false));
                }
                let right_value = self.eval(right, env)?;
                if matches!(right_value, Value::Signal(_)) {
                    return Ok(right_value);
                }
                Ok(Value::Bool(right_value.as_bool()?))
            }
            InfixOp::Or => {
                let left_value = self.eval(left, env)?;
                if matches!(left_value, Value::Signal(_)) {
                    return Ok(left_value);
                }
                if left_value.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                let right_value = self.eval(right, env)?;
                if matches!(right_value, Value::Signal(_)) {
                    return Ok(right_value);
                }
                Ok(Value::Bool(right_value.as_bool()?))
            }
            InfixOp::Coalesce => self.eval_coalesce(left, right, env),
            InfixOp::Pipe => self.eval_pipe(left, right, env, node, false),
            InfixOp::PipeUnwrap => self.eval_pipe(left, right, env, node, true),
            InfixOp::Compose => {
                let outer = self.eval(left, env)?;
                let inner = self.eval(right, env)?;
                Ok(Value::Composed(Arc::new(Composed { outer, inner })))
            }
            InfixOp::Apply => {
                let callee = self.eval(left, env)?;
                let arg = self.eval(right, env)?;
                if matches!(arg, Value::Signal(_)) {
                    return Ok(arg);
                }
                self.apply(callee, vec![arg])
            }
            _ => {
                let left_value = self.eval(left, env)?;
                if matches!(left_value, Value::Signal(_)) {
                    return Ok(left_value);
                }
                let right_value = self.eval(right, env)?;
                if matches!(right_value, Value::Signal(_)) {
                    return Ok(right_value);
                }
                self.infix_values(op, left_value, right_value)
            }
        }
    }

    /// `??`: `Nil` on the left forces the right; an empty optional (via the
    /// `Optional` trait for the left's runtime type) forces the right;
    /// otherwise the left unwraps, or passes through untouched when it is not
    /// optional at all.
    fn eval_coalesce(&mut self, left: &NodeRef, right: &NodeRef, env: &Env) -> RunResult<Value> {
        let left_value = self.eval(left, env)?;
        if matches!(left_value, Value::Signal(_)) {
            return Ok(left_value);
        }
        if matches!(left_value, Value::Nil) {
            return self.eval(right, env);
        }
        if let Some((success, payload)) = left_value.success_payload() {
            return if success {
                Ok(payload.cloned().unwrap_or(Value::Nil))
            } else {
                self.eval(right, env)
            };
        }
        let type_name = left_value.type_name().into_owned();
        let (is_empty, unwrap) = {
            let registry = self.registry.read().expect("registry lock poisoned");
            let aliases = self.aliases.read().expect("alias lock poisoned");
            let table = registry
                .instance("Optional", &type_name)
                .or_else(|| aliases.resolve(&type_name).and_then(|a| registry.instance("Optional", a)));
            match table {
                Some(table) => (table.get("isEmpty").cloned(), table.get("unwrap").cloned()),
                None => (None, None),
            }
        };
        match (is_empty, unwrap) {
            (Some(is_empty), Some(unwrap)) => {
                let verdict = self.apply(is_empty, vec![left_value.clone()])?;
                if verdict.as_bool()? {
                    self.eval(right, env)
                } else {
                    self.apply(unwrap, vec![left_value])
                }
            }
            // Not an optional type: the left value stands.
            _ => Ok(left_value),
        }
    }

    /// `|>`: pipes the left value into the right-hand call, replacing a
    /// single `_` placeholder when present, appending otherwise. `|>>`
    /// additionally unwraps `Ok`/`Some` and raises on `Fail`/`None`.
    fn eval_pipe(
        &mut self,
        left: &NodeRef,
        right: &NodeRef,
        env: &Env,
        node: &NodeRef,
        unwrap: bool,
    ) -> RunResult<Value> {
        let piped = self.eval(left, env)?;
        if matches!(piped, Value::Signal(_)) {
            return Ok(piped);
        }
        let result = if let NodeKind::Call { target, args, witnesses, .. } = &right.kind {
            let callee = self.eval(target, env)?;
            let mut call_args = Vec::with_capacity(witnesses.len() + args.len() + 1);
            for witness in witnesses {
                let value = self.eval(witness, env)?;
                if matches!(value, Value::Dictionary(_)) {
                    call_args.push(value);
                }
            }
            let placeholder = args
                .iter()
                .position(|arg| matches!(&arg.kind, NodeKind::Ident { name } if name == "_"));
            let mut piped = Some(piped);
            for (i, arg) in args.iter().enumerate() {
                if placeholder == Some(i) {
                    call_args.push(piped.take().expect("placeholder appears once"));
                } else {
                    let value = self.eval(arg, env)?;
                    if matches!(value, Value::Signal(_)) {
                        return Ok(value);
                    }
                    call_args.push(value);
                }
            }
            if let Some(rest) = piped.take() {
                call_args.push(rest);
            }
            let saved_node = self.current_call_node.replace(Arc::clone(right));
            let saved_env = self.current_env.replace(env.clone());
            let result = self.apply(callee, call_args);
            self.current_call_node = saved_node;
            self.current_env = saved_env;
            result?
        } else {
            let callee = self.eval(right, env)?;
            let saved_node = self.current_call_node.replace(Arc::clone(node));
            let saved_env = self.current_env.replace(env.clone());
            let result = self.apply(callee, vec![piped]);
            self.current_call_node = saved_node;
            self.current_env = saved_env;
            result?
        };
        if !unwrap {
            return Ok(result);
        }
        match result.success_payload() {
            Some((true, payload)) => Ok(payload.cloned().unwrap_or(Value::Nil)),
            Some((false, _)) => Err(RunError::invalid(format!("pipe unwrap on {}", result.inspect()))),
            None => Ok(result),
        }
    }

    /// Strict binary dispatch: operator-trait table, then any user `(op)`
    /// method for the left type, then the primitive rules.
    pub(crate) fn infix_values(&mut self, op: InfixOp, left: Value, right: Value) -> RunResult<Value> {
        let token: &'static str = op.into();
        if let Some(found) = self.operator_trait_method(token, &left) {
            // `>>=` and its container-shaped kin publish the left type as the
            // container context so nested dispatches land in it.
            let container_shaped = matches!(op, InfixOp::Bind | InfixOp::Ap | InfixOp::Fmap);
            let saved_context = if container_shaped {
                self.container_context.replace(left.type_name().into_owned())
            } else {
                self.container_context.clone()
            };
            let result = self.apply(found, vec![left, right]);
            self.container_context = saved_context;
            return result;
        }
        if let Some(found) = self.any_operator_method(token, &left) {
            return self.apply(found, vec![left, right]);
        }
        self.primitive_infix(op, left, right)
    }

    /// Looks the operator up through its mapped trait, trying the left type,
    /// its alias, then the context type.
    fn operator_trait_method(&self, token: &str, left: &Value) -> Option<Value> {
        let registry = self.registry.read().expect("registry lock poisoned");
        let aliases = self.aliases.read().expect("alias lock poisoned");
        let trait_name = registry.operator_trait(token)?.to_owned();
        let method_name = registry
            .trait_info(&trait_name)
            .and_then(|info| info.operator_method(token))
            .map_or_else(|| format!("({token})"), |m| m.name.clone());
        let left_type = left.type_name().into_owned();
        let mut keys: Vec<String> = vec![left_type.clone()];
        if let Some(alias) = aliases.resolve(&left_type) {
            keys.push(alias.to_owned());
        }
        if let Some(context) = self.type_context.last() {
            keys.push(context.clone());
        }
        keys.iter().find_map(|key| {
            registry
                .instance(&trait_name, key)
                .and_then(|table| table.get(&method_name))
                .cloned()
        })
    }

    /// Any user trait instance for the left type providing a `(op)` method.
    fn any_operator_method(&self, token: &str, left: &Value) -> Option<Value> {
        let registry = self.registry.read().expect("registry lock poisoned");
        let aliases = self.aliases.read().expect("alias lock poisoned");
        let method_name = format!("({token})");
        let left_type = left.type_name().into_owned();
        let mut keys: Vec<String> = vec![left_type.clone()];
        if let Some(alias) = aliases.resolve(&left_type) {
            keys.push(alias.to_owned());
        }
        if let Some(context) = self.type_context.last() {
            keys.push(context.clone());
        }
        for trait_name in registry.trait_names() {
            for key in &keys {
                if let Some(method) = registry.instance(trait_name, key).and_then(|t| t.get(&method_name)) {
                    return Some(method.clone());
                }
            }
        }
        None
    }

    /// The built-in primitive rules.
    fn primitive_infix(&mut self, op: InfixOp, left: Value, right: Value) -> RunResult<Value> {
        match op {
            InfixOp::Add | InfixOp::Sub | InfixOp::Mul | InfixOp::Div | InfixOp::Mod => {
                self.numeric_infix(op, &left, &right)
            }
            InfixOp::Eq => Ok(Value::Bool(Self::loose_eq(&left, &right))),
            InfixOp::Ne => Ok(Value::Bool(!Self::loose_eq(&left, &right))),
            InfixOp::Lt => Ok(Value::Bool(self.primitive_compare(&left, &right)?.is_lt())),
            InfixOp::Le => Ok(Value::Bool(self.primitive_compare(&left, &right)?.is_le())),
            InfixOp::Gt => Ok(Value::Bool(self.primitive_compare(&left, &right)?.is_gt())),
            InfixOp::Ge => Ok(Value::Bool(self.primitive_compare(&left, &right)?.is_ge())),
            InfixOp::Concat => match (&left, &right) {
                (Value::List(a), Value::List(b)) => Ok(Value::List(a.concat(b))),
                (Value::Bytes(a), Value::Bytes(b)) => Ok(Value::Bytes(a.concat(b))),
                (Value::Bits(a), Value::Bits(b)) => Ok(Value::Bits(a.concat(b))),
                (Value::Map(a), Value::Map(b)) => Ok(Value::Map(a.merge(b))),
                _ => Err(RunError::unknown_operator("++", &left.type_name())),
            },
            InfixOp::Cons => match right {
                Value::List(list) => Ok(Value::List(list.prepend(left))),
                _ => Err(RunError::unknown_operator("::", &right.type_name())),
            },
            InfixOp::Bind | InfixOp::Ap | InfixOp::Fmap => {
                // No trait instance resolved above; the built-in containers
                // get direct implementations.
                self.container_primitive(op, left, right)
            }
            InfixOp::And | InfixOp::Or | InfixOp::Coalesce | InfixOp::Pipe | InfixOp::PipeUnwrap
            | InfixOp::Compose | InfixOp::Apply => {
                unreachable!("lazy forms are handled before operand evaluation")
            }
        }
    }

    /// Built-in Functor/Applicative/Monad behaviour for lists, options, and
    /// results, used when no user instance overrides it.
    fn container_primitive(&mut self, op: InfixOp, left: Value, right: Value) -> RunResult<Value> {
        let saved_context = self.container_context.replace(left.type_name().into_owned());
        let result = (|| match (op, &left) {
            (InfixOp::Bind, Value::List(list)) => {
                let mut out = crate::types::List::new();
                for item in list.iter() {
                    let mapped = self.apply(right.clone(), vec![item.clone()])?;
                    match mapped {
                        Value::List(inner) => out = out.concat(&inner),
                        other => {
                            return Err(RunError::type_mismatch(format!(
                                ">>= over a list requires list results, found {}",
                                other.type_name()
                            )));
                        }
                    }
                }
                Ok(Value::List(out))
            }
            (InfixOp::Fmap, Value::List(list)) => {
                let mut out = Vec::with_capacity(list.len());
                for item in list.iter() {
                    out.push(self.apply(right.clone(), vec![item.clone()])?);
                }
                Ok(Value::List(out.into_iter().collect()))
            }
            (InfixOp::Bind | InfixOp::Fmap, _) => match left.success_payload() {
                Some((true, payload)) => {
                    let payload = payload.cloned().unwrap_or(Value::Nil);
                    let mapped = self.apply(right.clone(), vec![payload])?;
                    if op == InfixOp::Fmap {
                        // fmap re-wraps; bind expects the callee to wrap.
                        match &left {
                            Value::Adt(adt) if adt.type_name == "Option" => Ok(Value::some(mapped)),
                            _ => Ok(Value::ok(mapped)),
                        }
                    } else {
                        Ok(mapped)
                    }
                }
                Some((false, _)) => Ok(left.clone()),
                None => Err(RunError::unknown_operator(InfixOp::Bind.into(), &left.type_name())),
            },
            (InfixOp::Ap, Value::List(list)) => {
                let Value::List(args) = &right else {
                    return Err(RunError::type_mismatch("<*> over a list requires a list argument"));
                };
                let mut out = Vec::new();
                for func in list.iter() {
                    for arg in args.iter() {
                        out.push(self.apply(func.clone(), vec![arg.clone()])?);
                    }
                }
                Ok(Value::List(out.into_iter().collect()))
            }
            (InfixOp::Ap, _) => match (left.success_payload(), right.success_payload()) {
                (Some((true, Some(func))), Some((true, payload))) => {
                    let func = func.clone();
                    let arg = payload.cloned().unwrap_or(Value::Nil);
                    let mapped = self.apply(func, vec![arg])?;
                    match &left {
                        Value::Adt(adt) if adt.type_name == "Option" => Ok(Value::some(mapped)),
                        _ => Ok(Value::ok(mapped)),
                    }
                }
                (Some((false, _)), _) => Ok(left.clone()),
                (Some((true, _)), Some((false, _))) => Ok(right.clone()),
                _ => Err(RunError::unknown_operator(InfixOp::Ap.into(), &left.type_name())),
            },
            _ => Err(RunError::unknown_operator(op.into(), &left.type_name())),
        })();
        self.container_context = saved_context;
        result
    }

    fn numeric_infix(&mut self, op: InfixOp, left: &Value, right: &Value) -> RunResult<Value> {
        use InfixOp::{Add, Div, Mod, Mul, Sub};
        // Float contaminates; Rational beats BigInt beats Int.
        if matches!(left, Value::Float(_)) || matches!(right, Value::Float(_)) {
            let (a, b) = (Self::to_f64(left), Self::to_f64(right));
            let (Some(a), Some(b)) = (a, b) else {
                return Err(RunError::unknown_operator(op.into(), &left.type_name()));
            };
            return Ok(Value::Float(match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                Mod => a % b,
                _ => unreachable!("numeric operator"),
            }));
        }
        if matches!(left, Value::Rational(_)) || matches!(right, Value::Rational(_)) {
            let (Some(a), Some(b)) = (Self::to_rational(left), Self::to_rational(right)) else {
                return Err(RunError::unknown_operator(op.into(), &left.type_name()));
            };
            return Ok(Value::Rational(Arc::new(match op {
                Add => a.add(&b),
                Sub => a.sub(&b),
                Mul => a.mul(&b),
                Div => a.div(&b)?,
                Mod => {
                    // a mod b = a - b * trunc(a / b)
                    let quotient = a.div(&b)?;
                    let truncated = Rational::from_bigint(
                        quotient.numerator() / quotient.denominator(),
                    );
                    a.sub(&b.mul(&truncated))
                }
                _ => unreachable!("numeric operator"),
            })));
        }
        if matches!(left, Value::BigInt(_)) || matches!(right, Value::BigInt(_)) {
            let (Some(a), Some(b)) = (Self::to_bigint(left), Self::to_bigint(right)) else {
                return Err(RunError::unknown_operator(op.into(), &left.type_name()));
            };
            if matches!(op, Div | Mod) && b.is_zero() {
                return Err(RunError::division_by_zero());
            }
            return Ok(Self::shrink_bigint(match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                Mod => a % b,
                _ => unreachable!("numeric operator"),
            }));
        }
        let (Value::Int(a), Value::Int(b)) = (left, right) else {
            return Err(RunError::unknown_operator(op.into(), &left.type_name()));
        };
        if matches!(op, Div | Mod) && *b == 0 {
            return Err(RunError::division_by_zero());
        }
        let checked = match op {
            Add => a.checked_add(*b),
            Sub => a.checked_sub(*b),
            Mul => a.checked_mul(*b),
            Div => a.checked_div(*b),
            Mod => a.checked_rem(*b),
            _ => unreachable!("numeric operator"),
        };
        match checked {
            Some(result) => Ok(Value::Int(result)),
            // Overflow promotes to BigInt.
            None => {
                let (a, b) = (BigInt::from(*a), BigInt::from(*b));
                Ok(Self::shrink_bigint(match op {
                    Add => a + b,
                    Sub => a - b,
                    Mul => a * b,
                    Div => a / b,
                    Mod => a % b,
                    _ => unreachable!("numeric operator"),
                }))
            }
        }
    }

    /// Equality with Int/Float coercion, falling back to structural equality.
    fn loose_eq(left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Int(_) | Value::Float(_) | Value::BigInt(_) | Value::Rational(_), _)
                if Self::is_numeric(right) =>
            {
                if matches!(left, Value::Float(_)) || matches!(right, Value::Float(_)) {
                    match (Self::to_f64(left), Self::to_f64(right)) {
                        (Some(a), Some(b)) => a == b,
                        _ => false,
                    }
                } else if matches!(left, Value::Rational(_)) || matches!(right, Value::Rational(_)) {
                    match (Self::to_rational(left), Self::to_rational(right)) {
                        (Some(a), Some(b)) => a == b,
                        _ => false,
                    }
                } else {
                    left.value_eq(right)
                }
            }
            _ => left.value_eq(right),
        }
    }

    /// Comparison over the primitive orderable shapes.
    pub(crate) fn primitive_compare(&self, left: &Value, right: &Value) -> RunResult<Ordering> {
        match (left, right) {
            _ if Self::is_numeric(left) && Self::is_numeric(right) => {
                if matches!(left, Value::Float(_)) || matches!(right, Value::Float(_)) {
                    let (Some(a), Some(b)) = (Self::to_f64(left), Self::to_f64(right)) else {
                        return Err(RunError::type_mismatch("incomparable numeric values"));
                    };
                    a.partial_cmp(&b)
                        .ok_or_else(|| RunError::type_mismatch("NaN is unordered"))
                } else {
                    let (Some(a), Some(b)) = (Self::to_rational(left), Self::to_rational(right)) else {
                        return Err(RunError::type_mismatch("incomparable numeric values"));
                    };
                    Ok(a.compare(&b))
                }
            }
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Char(a), Value::Char(b)) => Ok(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Ok(a.compare(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match self.primitive_compare(x, y)? {
                        Ordering::Equal => {}
                        other => return Ok(other),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match self.primitive_compare(x, y)? {
                        Ordering::Equal => {}
                        other => return Ok(other),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(RunError::type_mismatch(format!(
                "cannot compare {} with {}",
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn is_numeric(value: &Value) -> bool {
        matches!(
            value,
            Value::Int(_) | Value::Float(_) | Value::BigInt(_) | Value::Rational(_)
        )
    }

    fn to_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::BigInt(big) => big.to_f64(),
            Value::Rational(r) => Some(r.to_f64()),
            _ => None,
        }
    }

    fn to_bigint(value: &Value) -> Option<BigInt> {
        match value {
            Value::Int(i) => Some(BigInt::from(*i)),
            Value::BigInt(big) => Some((**big).clone()),
            _ => None,
        }
    }

    fn to_rational(value: &Value) -> Option<Rational> {
        match value {
            Value::Int(i) => Some(Rational::from_int(*i)),
            Value::BigInt(big) => Some(Rational::from_bigint((**big).clone())),
            Value::Rational(r) => Some((**r).clone()),
            _ => None,
        }
    }

    /// Demotes a BigInt result back to Int when it fits.
    fn shrink_bigint(big: BigInt) -> Value {
        match big.to_i64() {
            Some(i) => Value::Int(i),
            None => Value::BigInt(Arc::new(big)),
        }
    }
}
