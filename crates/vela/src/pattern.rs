//! Pattern matching and destructuring.
//!
//! Binding is all-or-nothing: bindings are collected into a scratch list
//! first and written to the target environment only once the whole pattern
//! has matched, so a failed match leaves the environment unchanged.

use crate::{ast::Pattern, env::Env, value::Value};

/// Attempts to match `value` against `pattern`, binding into `env` on success.
/// Returns whether the pattern matched.
pub fn match_pattern(pattern: &Pattern, value: &Value, env: &Env) -> bool {
    let mut bindings = Vec::new();
    if collect(pattern, value, &mut bindings) {
        for (name, bound) in bindings {
            env.define(name, bound);
        }
        true
    } else {
        false
    }
}

fn collect<'a>(pattern: &'a Pattern, value: &Value, bindings: &mut Vec<(&'a str, Value)>) -> bool {
    match pattern {
        Pattern::Wildcard => true,
        Pattern::Ident(name) => {
            bindings.push((name, value.clone()));
            true
        }
        Pattern::Int(expected) => value.value_eq(&Value::Int(*expected)),
        Pattern::Bool(expected) => matches!(value, Value::Bool(b) if b == expected),
        Pattern::Str(expected) => match value {
            Value::List(list) => list.as_string().as_deref() == Some(expected),
            _ => false,
        },
        Pattern::Tuple(patterns) => match value {
            Value::Tuple(items) => {
                items.len() == patterns.len()
                    && patterns
                        .iter()
                        .zip(items.iter())
                        .all(|(p, v)| collect(p, v, bindings))
            }
            _ => false,
        },
        Pattern::List(patterns) => match value {
            Value::List(list) => {
                list.len() == patterns.len()
                    && patterns
                        .iter()
                        .zip(list.iter())
                        .all(|(p, v)| collect(p, v, bindings))
            }
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::List;

    #[test]
    fn failed_match_binds_nothing() {
        let env = Env::new();
        let pattern = Pattern::Tuple(vec![Pattern::Ident("a".to_owned()), Pattern::Int(2)]);
        let value = Value::Tuple(std::sync::Arc::new(vec![Value::Int(1), Value::Int(3)]));
        assert!(!match_pattern(&pattern, &value, &env));
        assert_eq!(env.lookup("a"), None);
    }

    #[test]
    fn full_match_binds_all_names() {
        let env = Env::new();
        let pattern = Pattern::List(vec![Pattern::Ident("x".to_owned()), Pattern::Ident("y".to_owned())]);
        let value = Value::List(List::from_values([Value::Int(1), Value::Int(2)]));
        assert!(match_pattern(&pattern, &value, &env));
        assert_eq!(env.lookup("x"), Some(Value::Int(1)));
        assert_eq!(env.lookup("y"), Some(Value::Int(2)));
    }

    #[test]
    fn string_literal_pattern_matches_char_list() {
        let env = Env::new();
        assert!(match_pattern(&Pattern::Str("hi".to_owned()), &Value::string("hi"), &env));
        assert!(!match_pattern(&Pattern::Str("hi".to_owned()), &Value::string("ho"), &env));
    }

    #[test]
    fn exact_arity_is_required() {
        let env = Env::new();
        let pattern = Pattern::List(vec![Pattern::Wildcard]);
        let value = Value::List(List::from_values([Value::Int(1), Value::Int(2)]));
        assert!(!match_pattern(&pattern, &value, &env));
    }
}
