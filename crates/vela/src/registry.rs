//! The trait and instance registry.
//!
//! Instances are indexed `trait name -> type key -> method table`, where the
//! type key is the single type name for single-parameter traits or the
//! underscore-joined tuple `T1_T2_..._Tn` for multi-parameter traits. Tables
//! use `IndexMap` so key scans (the dispatcher's fuzzy match) iterate in
//! registration order and stay deterministic.
//!
//! Registration is idempotent: re-registering a key replaces its table. A
//! trait's key arity is inferred from its first registered key; instances
//! with a different arity are rejected, which the analyser guarantees never
//! happens for well-typed programs.
//!
//! The registry freezes before concurrent serving begins ("register before
//! you serve"); forked evaluators share it read-only.

use std::sync::Arc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    error::{RunError, RunResult},
    value::{Dictionary, Value},
};

/// Canonical method metadata for a declared trait.
#[derive(Debug, Clone)]
pub struct TraitMethod {
    pub name: String,
    pub arity: usize,
    /// Operator token this method backs, e.g. `+` for `Numeric.(+)`.
    pub operator: Option<String>,
}

/// A declared trait: canonical method order, super-traits, defaults.
#[derive(Debug, Clone, Default)]
pub struct TraitInfo {
    pub name: String,
    pub type_params: Vec<String>,
    pub supers: Vec<String>,
    /// Canonical method list in declaration order.
    pub methods: Vec<TraitMethod>,
    /// User-supplied default bodies by method name.
    pub defaults: IndexMap<String, Value>,
}

impl TraitInfo {
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    pub fn method_arity(&self, name: &str) -> Option<usize> {
        self.methods.iter().find(|m| m.name == name).map(|m| m.arity)
    }

    /// The method bound to an operator token, when the trait declares one.
    pub fn operator_method(&self, op: &str) -> Option<&TraitMethod> {
        self.methods.iter().find(|m| m.operator.as_deref() == Some(op))
    }
}

/// The methods one instance provides.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    methods: IndexMap<String, Value>,
}

impl MethodTable {
    pub fn new(methods: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn insert(&mut self, name: String, value: Value) {
        self.methods.insert(name, value);
    }
}

/// The registry: traits, instances, super-trait relations, operator bindings.
#[derive(Debug, Default)]
pub struct Registry {
    traits: IndexMap<String, TraitInfo>,
    instances: IndexMap<String, IndexMap<String, MethodTable>>,
    /// Operator token -> owning trait, seeded with the built-in bindings.
    operator_traits: AHashMap<String, String>,
    frozen: bool,
}

impl Registry {
    /// A registry pre-seeded with the built-in trait declarations and
    /// operator bindings the engine's primitives rely on.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.seed_builtin_traits();
        registry
    }

    fn seed_builtin_traits(&mut self) {
        let seed = |registry: &mut Self, name: &str, params: &[&str], methods: &[(&str, usize, Option<&str>)]| {
            let info = TraitInfo {
                name: name.to_owned(),
                type_params: params.iter().map(|&p| p.to_owned()).collect(),
                supers: Vec::new(),
                methods: methods
                    .iter()
                    .map(|&(method, arity, op)| TraitMethod {
                        name: method.to_owned(),
                        arity,
                        operator: op.map(str::to_owned),
                    })
                    .collect(),
                defaults: IndexMap::new(),
            };
            registry.declare_trait(info).expect("seeding before freeze");
        };
        seed(self, "Numeric", &["a"], &[
            ("(+)", 2, Some("+")),
            ("(-)", 2, Some("-")),
            ("(*)", 2, Some("*")),
            ("(/)", 2, Some("/")),
            ("(%)", 2, Some("%")),
        ]);
        seed(self, "Eq", &["a"], &[("(==)", 2, Some("==")), ("(!=)", 2, Some("!="))]);
        seed(self, "Ord", &["a"], &[
            ("(<)", 2, Some("<")),
            ("(<=)", 2, Some("<=")),
            ("(>)", 2, Some(">")),
            ("(>=)", 2, Some(">=")),
        ]);
        seed(self, "Semigroup", &["a"], &[("(++)", 2, Some("++"))]);
        seed(self, "Functor", &["f"], &[("fmap", 2, Some("<$>"))]);
        seed(self, "Applicative", &["f"], &[("pure", 1, None), ("ap", 2, Some("<*>"))]);
        seed(self, "Monad", &["m"], &[("bind", 2, Some(">>="))]);
        seed(self, "Show", &["a"], &[("show", 1, None)]);
        seed(self, "Inspect", &["a"], &[("inspect", 1, None)]);
        seed(self, "Optional", &["f"], &[("isEmpty", 1, None), ("unwrap", 1, None)]);
    }

    fn check_mutable(&self) -> RunResult<()> {
        if self.frozen {
            Err(RunError::invalid("registry is frozen; register before you serve"))
        } else {
            Ok(())
        }
    }

    /// Freezes the registry; all registration from here on is rejected.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Declares (or re-declares) a trait and its operator bindings.
    pub fn declare_trait(&mut self, info: TraitInfo) -> RunResult<()> {
        self.check_mutable()?;
        for method in &info.methods {
            if let Some(op) = &method.operator {
                self.operator_traits.insert(op.clone(), info.name.clone());
            }
        }
        self.traits.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn trait_info(&self, name: &str) -> Option<&TraitInfo> {
        self.traits.get(name)
    }

    /// All declared trait names, registration-ordered.
    pub fn trait_names(&self) -> impl Iterator<Item = &str> {
        self.traits.keys().map(String::as_str)
    }

    /// The trait a binary operator token is mapped to, if any.
    pub fn operator_trait(&self, op: &str) -> Option<&str> {
        self.operator_traits.get(op).map(String::as_str)
    }

    /// Super-traits of a trait (empty for unknown traits).
    pub fn supers(&self, trait_name: &str) -> &[String] {
        self.traits.get(trait_name).map_or(&[], |info| info.supers.as_slice())
    }

    /// Registers a user default body for a trait method.
    pub fn set_trait_default(&mut self, trait_name: &str, method: &str, body: Value) -> RunResult<()> {
        self.check_mutable()?;
        let info = self
            .traits
            .get_mut(trait_name)
            .ok_or_else(|| RunError::invalid(format!("default for undeclared trait {trait_name}")))?;
        info.defaults.insert(method.to_owned(), body);
        Ok(())
    }

    pub fn trait_default(&self, trait_name: &str, method: &str) -> Option<&Value> {
        self.traits.get(trait_name)?.defaults.get(method)
    }

    /// The underscore-joined key for an ordered tuple of type names.
    pub fn join_key(parts: &[String]) -> String {
        parts.join("_")
    }

    /// Key arity for a trait, inferred from its first registered key.
    ///
    /// Precondition (enforced at registration): every instance of one trait
    /// shares the same key arity.
    pub fn key_arity(&self, trait_name: &str) -> Option<usize> {
        let table = self.instances.get(trait_name)?;
        let key = table.keys().next()?;
        Some(key.split('_').count())
    }

    /// Registers an instance; replaces any table already at the key.
    pub fn register_instance(
        &mut self,
        trait_name: &str,
        type_key: &[String],
        methods: MethodTable,
    ) -> RunResult<()> {
        self.check_mutable()?;
        if let Some(arity) = self.key_arity(trait_name)
            && arity != type_key.len()
        {
            return Err(RunError::invalid(format!(
                "instance of {trait_name} with key arity {} conflicts with existing arity {arity}",
                type_key.len()
            )));
        }
        self.instances
            .entry(trait_name.to_owned())
            .or_default()
            .insert(Self::join_key(type_key), methods);
        Ok(())
    }

    /// JIT registration used by dispatch step 8; exempt from the freeze so a
    /// first call through a default stays cheap on later calls. The table it
    /// writes is derived from frozen state, so concurrent forks may race to
    /// write the same entry.
    pub(crate) fn register_instance_unchecked(&mut self, trait_name: &str, key: &str, methods: MethodTable) {
        self.instances
            .entry(trait_name.to_owned())
            .or_default()
            .insert(key.to_owned(), methods);
    }

    pub fn instance(&self, trait_name: &str, key: &str) -> Option<&MethodTable> {
        self.instances.get(trait_name)?.get(key)
    }

    /// All (key, table) pairs of a trait, registration-ordered.
    pub fn instances_of(&self, trait_name: &str) -> impl Iterator<Item = (&str, &MethodTable)> {
        self.instances
            .get(trait_name)
            .into_iter()
            .flat_map(|table| table.iter().map(|(k, v)| (k.as_str(), v)))
    }

    /// Builds the runtime dictionary for `(trait, type key)`.
    ///
    /// The Methods array has one slot per canonical method in declared order;
    /// a slot without an implementation (and without a user default) holds an
    /// error value. Supers are built recursively for the same type key.
    pub fn build_dictionary(&self, trait_name: &str, key: &str) -> RunResult<Arc<Dictionary>> {
        let info = self
            .traits
            .get(trait_name)
            .ok_or_else(|| RunError::invalid(format!("dictionary for undeclared trait {trait_name}")))?;
        let table = self.instances.get(trait_name).and_then(|t| t.get(key));
        let methods = info
            .methods
            .iter()
            .map(|method| {
                let value = table
                    .and_then(|t| t.get(&method.name))
                    .or_else(|| info.defaults.get(&method.name))
                    .cloned()
                    .unwrap_or_else(|| {
                        Value::Error(Arc::new(RunError::no_implementation(trait_name, key, &method.name)))
                    });
                (method.name.clone(), value)
            })
            .collect();
        let supers = info
            .supers
            .iter()
            .map(|super_name| self.build_dictionary(super_name, key))
            .collect::<RunResult<Vec<_>>>()?;
        Ok(Arc::new(Dictionary {
            trait_name: trait_name.to_owned(),
            methods,
            supers,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[&str]) -> MethodTable {
        MethodTable::new(entries.iter().map(|&name| (name.to_owned(), Value::Int(0))))
    }

    #[test]
    fn key_arity_is_inferred_from_first_key() {
        let mut registry = Registry::with_builtins();
        registry
            .register_instance("Converter", &["Int".to_owned(), "String".to_owned()], table(&["convert"]))
            .unwrap();
        assert_eq!(registry.key_arity("Converter"), Some(2));
        let clash = registry.register_instance("Converter", &["Int".to_owned()], table(&["convert"]));
        assert!(clash.is_err());
    }

    #[test]
    fn double_registration_replaces() {
        let mut registry = Registry::with_builtins();
        registry
            .register_instance("Show", &["Int".to_owned()], table(&["show"]))
            .unwrap();
        registry
            .register_instance("Show", &["Int".to_owned()], MethodTable::new([("show".to_owned(), Value::Int(1))]))
            .unwrap();
        assert!(
            registry
                .instance("Show", "Int")
                .unwrap()
                .get("show")
                .unwrap()
                .value_eq(&Value::Int(1))
        );
    }

    #[test]
    fn frozen_registry_rejects_registration() {
        let mut registry = Registry::with_builtins();
        registry.freeze();
        let result = registry.register_instance("Show", &["Int".to_owned()], table(&["show"]));
        assert!(result.is_err());
    }

    #[test]
    fn dictionary_has_a_slot_per_canonical_method() {
        let mut registry = Registry::with_builtins();
        registry
            .register_instance("Applicative", &["Option".to_owned()], table(&["pure"]))
            .unwrap();
        let dict = registry.build_dictionary("Applicative", "Option").unwrap();
        assert_eq!(dict.methods.len(), 2);
        assert!(dict.method("pure").is_some());
        // missing `ap` holds an error value in its slot
        assert!(matches!(dict.method("ap"), Some(Value::Error(_))));
    }

    #[test]
    fn dictionary_chains_supers() {
        let mut registry = Registry::with_builtins();
        let monad = TraitInfo {
            name: "Monad".to_owned(),
            type_params: vec!["m".to_owned()],
            supers: vec!["Applicative".to_owned()],
            methods: vec![TraitMethod {
                name: "bind".to_owned(),
                arity: 2,
                operator: Some(">>=".to_owned()),
            }],
            defaults: IndexMap::new(),
        };
        registry.declare_trait(monad).unwrap();
        let dict = registry.build_dictionary("Monad", "List").unwrap();
        assert_eq!(dict.supers.len(), 1);
        assert_eq!(dict.supers[0].trait_name, "Applicative");
    }
}
