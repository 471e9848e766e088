//! Type-system terms as the analyser hands them to the engine.
//!
//! The evaluator never infers types; it consumes the analyser's results —
//! a [`TypeMap`] from AST nodes to terms and a [`DispatchStrategy`] per trait
//! method — and reads head constructors off [`TypeTerm`]s to drive dispatch.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::ast::NodeId;

/// A type-system term.
///
/// Terms are small trees; the dispatcher mostly cares about the head
/// constructor name, so the representation favours cheap head extraction
/// over completeness of the surface syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeTerm {
    /// A named type constructor: `Int`, `List`, `Option`, any user type.
    Con(String),
    /// A type variable (lowercase in the surface language).
    Var(String),
    /// A type application, e.g. `List<Int>` or `Converter<Int, String>`.
    App(Box<TypeTerm>, Vec<TypeTerm>),
    /// A function type.
    Fun(Vec<TypeTerm>, Box<TypeTerm>),
    /// A tuple type.
    Tuple(Vec<TypeTerm>),
    /// A record type; `open` marks a row-polymorphic (extensible) row.
    Record { fields: Vec<(String, TypeTerm)>, open: bool },
}

impl TypeTerm {
    pub fn con(name: impl Into<String>) -> Self {
        Self::Con(name.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    pub fn app(head: impl Into<String>, args: Vec<TypeTerm>) -> Self {
        Self::App(Box::new(Self::Con(head.into())), args)
    }

    /// The head constructor name, if the term has one.
    ///
    /// `List<Int>` yields `List`; a bare `Var` yields its name only so the
    /// caller can attempt resolution against the environment.
    pub fn head_name(&self) -> Option<&str> {
        match self {
            Self::Con(name) | Self::Var(name) => Some(name),
            Self::App(head, _) => head.head_name(),
            Self::Fun(..) => Some("Function"),
            Self::Tuple(_) => Some("Tuple"),
            Self::Record { .. } => Some("Record"),
        }
    }

    /// True when the term is a type variable (dispatch treats those as "match any").
    pub fn is_var(&self) -> bool {
        matches!(self, Self::Var(_))
    }

    /// The argument terms of a type application, if this is one.
    pub fn app_args(&self) -> Option<&[TypeTerm]> {
        match self {
            Self::App(_, args) => Some(args),
            _ => None,
        }
    }
}

/// Mapping from AST node identity to the analyser's inferred type term.
///
/// Optional at every node: missing entries degrade dispatch quality (the
/// context candidate is simply absent) but never correctness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeMap {
    entries: AHashMap<NodeId, TypeTerm>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: NodeId, term: TypeTerm) {
        self.entries.insert(node, term);
    }

    pub fn get(&self, node: NodeId) -> Option<&TypeTerm> {
        self.entries.get(&node)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One dispatch input for a trait method, as chosen by the analyser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchSource {
    /// Dispatch on the runtime type of the argument at this position.
    Argument(usize),
    /// Dispatch on the expected result type of the call.
    Return,
}

/// Per-(trait, method) ordered dispatch sources.
///
/// Queried by the dispatcher when forming the context candidate and by the
/// type-application form when reifying explicit type arguments. Nested by
/// trait then method so the whole strategy snapshots as plain JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchStrategy {
    sources: AHashMap<String, AHashMap<String, Vec<DispatchSource>>>,
}

impl DispatchStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, trait_name: &str, method: &str, sources: Vec<DispatchSource>) {
        self.sources
            .entry(trait_name.to_owned())
            .or_default()
            .insert(method.to_owned(), sources);
    }

    pub fn get(&self, trait_name: &str, method: &str) -> Option<&[DispatchSource]> {
        self.sources.get(trait_name)?.get(method).map(Vec::as_slice)
    }

    /// True when any source for the method is return-position.
    pub fn dispatches_on_return(&self, trait_name: &str, method: &str) -> bool {
        self.get(trait_name, method)
            .is_some_and(|sources| sources.contains(&DispatchSource::Return))
    }
}

/// The type-alias table, seeded with the conventional `String -> List` alias.
///
/// Aliases participate in dispatch in both directions: a context type of
/// `String` may select a `List` instance and vice versa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasTable {
    forward: AHashMap<String, String>,
}

impl Default for AliasTable {
    fn default() -> Self {
        let mut forward = AHashMap::new();
        forward.insert("String".to_owned(), "List".to_owned());
        Self { forward }
    }
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.forward.insert(alias.into(), target.into());
    }

    /// Resolves one alias step, alias to target.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.forward.get(name).map(String::as_str)
    }

    /// Reverse lookup: any alias whose target is `name`.
    pub fn reverse(&self, name: &str) -> Option<&str> {
        self.forward
            .iter()
            .find(|(_, target)| target.as_str() == name)
            .map(|(alias, _)| alias.as_str())
    }

    /// True when the two names are equal directly or via one alias hop in
    /// either direction.
    pub fn same_type(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        self.resolve(a) == Some(b) || self.resolve(b) == Some(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_name_of_application() {
        let term = TypeTerm::app("List", vec![TypeTerm::con("Int")]);
        assert_eq!(term.head_name(), Some("List"));
    }

    #[test]
    fn alias_table_is_bidirectional_for_same_type() {
        let aliases = AliasTable::new();
        assert!(aliases.same_type("String", "List"));
        assert!(aliases.same_type("List", "String"));
        assert!(!aliases.same_type("String", "Map"));
    }
}
