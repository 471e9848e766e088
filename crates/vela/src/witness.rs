//! The witness stack: per-evaluator context for trait resolution.
//!
//! Each frame maps trait-or-context names to the type terms witnessed for
//! them. Annotated expressions, declared return types, and context dispatch
//! push frames; closures capture a snapshot of the whole stack at definition
//! time so they resolve trait methods as if still at their definition depth.
//!
//! Frames are shared behind `Arc`, so a snapshot is one pointer-vector clone.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::typesys::TypeTerm;

/// Reserved frame name carrying the expected-result context type.
pub const CONTEXT_TYPE: &str = "$ContextType";
/// Reserved frame name carrying the declared return type.
pub const RETURN: &str = "$Return";
/// Reserved trait name for witness placeholders, always stripped by dispatch.
pub const PLACEHOLDER: &str = "$placeholder";

/// One frame: a handful of (name, witnessed types) entries.
#[derive(Debug, Clone, Default)]
pub struct WitnessFrame {
    entries: SmallVec<[(String, Vec<TypeTerm>); 2]>,
}

impl WitnessFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// A frame witnessing one name with one type.
    pub fn single(name: impl Into<String>, term: TypeTerm) -> Self {
        let mut frame = Self::new();
        frame.insert(name, vec![term]);
        frame
    }

    /// The `{$ContextType: [T], $Return: [T]}` frame pushed by annotations and
    /// declared return types.
    pub fn context(term: TypeTerm) -> Self {
        let mut frame = Self::new();
        frame.insert(CONTEXT_TYPE, vec![term.clone()]);
        frame.insert(RETURN, vec![term]);
        frame
    }

    pub fn insert(&mut self, name: impl Into<String>, terms: Vec<TypeTerm>) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = terms;
        } else {
            self.entries.push((name, terms));
        }
    }

    pub fn get(&self, name: &str) -> Option<&[TypeTerm]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, terms)| terms.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The stack itself. Cloning shares every frame.
#[derive(Debug, Clone, Default)]
pub struct WitnessStack {
    frames: Vec<Arc<WitnessFrame>>,
}

impl WitnessStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: WitnessFrame) {
        self.frames.push(Arc::new(frame));
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Drops frames pushed past `depth`; used by the trampoline to reset the
    /// stack between tail iterations.
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    /// Searches the stack top-down for the most recent witness of `name`.
    pub fn lookup(&self, name: &str) -> Option<&[TypeTerm]> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// O(frames) snapshot sharing every frame, taken at closure capture.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}
