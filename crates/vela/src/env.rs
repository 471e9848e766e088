//! Lexically-scoped environments.
//!
//! An environment is a chain of frames, each mapping names to values, linked
//! to the frame it was created under. Closures keep their defining frame
//! alive through the chain; frames form trees, never cycles, so shared
//! ownership is enough.
//!
//! Frames take a lock per access so a forked evaluator can be moved to
//! another OS thread; within one evaluator access is uncontended.

use std::sync::{Arc, RwLock};

use ahash::AHashMap;

use crate::value::Value;

#[derive(Debug)]
struct Frame {
    vars: RwLock<AHashMap<String, Value>>,
    parent: Option<Env>,
}

/// A handle to one frame of the environment chain. Cloning the handle shares
/// the frame; `enclosed()` starts a child frame.
#[derive(Debug, Clone)]
pub struct Env {
    inner: Arc<Frame>,
}

impl Env {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Frame {
                vars: RwLock::new(AHashMap::new()),
                parent: None,
            }),
        }
    }

    /// A fresh frame whose parent is this one.
    pub fn enclosed(&self) -> Self {
        Self {
            inner: Arc::new(Frame {
                vars: RwLock::new(AHashMap::new()),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Writes in the current frame, shadowing any outer binding.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.inner
            .vars
            .write()
            .expect("environment lock poisoned")
            .insert(name.into(), value);
    }

    /// Searches outward through the chain.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut env = self;
        loop {
            if let Some(value) = env.inner.vars.read().expect("environment lock poisoned").get(name) {
                return Some(value.clone());
            }
            env = env.inner.parent.as_ref()?;
        }
    }

    /// Writes into the frame that defines `name`; defines in the current
    /// frame when no enclosing frame does. Assignment expressions use this,
    /// `let`-style declarations use [`Env::define`].
    pub fn rebind(&self, name: &str, value: Value) {
        let mut env = self;
        loop {
            {
                let mut vars = env.inner.vars.write().expect("environment lock poisoned");
                if vars.contains_key(name) {
                    vars.insert(name.to_owned(), value);
                    return;
                }
            }
            match &env.inner.parent {
                Some(parent) => env = parent,
                None => {
                    self.define(name, value);
                    return;
                }
            }
        }
    }

    /// True when the two handles point at the same frame.
    pub fn same_frame(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
