//! Variable context.
//!
//! The caller supplies a [`Context`], the context-inference stage enriches it,
//! and compilation finishes by storing the rendered document under `text`.
//! Entries are only ever added or overwritten, never removed.

use std::collections::HashMap;

use crate::script::{EvalContext, Value};

/// Name → value store handed through a compilation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    vars: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Get a variable's value if it is a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.vars.get(name)? {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns `true` if the variable is set.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Copy every entry of `other` into `self`; `other` wins on collision.
    pub fn merge(&mut self, other: Context) {
        self.vars.extend(other.vars);
    }

    /// Iterate over all variables.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl EvalContext for Context {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Context {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
