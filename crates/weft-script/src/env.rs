/*
 * env.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Variable environments.
//!
//! An [`Env`] is one frame of bindings with an optional parent.
//! Handles are reference-counted, so cloning an `Env` aliases the same
//! frame: the engine keeps a handle to a run's global frame while
//! directive code mutates it, and closures keep their defining frame
//! alive after the defining file has finished executing.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// A shared handle to one environment frame.
#[derive(Clone)]
pub struct Env {
    inner: Rc<RefCell<EnvData>>,
}

struct EnvData {
    vars: HashMap<String, Value>,
    parent: Option<Env>,
}

impl Env {
    /// Create a new root frame.
    pub fn new() -> Env {
        Env {
            inner: Rc::new(RefCell::new(EnvData {
                vars: HashMap::new(),
                parent: None,
            })),
        }
    }

    /// Create a child frame whose lookups fall through to `self`.
    pub fn child(&self) -> Env {
        Env {
            inner: Rc::new(RefCell::new(EnvData {
                vars: HashMap::new(),
                parent: Some(self.clone()),
            })),
        }
    }

    /// Look a name up, walking parent frames.
    pub fn get(&self, name: &str) -> Option<Value> {
        let data = self.inner.borrow();
        if let Some(value) = data.vars.get(name) {
            return Some(value.clone());
        }
        data.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Whether a name resolves in this frame or any parent.
    pub fn is_bound(&self, name: &str) -> bool {
        let data = self.inner.borrow();
        data.vars.contains_key(name) || data.parent.as_ref().is_some_and(|p| p.is_bound(name))
    }

    /// Bind a name in this frame, shadowing any parent binding.
    pub fn declare(&self, name: impl Into<String>, value: Value) {
        self.inner.borrow_mut().vars.insert(name.into(), value);
    }

    /// Assign to an existing binding, walking parent frames.
    ///
    /// Returns `false` if the name is bound nowhere in the chain.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        let mut data = self.inner.borrow_mut();
        if let Some(slot) = data.vars.get_mut(name) {
            *slot = value;
            return true;
        }
        match &data.parent {
            Some(parent) => parent.assign(name, value),
            None => false,
        }
    }

    /// Remove a binding from this frame only.
    ///
    /// Returns `true` if the name was bound here.
    pub fn remove(&self, name: &str) -> bool {
        self.inner.borrow_mut().vars.remove(name).is_some()
    }

    /// Whether two handles alias the same frame.
    pub fn same_frame(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Env {
    fn default() -> Self {
        Env::new()
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.inner.borrow();
        f.debug_struct("Env")
            .field("bindings", &data.vars.len())
            .field("has_parent", &data.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_and_get() {
        let env = Env::new();
        env.declare("x", Value::Number(1.0));
        assert_eq!(env.get("x"), Some(Value::Number(1.0)));
        assert_eq!(env.get("y"), None);
    }

    #[test]
    fn test_child_shadowing() {
        let parent = Env::new();
        parent.declare("x", Value::Str("parent".to_string()));
        parent.declare("y", Value::Str("shared".to_string()));

        let child = parent.child();
        child.declare("x", Value::Str("child".to_string()));

        assert_eq!(child.get("x"), Some(Value::Str("child".to_string())));
        assert_eq!(child.get("y"), Some(Value::Str("shared".to_string())));
        assert_eq!(parent.get("x"), Some(Value::Str("parent".to_string())));
    }

    #[test]
    fn test_assign_walks_chain() {
        let parent = Env::new();
        parent.declare("x", Value::Number(1.0));
        let child = parent.child();

        assert!(child.assign("x", Value::Number(2.0)));
        assert_eq!(parent.get("x"), Some(Value::Number(2.0)));
        assert!(!child.assign("missing", Value::Null));
    }

    #[test]
    fn test_handles_alias() {
        let env = Env::new();
        let alias = env.clone();
        alias.declare("x", Value::Bool(true));
        assert_eq!(env.get("x"), Some(Value::Bool(true)));
        assert!(env.same_frame(&alias));
        assert!(!env.same_frame(&env.child()));
    }

    #[test]
    fn test_remove_is_frame_local() {
        let parent = Env::new();
        parent.declare("x", Value::Number(1.0));
        let child = parent.child();
        assert!(!child.remove("x"));
        assert!(parent.remove("x"));
        assert_eq!(parent.get("x"), None);
    }
}
