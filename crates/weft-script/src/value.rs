/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Runtime value representation.
//!
//! Values are dynamically typed. Lists and maps have reference
//! semantics (shared, interior-mutable), scalars are copied. Functions
//! are closures over the environment they were created in; builtins are
//! named handles dispatched to the host at call time.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Stmt;
use crate::env::Env;

/// Shared list storage.
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// Shared map storage. A `BTreeMap` keeps iteration (and therefore
/// JSON output) deterministic.
pub type MapRef = Rc<RefCell<BTreeMap<String, Value>>>;

/// A script function value: parameter list, body, captured environment.
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<Vec<Stmt>>,
    pub env: Env,
}

/// A value produced or consumed by directive code.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(ListRef),
    Map(MapRef),
    Function(Rc<Function>),
    /// A host-provided builtin, dispatched by name at call time.
    Builtin(&'static str),
}

impl Value {
    /// Construct a function value.
    pub fn function(
        name: Option<String>,
        params: Vec<String>,
        body: Rc<Vec<Stmt>>,
        env: Env,
    ) -> Value {
        Value::Function(Rc::new(Function {
            name,
            params,
            body,
            env,
        }))
    }

    /// Construct a list value from owned elements.
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Construct a map value from owned entries.
    pub fn map(entries: BTreeMap<String, Value>) -> Value {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    /// The type name reported by `typeof`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Function(_) | Value::Builtin(_) => "function",
        }
    }

    /// Truthiness for conditionals: `null`, `false`, `0`, `NaN` and the
    /// empty string are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) | Value::Function(_) | Value::Builtin(_) => true,
        }
    }

    /// The text form used by `write` and string concatenation.
    ///
    /// Lists render as their comma-joined elements; maps and functions
    /// have opaque placeholder forms (use the JSON echo directive for a
    /// faithful map rendering).
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => "false".to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::List(items) => items
                .borrow()
                .iter()
                .map(|v| v.to_text())
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(_) => "[object]".to_string(),
            Value::Function(_) | Value::Builtin(_) => "[function]".to_string(),
        }
    }

    /// Strict equality: scalars by value, lists/maps/functions by
    /// identity, values of different types never equal.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }

    /// Convert to a JSON value. Functions are not serializable.
    pub fn to_json(&self) -> Result<serde_json::Value, String> {
        match self {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.007_199_254_740_992e15 {
                    Ok(serde_json::Value::from(*n as i64))
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .ok_or_else(|| format!("number {n} is not JSON-representable"))
                }
            }
            Value::Str(s) => Ok(serde_json::Value::String(s.clone())),
            Value::List(items) => {
                let mut out = Vec::new();
                for item in items.borrow().iter() {
                    out.push(item.to_json()?);
                }
                Ok(serde_json::Value::Array(out))
            }
            Value::Map(entries) => {
                let mut out = serde_json::Map::new();
                for (key, value) in entries.borrow().iter() {
                    out.insert(key.clone(), value.to_json()?);
                }
                Ok(serde_json::Value::Object(out))
            }
            Value::Function(_) | Value::Builtin(_) => {
                Err("function values are not JSON-serializable".to_string())
            }
        }
    }

    /// Build a value from a JSON value.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.equals(other)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

// Closures capture their environment, which may in turn contain the
// closure; Debug stays shallow to avoid walking that cycle.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => write!(f, "List(len={})", items.borrow().len()),
            Value::Map(entries) => write!(f, "Map(len={})", entries.borrow().len()),
            Value::Function(fun) => {
                write!(f, "Function({})", fun.name.as_deref().unwrap_or("<anon>"))
            }
            Value::Builtin(name) => write!(f, "Builtin({name})"),
        }
    }
}

/// Format a number without a fractional part when it is integral.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.007_199_254_740_992e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(Value::Number(-1.5).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Str("false".to_string()).is_truthy());
        assert!(Value::list(vec![]).is_truthy());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(1e300), "1e300");
    }

    #[test]
    fn test_text_form() {
        assert_eq!(Value::Null.to_text(), "null");
        assert_eq!(Value::Bool(true).to_text(), "true");
        assert_eq!(Value::Str("x".to_string()).to_text(), "x");
        let list = Value::list(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(list.to_text(), "1,2");
    }

    #[test]
    fn test_equality_semantics() {
        assert_eq!(Value::Number(2.0), Value::Number(2.0));
        assert_ne!(Value::Number(2.0), Value::Str("2".to_string()));
        let a = Value::list(vec![Value::Number(1.0)]);
        let b = Value::list(vec![Value::Number(1.0)]);
        assert_eq!(a, a.clone()); // identity
        assert_ne!(a, b); // structurally equal but distinct
    }

    #[test]
    fn test_json_round_trip() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"name":"weft","tags":["a","b"],"count":3}"#).unwrap();
        let value = Value::from_json(&json);
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn test_function_not_serializable() {
        let f = Value::Builtin("write");
        assert!(f.to_json().is_err());
    }
}
