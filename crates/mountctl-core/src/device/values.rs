//! Published values
//!
//! The driver publishes its state as named, typed values. Each entry keeps a
//! changed flag so an owner can forward only what moved since it last looked.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed published value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Numeric value (angles in degrees, LST in hours)
    Scalar(f64),
    Bool(bool),
    String(String),
}

impl Value {
    /// Get as scalar, returning None if not a scalar
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as bool, returning None if not a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    changed: bool,
}

/// Named value table shared between a driver and its owner
#[derive(Debug, Clone, Default)]
pub struct ValueTable {
    entries: BTreeMap<String, Entry>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value. The changed flag is raised only when it differs from
    /// what was stored before.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.entries.get_mut(name) {
            Some(entry) if entry.value == value => {}
            Some(entry) => {
                entry.value = value;
                entry.changed = true;
            }
            None => {
                self.entries.insert(
                    name.to_string(),
                    Entry {
                        value,
                        changed: true,
                    },
                );
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|e| &e.value)
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_scalar)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn is_changed(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.changed)
    }

    /// Names and values that changed since the last call, clearing the flags
    pub fn take_changed(&mut self) -> Vec<(String, Value)> {
        self.entries
            .iter_mut()
            .filter(|(_, e)| e.changed)
            .map(|(name, e)| {
                e.changed = false;
                (name.clone(), e.value.clone())
            })
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
