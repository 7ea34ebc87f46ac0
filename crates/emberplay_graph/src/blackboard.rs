// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blackboard variable declarations and per-instance stores.

use crate::port::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Declared variables of one graph asset.
///
/// Each variable has a name, and a default value that fixes its type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlackboardSpec {
    variables: IndexMap<String, Value>,
}

impl BlackboardSpec {
    /// Create an empty declaration set
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable with its default value, replacing any previous
    /// declaration of the same name
    pub fn declare(&mut self, name: impl Into<String>, default: Value) {
        self.variables.insert(name.into(), default);
    }

    /// Remove a declaration
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.variables.shift_remove(name)
    }

    /// Get a declared default
    pub fn default_of(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Iterate over declarations in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of declared variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Check if no variables are declared
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// A runtime copy of an asset's declared variables.
///
/// Each compiled graph instance gets its own copy, so concurrent instances
/// of the same asset never share mutable state.
#[derive(Debug, Clone)]
pub struct Blackboard {
    defaults: IndexMap<String, Value>,
    values: IndexMap<String, Value>,
}

impl Blackboard {
    /// Instantiate a blackboard from an asset's declarations
    pub fn from_spec(spec: &BlackboardSpec) -> Self {
        Self {
            defaults: spec.variables.clone(),
            values: spec.variables.clone(),
        }
    }

    /// Get the current value of a variable
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Set a variable.
    ///
    /// Returns `false` (and leaves the store untouched) for undeclared names
    /// and for values that would change the variable's declared type.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        let Some(slot) = self.values.get_mut(name) else {
            tracing::warn!(name, "blackboard variable is not declared");
            return false;
        };
        if slot.value_type() != value.value_type() {
            tracing::warn!(
                name,
                expected = ?slot.value_type(),
                got = ?value.value_type(),
                "blackboard variable type mismatch"
            );
            return false;
        }
        *slot = value;
        true
    }

    /// Restore every variable to its declared default
    pub fn reset(&mut self) {
        self.values = self.defaults.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> BlackboardSpec {
        let mut spec = BlackboardSpec::new();
        spec.declare("health", Value::Int(100));
        spec.declare("name", Value::String("player".into()));
        spec
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let spec = spec();
        let mut a = Blackboard::from_spec(&spec);
        let b = Blackboard::from_spec(&spec);
        assert!(a.set("health", Value::Int(50)));
        assert_eq!(a.get("health"), Some(&Value::Int(50)));
        assert_eq!(b.get("health"), Some(&Value::Int(100)));
    }

    #[test]
    fn test_set_rejects_type_change_and_unknown_names() {
        let mut bb = Blackboard::from_spec(&spec());
        assert!(!bb.set("health", Value::String("full".into())));
        assert!(!bb.set("missing", Value::Int(1)));
        assert_eq!(bb.get("health"), Some(&Value::Int(100)));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut bb = Blackboard::from_spec(&spec());
        bb.set("health", Value::Int(1));
        bb.reset();
        assert_eq!(bb.get("health"), Some(&Value::Int(100)));
    }
}
