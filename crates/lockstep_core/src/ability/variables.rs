//! Named lockstep-tracked values published by abilities.

use serde::{Deserialize, Serialize};

/// One tracked value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedVariable {
    /// Variable name.
    pub name: String,
    /// Value restored by [`VariableContainer::reset`].
    pub default: i64,
    /// Current value.
    pub value: i64,
}

/// Per-ability bag of named integer values.
///
/// Abilities register their variables once at setup and publish current
/// values after every simulate. The container is reset on each activation
/// and folded into the detailed state hash, so a divergence can be traced
/// to the ability and variable that caused it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableContainer {
    variables: Vec<TrackedVariable>,
}

impl VariableContainer {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable. Registering an existing name updates its default.
    pub fn register(&mut self, name: &str, default: i64) {
        if let Some(variable) = self.find_mut(name) {
            variable.default = default;
            variable.value = default;
            return;
        }
        self.variables.push(TrackedVariable {
            name: name.to_string(),
            default,
            value: default,
        });
    }

    /// Set a registered variable. Returns `false` for unknown names.
    pub fn set(&mut self, name: &str, value: i64) -> bool {
        match self.find_mut(name) {
            Some(variable) => {
                variable.value = value;
                true
            }
            None => false,
        }
    }

    /// Current value of a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value)
    }

    /// Restore every variable to its default.
    pub fn reset(&mut self) {
        for variable in &mut self.variables {
            variable.value = variable.default;
        }
    }

    /// Variables in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedVariable> {
        self.variables.iter()
    }

    /// Number of registered variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Order-sensitive fingerprint of the current values.
    #[must_use]
    pub fn state_hash(&self) -> i64 {
        self.variables.iter().fold(17_i64, |hash, variable| {
            hash.wrapping_mul(31).wrapping_add(variable.value)
        })
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut TrackedVariable> {
        self.variables.iter_mut().find(|v| v.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_set_reset() {
        let mut vars = VariableContainer::new();
        vars.register("Charge", 0);
        vars.register("Queue", 3);

        assert!(vars.set("Charge", 42));
        assert!(!vars.set("Missing", 1));
        assert_eq!(vars.get("Charge"), Some(42));

        vars.reset();
        assert_eq!(vars.get("Charge"), Some(0));
        assert_eq!(vars.get("Queue"), Some(3));
    }

    #[test]
    fn test_hash_is_order_sensitive() {
        let mut a = VariableContainer::new();
        a.register("x", 1);
        a.register("y", 2);

        let mut b = VariableContainer::new();
        b.register("x", 2);
        b.register("y", 1);

        assert_ne!(a.state_hash(), b.state_hash());
        assert_eq!(a.state_hash(), a.clone().state_hash());
    }
}
