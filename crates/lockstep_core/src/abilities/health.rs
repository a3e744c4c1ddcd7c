//! Hit points.

use crate::ability::{
    AbilityBehavior, AbilityCore, AgentParts, DetailWriter, InitContext, PendingChanges,
    SaveValue, VariableContainer,
};
use crate::agent::AgentHandle;
use crate::data::HealthConfig;
use crate::math::Fixed;

/// Tracks hit points and requests destruction of its agent when depleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthAbility {
    max_health: Fixed,
    health: Fixed,
    depleted: bool,
}

impl HealthAbility {
    /// Create from template tunables.
    #[must_use]
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            max_health: config.max_health,
            health: config.max_health,
            depleted: false,
        }
    }

    /// Current hit points.
    #[must_use]
    pub const fn health(&self) -> Fixed {
        self.health
    }

    /// Hit points after activation.
    #[must_use]
    pub const fn max_health(&self) -> Fixed {
        self.max_health
    }

    /// Whether hit points reached zero.
    #[must_use]
    pub const fn is_depleted(&self) -> bool {
        self.depleted
    }

    /// Subtract `amount`. The first hit that depletes the pool queues a
    /// buffered destroy of `owner` and returns `true`.
    pub fn apply_damage(
        &mut self,
        amount: Fixed,
        owner: AgentHandle,
        pending: &mut PendingChanges,
    ) -> bool {
        if self.depleted {
            return false;
        }
        self.health = (self.health - amount).max(Fixed::ZERO);
        if self.health == Fixed::ZERO {
            self.depleted = true;
            pending.destroy(owner, false);
            return true;
        }
        false
    }
}

impl AbilityBehavior for HealthAbility {
    fn on_initialize(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        _ctx: &mut InitContext<'_>,
    ) {
        self.health = self.max_health;
        self.depleted = false;
    }

    fn save_details(&self, _core: &AbilityCore, writer: &mut DetailWriter) {
        writer.write_fixed("Health", self.health);
        writer.write_bool("Depleted", self.depleted);
    }

    fn load_property(&mut self, _core: &mut AbilityCore, name: &str, value: &SaveValue) -> bool {
        match name {
            "Health" => value.as_fixed().map(|v| self.health = v).is_some(),
            "Depleted" => value.as_bool().map(|v| self.depleted = v).is_some(),
            _ => false,
        }
    }

    fn register_variables(&self, variables: &mut VariableContainer) {
        variables.register("Health", self.max_health.to_bits());
    }

    fn publish_variables(&self, variables: &mut VariableContainer) {
        variables.set("Health", self.health.to_bits());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::fixed;

    fn handle() -> AgentHandle {
        AgentHandle {
            global_id: 3,
            spawn_version: 1,
        }
    }

    #[test]
    fn test_depletion_queues_one_destroy() {
        let mut health = HealthAbility::new(&HealthConfig {
            max_health: fixed(15),
        });
        let mut pending = PendingChanges::default();

        assert!(!health.apply_damage(fixed(10), handle(), &mut pending));
        assert!(pending.is_empty());

        assert!(health.apply_damage(fixed(10), handle(), &mut pending));
        assert_eq!(health.health(), Fixed::ZERO);
        assert!(!health.apply_damage(fixed(10), handle(), &mut pending));

        assert_eq!(pending.destroys().len(), 1);
        assert_eq!(pending.destroys()[0].handle, handle());
        assert!(!pending.destroys()[0].immediate);
    }
}
