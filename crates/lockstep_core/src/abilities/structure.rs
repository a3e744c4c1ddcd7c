//! Construction target.

use crate::ability::{
    AbilityBehavior, AbilityCore, AgentParts, DetailWriter, InitContext, SaveValue,
    VariableContainer,
};
use crate::data::StructureConfig;
use crate::math::Fixed;

/// Build progress of a structure. Builders raise it through
/// [`construct`](Self::construct).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureAbility {
    build_required: Fixed,
    starts_constructed: bool,
    progress: Fixed,
}

impl StructureAbility {
    /// Create from template tunables.
    #[must_use]
    pub fn new(config: &StructureConfig) -> Self {
        let mut structure = Self {
            build_required: config.build_required,
            starts_constructed: config.starts_constructed,
            progress: Fixed::ZERO,
        };
        structure.reset_progress();
        structure
    }

    fn reset_progress(&mut self) {
        self.progress = if self.starts_constructed {
            self.build_required
        } else {
            Fixed::ZERO
        };
    }

    /// Whether more work is needed.
    #[must_use]
    pub fn under_construction(&self) -> bool {
        self.progress < self.build_required
    }

    /// Add work, clamped to the required amount. Returns `true` when this
    /// call completed the structure.
    pub fn construct(&mut self, amount: Fixed) -> bool {
        if !self.under_construction() {
            return false;
        }
        self.progress = (self.progress + amount).min(self.build_required);
        !self.under_construction()
    }

    /// Work done so far.
    #[must_use]
    pub const fn progress(&self) -> Fixed {
        self.progress
    }

    /// Work needed to complete.
    #[must_use]
    pub const fn build_required(&self) -> Fixed {
        self.build_required
    }
}

impl AbilityBehavior for StructureAbility {
    fn on_initialize(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        _ctx: &mut InitContext<'_>,
    ) {
        self.reset_progress();
    }

    fn save_details(&self, _core: &AbilityCore, writer: &mut DetailWriter) {
        writer.write_fixed("Progress", self.progress);
    }

    fn load_property(&mut self, _core: &mut AbilityCore, name: &str, value: &SaveValue) -> bool {
        match name {
            "Progress" => value.as_fixed().map(|v| self.progress = v).is_some(),
            _ => false,
        }
    }

    fn register_variables(&self, variables: &mut VariableContainer) {
        variables.register("Progress", 0);
    }

    fn publish_variables(&self, variables: &mut VariableContainer) {
        variables.set("Progress", self.progress.to_bits());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::fixed;

    #[test]
    fn test_construct_clamps_and_completes() {
        let mut structure = StructureAbility::new(&StructureConfig {
            build_required: fixed(3),
            starts_constructed: false,
        });
        assert!(structure.under_construction());
        assert!(!structure.construct(fixed(2)));
        assert!(structure.construct(fixed(2)));
        assert_eq!(structure.progress(), fixed(3));
        assert!(!structure.construct(fixed(1)));
    }

    #[test]
    fn test_prebuilt() {
        let structure = StructureAbility::new(&StructureConfig {
            build_required: fixed(5),
            starts_constructed: true,
        });
        assert!(!structure.under_construction());
    }
}
