//! Bounded per-tick rotation of the body's facing.

use crate::ability::{
    AbilityBehavior, AbilityCore, AgentParts, DetailWriter, InitContext, SaveValue, SimContext,
};
use crate::data::TurnConfig;
use crate::math::{Fixed, Vec2Fixed};

/// Turns the body towards a requested direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnAbility {
    turn_rate: Fixed,
    target_direction: Vec2Fixed,
    is_turning: bool,
}

impl TurnAbility {
    /// Create from template tunables.
    #[must_use]
    pub fn new(config: &TurnConfig) -> Self {
        Self {
            turn_rate: config.turn_rate,
            target_direction: Vec2Fixed::RIGHT,
            is_turning: false,
        }
    }

    /// Whether a turn is in progress.
    #[must_use]
    pub const fn is_turning(&self) -> bool {
        self.is_turning
    }

    /// Direction being turned towards.
    #[must_use]
    pub const fn target_direction(&self) -> Vec2Fixed {
        self.target_direction
    }

    /// Start turning towards `direction`. A zero direction is ignored.
    pub fn start_turn_direction(&mut self, direction: Vec2Fixed) {
        let direction = direction.normalize();
        if direction == Vec2Fixed::ZERO {
            return;
        }
        self.target_direction = direction;
        self.is_turning = true;
    }

    /// Abort the turn.
    pub fn stop_turn(&mut self) {
        self.is_turning = false;
    }
}

impl AbilityBehavior for TurnAbility {
    fn on_initialize(
        &mut self,
        _core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        _ctx: &mut InitContext<'_>,
    ) {
        self.target_direction = parts.body.rotation;
        self.is_turning = false;
    }

    fn on_simulate(
        &mut self,
        _core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        ctx: &mut SimContext<'_>,
    ) {
        if !self.is_turning {
            return;
        }
        let step = self.turn_rate * ctx.delta;
        parts.body.rotation = parts.body.rotation.rotate_towards(self.target_direction, step);
        if parts.body.rotation == self.target_direction {
            self.is_turning = false;
        }
    }

    fn on_deactivate(&mut self, _core: &mut AbilityCore, _parts: &mut AgentParts<'_>) {
        self.is_turning = false;
    }

    fn save_details(&self, _core: &AbilityCore, writer: &mut DetailWriter) {
        writer.write_vec2("TargetDirection", self.target_direction);
        writer.write_bool("IsTurning", self.is_turning);
    }

    fn load_property(&mut self, _core: &mut AbilityCore, name: &str, value: &SaveValue) -> bool {
        match name {
            "TargetDirection" => value.as_vec2().map(|v| self.target_direction = v).is_some(),
            "IsTurning" => value.as_bool().map(|v| self.is_turning = v).is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_direction_ignored() {
        let mut turn = TurnAbility::new(&TurnConfig::default());
        turn.start_turn_direction(Vec2Fixed::ZERO);
        assert!(!turn.is_turning());
    }

    #[test]
    fn test_direction_is_normalized() {
        let mut turn = TurnAbility::new(&TurnConfig::default());
        turn.start_turn_direction(Vec2Fixed::from_int(0, 5));
        assert!(turn.is_turning());
        assert_eq!(turn.target_direction(), Vec2Fixed::UP);
    }
}
