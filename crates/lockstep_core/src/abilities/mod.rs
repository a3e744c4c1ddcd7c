//! Concrete abilities.
//!
//! Each type here implements [`AbilityBehavior`](crate::ability::AbilityBehavior)
//! and is one variant of [`AbilityVariant`](crate::ability::AbilityVariant).
//! Cross-ability calls go through sibling indices cached at setup.

mod attack;
mod construct;
mod health;
mod movement;
mod spawner;
mod structure;
mod turn;

pub use attack::AttackAbility;
pub use construct::{ConstructAbility, REPATH_DISTANCE, REPATH_INTERVAL, SEARCH_RATE};
pub use health::HealthAbility;
pub use movement::MoveAbility;
pub use spawner::{FlagState, SpawnerAbility};
pub use structure::StructureAbility;
pub use turn::TurnAbility;

use crate::ability::Siblings;
use crate::math::{Fixed, Vec2Fixed};

/// Whether `forward` points at `offset` within `attack_angle`.
///
/// Facing means the normalized offset is in front (positive dot) and its
/// sideways component (|cross|) does not exceed the angle. A zero offset
/// never counts as facing.
#[must_use]
pub fn is_facing(forward: Vec2Fixed, offset: Vec2Fixed, attack_angle: Fixed) -> bool {
    let direction = offset.normalize();
    direction != Vec2Fixed::ZERO
        && forward.dot(direction) > Fixed::ZERO
        && forward.cross(direction).abs() <= attack_angle
}

fn sibling_move<'s>(
    siblings: &'s mut Siblings<'_>,
    index: Option<usize>,
) -> Option<&'s mut MoveAbility> {
    siblings.get_mut(index?)?.as_move_mut()
}

fn sibling_turn<'s>(
    siblings: &'s mut Siblings<'_>,
    index: Option<usize>,
) -> Option<&'s mut TurnAbility> {
    siblings.get_mut(index?)?.as_turn_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::fixed_ratio;

    #[test]
    fn test_facing() {
        let angle = fixed_ratio(1, 4);
        assert!(is_facing(Vec2Fixed::RIGHT, Vec2Fixed::from_int(5, 0), angle));
        assert!(is_facing(Vec2Fixed::RIGHT, Vec2Fixed::from_int(5, 1), angle));
        assert!(!is_facing(Vec2Fixed::RIGHT, Vec2Fixed::from_int(1, 5), angle));
        assert!(!is_facing(Vec2Fixed::RIGHT, Vec2Fixed::from_int(-5, 0), angle));
        assert!(!is_facing(Vec2Fixed::RIGHT, Vec2Fixed::ZERO, angle));
    }
}
