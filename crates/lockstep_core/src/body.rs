//! Fixed-point physical body of an agent.

use serde::{Deserialize, Serialize};

use crate::data::AgentTemplate;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Position, facing and push priority of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    /// Ground-plane position.
    pub position: Vec2Fixed,
    /// Forward unit vector.
    pub rotation: Vec2Fixed,
    /// Radius used for range checks.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Current push priority.
    pub priority: i32,
    /// Priority restored on activation.
    pub base_priority: i32,
    /// Height above the ground plane.
    #[serde(with = "fixed_serde")]
    pub height: Fixed,
    /// Set when the position changed during the current tick.
    pub position_changed: bool,
    /// Value of `position_changed` at the end of the previous tick.
    ///
    /// Other agents read this one: it does not depend on sweep order.
    pub position_changed_buffer: bool,
}

impl Body {
    /// Body shaped by a template, at the origin facing +X.
    #[must_use]
    pub fn from_template(template: &AgentTemplate) -> Self {
        Self {
            position: Vec2Fixed::ZERO,
            rotation: Vec2Fixed::RIGHT,
            radius: template.radius,
            priority: template.priority,
            base_priority: template.priority,
            height: template.height,
            position_changed: false,
            position_changed_buffer: false,
        }
    }

    /// Place the body for a new activation.
    ///
    /// A zero `rotation` falls back to facing +X.
    pub fn reset(&mut self, position: Vec2Fixed, rotation: Vec2Fixed) {
        let facing = rotation.normalize();
        self.position = position;
        self.rotation = if facing == Vec2Fixed::ZERO {
            Vec2Fixed::RIGHT
        } else {
            facing
        };
        self.priority = self.base_priority;
        self.position_changed = false;
        self.position_changed_buffer = false;
    }

    /// Move to `position`, flagging the change.
    pub fn set_position(&mut self, position: Vec2Fixed) {
        if position != self.position {
            self.position = position;
            self.position_changed = true;
        }
    }

    /// Forward unit vector.
    #[must_use]
    pub const fn forward(&self) -> Vec2Fixed {
        self.rotation
    }

    /// Roll the per-tick change flag into the buffer.
    pub fn late_simulate(&mut self) {
        self.position_changed_buffer = self.position_changed;
        self.position_changed = false;
    }

    /// Position and rotation fingerprint.
    #[must_use]
    pub fn state_hash(&self) -> i64 {
        self.position
            .state_hash()
            .wrapping_add(self.rotation.state_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::fixed;

    fn body() -> Body {
        Body::from_template(&AgentTemplate::new("crate").with_priority(2))
    }

    #[test]
    fn test_reset_restores_priority_and_facing() {
        let mut body = body();
        body.priority = 9;
        body.reset(Vec2Fixed::from_int(4, 4), Vec2Fixed::ZERO);
        assert_eq!(body.priority, 2);
        assert_eq!(body.rotation, Vec2Fixed::RIGHT);
        assert_eq!(body.position, Vec2Fixed::from_int(4, 4));
    }

    #[test]
    fn test_reset_normalizes_rotation() {
        let mut body = body();
        body.reset(Vec2Fixed::ZERO, Vec2Fixed::from_int(0, 7));
        assert!((body.rotation.y - fixed(1)).abs() < Fixed::from_bits(1 << 12));
    }

    #[test]
    fn test_position_change_buffer() {
        let mut body = body();
        body.set_position(Vec2Fixed::from_int(1, 0));
        assert!(body.position_changed);
        assert!(!body.position_changed_buffer);

        body.late_simulate();
        assert!(!body.position_changed);
        assert!(body.position_changed_buffer);

        body.set_position(Vec2Fixed::from_int(1, 0));
        body.late_simulate();
        assert!(!body.position_changed_buffer);
    }

    #[test]
    fn test_state_hash_tracks_rotation() {
        let a = body();
        let mut b = body();
        b.rotation = Vec2Fixed::UP;
        assert_ne!(a.state_hash(), b.state_hash());
    }
}
