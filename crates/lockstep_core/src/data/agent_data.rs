//! Agent template definitions.

use serde::{Deserialize, Serialize};

use super::ability_data::{AbilityConfig, AbilityKind};
use crate::math::{fixed_serde, Fixed};

/// Role classifier for agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgentTag {
    /// No special role.
    #[default]
    None,
    /// Constructs buildings.
    Builder,
    /// Produces other agents.
    Producer,
    /// Fighting unit.
    Soldier,
}

impl AgentTag {
    /// Name used in save records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Builder => "Builder",
            Self::Producer => "Producer",
            Self::Soldier => "Soldier",
        }
    }

    /// Parse a saved tag name. Unknown names fall back to [`AgentTag::None`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "Builder" => Self::Builder,
            "Producer" => Self::Producer,
            "Soldier" => Self::Soldier,
            _ => Self::None,
        }
    }
}

/// Spawnable agent template, keyed by its agent code.
///
/// # Example RON
///
/// ```ron
/// AgentTemplate(
///     code: "worker",
///     tag: Builder,
///     radius: 2147483648, // Fixed-point for 0.5
///     priority: 1,
///     abilities: [
///         Move(MoveConfig(speed: 17179869184)),
///         Construct(ConstructConfig()),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTemplate {
    /// Unique agent code.
    pub code: String,

    /// Initial role tag.
    #[serde(default)]
    pub tag: AgentTag,

    /// Body radius used for range checks.
    #[serde(with = "fixed_serde", default = "default_radius")]
    pub radius: Fixed,

    /// Base collision/push priority.
    #[serde(default)]
    pub priority: i32,

    /// Height of the body above the ground plane.
    #[serde(with = "fixed_serde", default)]
    pub height: Fixed,

    /// Abilities in declared (simulation) order.
    #[serde(default)]
    pub abilities: Vec<AbilityConfig>,
}

fn default_radius() -> Fixed {
    Fixed::ONE / 2
}

impl AgentTemplate {
    /// Create a template with no abilities.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            tag: AgentTag::None,
            radius: default_radius(),
            priority: 0,
            height: Fixed::ZERO,
            abilities: Vec::new(),
        }
    }

    /// Set the tag.
    #[must_use]
    pub fn with_tag(mut self, tag: AgentTag) -> Self {
        self.tag = tag;
        self
    }

    /// Set the body radius.
    #[must_use]
    pub fn with_radius(mut self, radius: Fixed) -> Self {
        self.radius = radius;
        self
    }

    /// Set the base priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Append an ability.
    #[must_use]
    pub fn with_ability(mut self, ability: impl Into<AbilityConfig>) -> Self {
        self.abilities.push(ability.into());
        self
    }

    /// Check whether the template carries an ability of this kind.
    #[must_use]
    pub fn has_ability(&self, kind: AbilityKind) -> bool {
        self.abilities.iter().any(|a| a.kind() == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ability_data::{HealthConfig, MoveConfig};

    #[test]
    fn test_builder_methods() {
        let template = AgentTemplate::new("scout")
            .with_tag(AgentTag::Soldier)
            .with_priority(2)
            .with_ability(MoveConfig::default())
            .with_ability(HealthConfig::default());

        assert_eq!(template.code, "scout");
        assert_eq!(template.priority, 2);
        assert!(template.has_ability(AbilityKind::Move));
        assert!(template.has_ability(AbilityKind::Health));
        assert!(!template.has_ability(AbilityKind::Spawner));
    }

    #[test]
    fn test_tag_names_round_trip() {
        for tag in [
            AgentTag::None,
            AgentTag::Builder,
            AgentTag::Producer,
            AgentTag::Soldier,
        ] {
            assert_eq!(AgentTag::from_name(tag.as_str()), tag);
        }
        assert_eq!(AgentTag::from_name("Wizard"), AgentTag::None);
    }

    #[test]
    fn test_ron_defaults() {
        let template: AgentTemplate = ron::from_str(r#"(code: "rock")"#).unwrap();
        assert_eq!(template.tag, AgentTag::None);
        assert_eq!(template.radius, Fixed::ONE / 2);
        assert!(template.abilities.is_empty());
    }
}
