//! Ability descriptors and per-kind tunables.
//!
//! Ability kinds form a closed set. Active kinds listen for commands and must
//! be registered in the [`DataRegistry`](super::DataRegistry) with an
//! [`AbilityData`] descriptor. Passive kinds only react to other abilities.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed};

/// Closed set of ability kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AbilityKind {
    /// Moves the body towards a destination.
    Move,
    /// Rotates the body towards a direction.
    Turn,
    /// Engages target agents.
    Attack,
    /// Builds structures.
    Construct,
    /// Produces new agents from a build queue.
    Spawner,
    /// Something that can be built.
    Structure,
    /// Hit points.
    Health,
}

impl AbilityKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Move,
        Self::Turn,
        Self::Attack,
        Self::Construct,
        Self::Spawner,
        Self::Structure,
        Self::Health,
    ];

    /// Type name of the ability.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Move => "Move",
            Self::Turn => "Turn",
            Self::Attack => "Attack",
            Self::Construct => "Construct",
            Self::Spawner => "Spawner",
            Self::Structure => "Structure",
            Self::Health => "Health",
        }
    }

    /// Whether this kind listens for commands and needs a data descriptor.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Structure | Self::Health)
    }
}

/// Static data descriptor for an active ability kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityData {
    /// Kind this descriptor belongs to.
    pub kind: AbilityKind,
    /// Ability code used in save records and commands.
    pub code: String,
    /// Input identifier this ability listens on.
    pub listen_input: u16,
    /// Localization key for the description.
    #[serde(default)]
    pub description: String,
}

impl AbilityData {
    /// Create a descriptor.
    #[must_use]
    pub fn new(kind: AbilityKind, code: impl Into<String>, listen_input: u16) -> Self {
        Self {
            kind,
            code: code.into(),
            listen_input,
            description: String::new(),
        }
    }
}

fn one() -> Fixed {
    Fixed::ONE
}

/// Tunables for [`AbilityKind::Move`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveConfig {
    /// Distance per second.
    #[serde(with = "fixed_serde", default = "default_speed")]
    pub speed: Fixed,
}

fn default_speed() -> Fixed {
    Fixed::from_num(4)
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
        }
    }
}

/// Tunables for [`AbilityKind::Turn`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Sideways turn step per second (roughly the sine of the angular speed).
    #[serde(with = "fixed_serde", default = "default_turn_rate")]
    pub turn_rate: Fixed,
}

fn default_turn_rate() -> Fixed {
    Fixed::from_num(8)
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            turn_rate: default_turn_rate(),
        }
    }
}

/// Tunables for [`AbilityKind::Attack`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackConfig {
    /// Reach beyond both body radii.
    #[serde(with = "fixed_serde", default = "one")]
    pub range: Fixed,
    /// Maximum |cross| between facing and target direction to count as facing.
    #[serde(with = "fixed_serde", default = "default_attack_angle")]
    pub attack_angle: Fixed,
    /// Whether facing is required before firing.
    #[serde(default = "default_true")]
    pub track_attack_angle: bool,
    /// Damage per shot.
    #[serde(with = "fixed_serde", default = "default_damage")]
    pub damage: Fixed,
    /// Seconds between shots.
    #[serde(with = "fixed_serde", default = "one")]
    pub interval: Fixed,
    /// Seconds between committing to a shot and the shot landing.
    #[serde(with = "fixed_serde", default)]
    pub windup: Fixed,
}

fn default_attack_angle() -> Fixed {
    Fixed::ONE / 4
}

fn default_damage() -> Fixed {
    Fixed::from_num(10)
}

const fn default_true() -> bool {
    true
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            range: one(),
            attack_angle: default_attack_angle(),
            track_attack_angle: true,
            damage: default_damage(),
            interval: one(),
            windup: Fixed::ZERO,
        }
    }
}

/// Tunables for [`AbilityKind::Construct`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructConfig {
    /// Construction progress applied per completed windup.
    #[serde(with = "fixed_serde", default = "one")]
    pub construct_amount: Fixed,
    /// Seconds of charge needed per construction step.
    #[serde(with = "fixed_serde", default = "one")]
    pub construct_interval: Fixed,
    /// Seconds between committing to a step and the step landing.
    #[serde(with = "fixed_serde", default)]
    pub windup: Fixed,
    /// Raise body priority by one while building.
    #[serde(default = "default_true")]
    pub increase_priority: bool,
    /// Agent codes this builder may place.
    #[serde(default)]
    pub build_actions: Vec<String>,
}

impl Default for ConstructConfig {
    fn default() -> Self {
        Self {
            construct_amount: one(),
            construct_interval: one(),
            windup: Fixed::ZERO,
            increase_priority: true,
            build_actions: Vec::new(),
        }
    }
}

/// Tunables for [`AbilityKind::Spawner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnerConfig {
    /// Spawn progress added per completed windup.
    #[serde(with = "fixed_serde", default = "one")]
    pub spawn_increment: Fixed,
    /// Progress that must be exceeded to emit one agent.
    #[serde(with = "fixed_serde", default = "one")]
    pub max_spawn_progress: Fixed,
    /// Seconds of charge needed per production step.
    #[serde(with = "fixed_serde", default = "one")]
    pub spawn_interval: Fixed,
    /// Seconds between committing to a step and the step landing.
    #[serde(with = "fixed_serde", default)]
    pub windup: Fixed,
    /// Distance in front of the body where new agents appear.
    #[serde(with = "fixed_serde", default = "one")]
    pub spawn_offset: Fixed,
    /// Agent codes this producer may queue.
    #[serde(default)]
    pub spawn_actions: Vec<String>,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            spawn_increment: one(),
            max_spawn_progress: one(),
            spawn_interval: one(),
            windup: Fixed::ZERO,
            spawn_offset: one(),
            spawn_actions: Vec::new(),
        }
    }
}

/// Tunables for [`AbilityKind::Structure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureConfig {
    /// Construction amount needed to finish.
    #[serde(with = "fixed_serde", default = "default_build_required")]
    pub build_required: Fixed,
    /// Skip construction entirely.
    #[serde(default)]
    pub starts_constructed: bool,
}

fn default_build_required() -> Fixed {
    Fixed::from_num(10)
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            build_required: default_build_required(),
            starts_constructed: false,
        }
    }
}

/// Tunables for [`AbilityKind::Health`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Hit points on activation.
    #[serde(with = "fixed_serde", default = "default_max_health")]
    pub max_health: Fixed,
}

fn default_max_health() -> Fixed {
    Fixed::from_num(100)
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_health: default_max_health(),
        }
    }
}

/// Per-template ability entry with its tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbilityConfig {
    /// See [`MoveConfig`].
    Move(MoveConfig),
    /// See [`TurnConfig`].
    Turn(TurnConfig),
    /// See [`AttackConfig`].
    Attack(AttackConfig),
    /// See [`ConstructConfig`].
    Construct(ConstructConfig),
    /// See [`SpawnerConfig`].
    Spawner(SpawnerConfig),
    /// See [`StructureConfig`].
    Structure(StructureConfig),
    /// See [`HealthConfig`].
    Health(HealthConfig),
}

impl AbilityConfig {
    /// Kind of ability this entry creates.
    #[must_use]
    pub const fn kind(&self) -> AbilityKind {
        match self {
            Self::Move(_) => AbilityKind::Move,
            Self::Turn(_) => AbilityKind::Turn,
            Self::Attack(_) => AbilityKind::Attack,
            Self::Construct(_) => AbilityKind::Construct,
            Self::Spawner(_) => AbilityKind::Spawner,
            Self::Structure(_) => AbilityKind::Structure,
            Self::Health(_) => AbilityKind::Health,
        }
    }
}

macro_rules! impl_from_config {
    ($($config:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$config> for AbilityConfig {
                fn from(config: $config) -> Self {
                    Self::$variant(config)
                }
            }
        )*
    };
}

impl_from_config! {
    MoveConfig => Move,
    TurnConfig => Turn,
    AttackConfig => Attack,
    ConstructConfig => Construct,
    SpawnerConfig => Spawner,
    StructureConfig => Structure,
    HealthConfig => Health,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_kinds() {
        let active: Vec<_> = AbilityKind::ALL
            .iter()
            .copied()
            .filter(|k| k.is_active())
            .collect();
        assert_eq!(
            active,
            vec![
                AbilityKind::Move,
                AbilityKind::Turn,
                AbilityKind::Attack,
                AbilityKind::Construct,
                AbilityKind::Spawner,
            ]
        );
    }

    #[test]
    fn test_config_kind() {
        let config: AbilityConfig = SpawnerConfig::default().into();
        assert_eq!(config.kind(), AbilityKind::Spawner);
    }

    #[test]
    fn test_spawner_config_from_ron() {
        let config: SpawnerConfig =
            ron::from_str(r#"(spawn_actions: ["worker"], windup: 2147483648)"#).unwrap();
        assert_eq!(config.spawn_actions, vec!["worker".to_string()]);
        assert_eq!(config.windup, Fixed::ONE / 2);
        assert_eq!(config.spawn_interval, Fixed::ONE);
    }
}
