//! Data structures for agent and ability configuration.
//!
//! This module contains pure data structures that define agent templates
//! and ability descriptors. All structs are designed to be deserialized
//! from RON text.
//!
//! **Note:** This module contains no IO - callers hand it RON text or build
//! templates in code.

mod ability_data;
mod agent_data;
mod registry;

pub use ability_data::{
    AbilityConfig, AbilityData, AbilityKind, AttackConfig, ConstructConfig, HealthConfig,
    MoveConfig, SpawnerConfig, StructureConfig, TurnConfig,
};
pub use agent_data::{AgentTag, AgentTemplate};
pub use registry::{DataFile, DataRegistry};
