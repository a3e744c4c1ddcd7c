//! # Lockstep Core
//!
//! Deterministic agent simulation core for lockstep RTS sessions.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO (replay file helpers aside)
//! - No system randomness
//! - No floating-point math on the simulation path (uses fixed-point)
//!
//! This separation enables:
//! - Lockstep multiplayer (identical simulation across peers)
//! - Headless verification
//! - Replay systems
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`math`] - Fixed-point scalars and vectors
//! - [`data`] - Agent templates and ability descriptors
//! - [`ability`] - Ability lifecycle framework
//! - [`abilities`] - Concrete abilities (move, turn, attack, construct, spawner, ...)
//! - [`agent`] - Agents and their handles
//! - [`controller`] - Controllers, selection and diplomacy
//! - [`registry`] - Global agent tables, pooling and buffered destruction
//! - [`command`] - Commands and selections
//! - [`simulation`] - Tick driver
//! - [`snapshot`] / [`replay`] - Save/load and replays

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod abilities;
pub mod ability;
pub mod agent;
pub mod body;
pub mod command;
pub mod controller;
pub mod data;
pub mod error;
pub mod ids;
pub mod math;
pub mod random;
pub mod registry;
pub mod replay;
pub mod simulation;
pub mod snapshot;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ability::{Ability, AbilityBehavior, ChargeCycle};
    pub use crate::agent::{Agent, AgentHandle};
    pub use crate::command::{Command, CommandData, Selection};
    pub use crate::controller::{AllegianceType, ControllerId, TeamId};
    pub use crate::data::{AbilityKind, AgentTag, AgentTemplate, DataRegistry};
    pub use crate::error::{GameError, Result};
    pub use crate::math::{Fixed, Vec2Fixed, Vec3Fixed};
    pub use crate::registry::AgentRegistry;
    pub use crate::replay::{Replay, ReplayPlayer};
    pub use crate::simulation::{Simulation, SimulationConfig, TickEvents, FRAME_RATE};
    pub use crate::snapshot::WorldSnapshot;
}
