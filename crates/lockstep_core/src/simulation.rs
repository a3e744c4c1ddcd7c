//! Core simulation loop.
//!
//! The simulation runs at a fixed frame rate and advances every agent
//! deterministically. Each [`Simulation::tick`]:
//!
//! 1. **Command dispatch** - commands queued since the last tick, in
//!    receipt order
//! 2. **Simulate** - every active agent in ascending global ID order, each
//!    running its abilities in declared order
//! 3. **Late simulate** - cross-ability resolution, then the single drain
//!    point for buffered destroys and spawns
//! 4. Frame counter increments
//!
//! Visualization runs separately through [`Simulation::visualize`] and never
//! feeds back into simulated state.
//!
//! # Determinism
//!
//! - No floating-point math (fixed-point via [`Fixed`])
//! - No system randomness (one [`SeededRandom`](crate::random::SeededRandom)
//!   owned by the registry)
//! - Consistent iteration order (ascending global IDs)
//! - No structural change during a sweep
//!
//! # Example
//!
//! ```
//! use lockstep_core::command::{Command, Selection};
//! use lockstep_core::controller::AllegianceType;
//! use lockstep_core::data::{AbilityData, AbilityKind, AgentTemplate, DataRegistry, MoveConfig};
//! use lockstep_core::math::Vec2Fixed;
//! use lockstep_core::simulation::{Simulation, SimulationConfig};
//!
//! let mut data = DataRegistry::new();
//! data.register_ability(AbilityData::new(AbilityKind::Move, "Move", 1));
//! data.register_agent(AgentTemplate::new("scout").with_ability(MoveConfig::default()));
//!
//! let mut sim = Simulation::new(data, SimulationConfig::default());
//! let player = sim
//!     .registry_mut()
//!     .create_controller(AllegianceType::NEUTRAL, "player")
//!     .unwrap();
//! sim.registry_mut()
//!     .create_agent(player, "scout", Vec2Fixed::ZERO, Vec2Fixed::RIGHT)
//!     .unwrap();
//!
//! sim.queue_command(
//!     Command::move_to(player, Vec2Fixed::from_int(10, 0)).with_selection(Selection::new(vec![0])),
//! )
//! .unwrap();
//! sim.tick();
//! assert_eq!(sim.frame(), 1);
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::command::{Command, CommandQueue};
use crate::data::DataRegistry;
use crate::error::{GameError, Result};
use crate::math::Fixed;
use crate::registry::{AgentRegistry, MAX_AGENTS, MAX_CONTROLLERS};
use crate::snapshot::WorldSnapshot;

pub use crate::registry::TickEvents;

/// Simulation frames per second.
pub const FRAME_RATE: u32 = 32;

/// Session parameters shared by every peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Frames per simulated second. The fixed delta is `1 / frame_rate`.
    pub frame_rate: u32,
    /// Seed of the shared RNG.
    pub seed: u32,
    /// Reuse destroyed agents instead of dropping them.
    pub pooling_enabled: bool,
    /// Agents one controller may own.
    pub max_agents: usize,
    /// Size of the global agent table.
    pub global_capacity: usize,
    /// Controller ceiling.
    pub max_controllers: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frame_rate: FRAME_RATE,
            seed: 1,
            pooling_enabled: true,
            max_agents: MAX_AGENTS,
            global_capacity: MAX_AGENTS * 4,
            max_controllers: MAX_CONTROLLERS,
        }
    }
}

impl SimulationConfig {
    /// Fixed tick length in seconds.
    #[must_use]
    pub fn delta(&self) -> Fixed {
        Fixed::from_num(1) / Fixed::from_num(self.frame_rate.max(1))
    }

    /// Set the RNG seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// Enable or disable pooling.
    #[must_use]
    pub const fn with_pooling(mut self, enabled: bool) -> Self {
        self.pooling_enabled = enabled;
        self
    }
}

/// The tick driver.
///
/// Owns the [`AgentRegistry`] (which in turn owns the static data and the
/// RNG), the frame counter and the commands waiting for the next tick.
#[derive(Debug, Clone)]
pub struct Simulation {
    registry: AgentRegistry,
    frame: u64,
    commands: CommandQueue,
}

impl Simulation {
    /// Create an empty simulation at frame 0.
    #[must_use]
    pub fn new(data: DataRegistry, config: SimulationConfig) -> Self {
        Self {
            registry: AgentRegistry::new(data, config),
            frame: 0,
            commands: CommandQueue::new(),
        }
    }

    /// Create an empty simulation over RON data.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] for malformed data.
    pub fn from_ron_data(source_name: &str, text: &str, config: SimulationConfig) -> Result<Self> {
        Ok(Self::new(DataRegistry::from_ron_str(source_name, text)?, config))
    }

    /// Next frame to simulate.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// The agent registry.
    #[must_use]
    pub const fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Mutable agent registry, for setup between ticks.
    pub fn registry_mut(&mut self) -> &mut AgentRegistry {
        &mut self.registry
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        self.registry.config()
    }

    /// Static data.
    #[must_use]
    pub const fn data(&self) -> &DataRegistry {
        self.registry.data()
    }

    /// Commands waiting for the next tick.
    #[must_use]
    pub fn pending_commands(&self) -> &[Command] {
        self.commands.commands()
    }

    /// Queue a command for the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ControllerNotFound`] if the command names a
    /// controller that does not exist.
    pub fn queue_command(&mut self, command: Command) -> Result<()> {
        if self.registry.controller(command.controller).is_none() {
            return Err(GameError::ControllerNotFound(command.controller.0));
        }
        self.commands.push(command);
        Ok(())
    }

    /// Advance one frame.
    ///
    /// Returns the structural changes committed at this frame's drain.
    pub fn tick(&mut self) -> TickEvents {
        let frame = self.frame;
        for command in self.commands.drain().collect::<Vec<_>>() {
            if let Err(err) = self.registry.execute(&command, frame) {
                warn!(frame, error = %err, "Dropped command");
            }
        }

        self.registry.simulate(frame);
        let events = self.registry.late_simulate(frame);
        self.frame += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(frame = self.frame, state_hash = hash, "Simulation state hash");
        }

        events
    }

    /// Advance `frames` frames, collecting each frame's events.
    pub fn run(&mut self, frames: u64) -> Vec<TickEvents> {
        (0..frames).map(|_| self.tick()).collect()
    }

    /// Refresh presentation state. Outside the deterministic boundary.
    pub fn visualize(&mut self) {
        self.registry.visualize();
        self.registry.late_visualize();
    }

    /// Fingerprint of every active body, for desync detection.
    #[must_use]
    pub fn state_hash(&self) -> i64 {
        self.registry.get_state_hash()
    }

    /// [`state_hash`](Self::state_hash) extended with the frame and every
    /// ability's tracked variables.
    #[must_use]
    pub fn detailed_state_hash(&self) -> i64 {
        let frame = i64::from_ne_bytes(self.frame.to_ne_bytes());
        self.registry
            .active_agents()
            .fold(self.state_hash() ^ frame, |hash, agent| {
                hash.rotate_left(5) ^ agent.variables_hash()
            })
    }

    /// Capture the world between ticks. Queued commands are not included.
    #[must_use]
    pub fn save(&self) -> WorldSnapshot {
        self.registry.snapshot(self.frame)
    }

    /// Rebuild a simulation from a snapshot.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot names codes or controllers `data` does not
    /// know.
    pub fn load(snapshot: &WorldSnapshot, data: DataRegistry, config: SimulationConfig) -> Result<Self> {
        let mut sim = Self::new(data, config);
        sim.registry.restore(snapshot)?;
        sim.frame = snapshot.frame;
        Ok(sim)
    }

    /// Encode the world with bincode.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] if encoding fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        self.save().to_bytes()
    }

    /// Decode a world written by [`serialize`](Self::serialize).
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] for bad bytes, or a load error.
    pub fn deserialize(bytes: &[u8], data: DataRegistry, config: SimulationConfig) -> Result<Self> {
        Self::load(&WorldSnapshot::from_bytes(bytes)?, data, config)
    }
}
