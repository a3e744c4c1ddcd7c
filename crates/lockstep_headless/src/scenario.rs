//! Scenario loading and recording.
//!
//! A scenario names a data file, the controllers of a session, the agents
//! present at frame 0 and a script of orders. Recording a scenario plays
//! the script through a fresh simulation and produces a [`Replay`] plus the
//! per-tick hash trace of the run.
//!
//! Positions are whole world units so scenarios stay easy to write by hand.
//!
//! # Example RON
//!
//! ```ron
//! Scenario(
//!     name: "build_and_fight",
//!     seed: 7,
//!     frames: 320,
//!     data: "data.ron",
//!     controllers: [
//!         (name: "red", default_allegiance: Enemy),
//!         (name: "blue", default_allegiance: Enemy),
//!     ],
//!     agents: [
//!         (controller: 0, code: "worker", position: (0, 0)),
//!         (controller: 0, code: "depot", position: (6, 0)),
//!     ],
//!     orders: [
//!         (frame: 0, controller: 0, agents: [0], ability: Construct, payload: Agent(1)),
//!     ],
//! )
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use lockstep_core::agent::AgentHandle;
use lockstep_core::command::{Command, CommandData, Selection};
use lockstep_core::controller::{AllegianceType, ControllerId, TeamId};
use lockstep_core::data::{AbilityKind, DataRegistry};
use lockstep_core::math::Vec2Fixed;
use lockstep_core::replay::Replay;
use lockstep_core::simulation::{Simulation, SimulationConfig};

use crate::error::{HeadlessError, Result};
use crate::trace::{HashTrace, TickRecord};

/// Default stance of a controller towards everyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Stance {
    /// Neither friend nor foe.
    #[default]
    Neutral,
    /// Allied.
    Friendly,
    /// Hostile.
    Enemy,
}

impl From<Stance> for AllegianceType {
    fn from(stance: Stance) -> Self {
        match stance {
            Stance::Neutral => Self::NEUTRAL,
            Stance::Friendly => Self::FRIENDLY,
            Stance::Enemy => Self::ENEMY,
        }
    }
}

/// One controller of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSetup {
    /// Display name.
    pub name: String,
    /// Default allegiance towards other controllers.
    #[serde(default)]
    pub default_allegiance: Stance,
    /// Team, if any.
    #[serde(default)]
    pub team: Option<u8>,
}

/// One agent present at frame 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSetup {
    /// Index into [`Scenario::controllers`].
    pub controller: usize,
    /// Agent code.
    pub code: String,
    /// Position in world units.
    pub position: (i32, i32),
    /// Facing, in world units; normalized on spawn.
    #[serde(default = "default_facing")]
    pub facing: (i32, i32),
}

const fn default_facing() -> (i32, i32) {
    (1, 0)
}

/// Payload of a scripted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderPayload {
    /// A ground position in world units.
    Position(i32, i32),
    /// An agent, as an index into [`Scenario::agents`].
    Agent(usize),
    /// A text value, such as an agent code to produce.
    Text(String),
    /// Stop moves and casts.
    Stop,
}

/// An order issued at a given frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedOrder {
    /// Frame the order is queued for.
    pub frame: u64,
    /// Index into [`Scenario::controllers`] of the issuer.
    pub controller: usize,
    /// Agents to select, as indices into [`Scenario::agents`].
    ///
    /// Empty reuses the controller's previous selection.
    #[serde(default)]
    pub agents: Vec<usize>,
    /// Ability that receives the payload.
    pub ability: AbilityKind,
    /// Payload.
    pub payload: OrderPayload,
}

/// A complete scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name, stored as the replay's scenario ID.
    pub name: String,
    /// Seed of the shared RNG.
    #[serde(default = "default_seed")]
    pub seed: u32,
    /// Frames to simulate.
    pub frames: u64,
    /// RON data file, relative to the scenario file.
    pub data: PathBuf,
    /// Reuse destroyed agents.
    #[serde(default = "default_pooling")]
    pub pooling: bool,
    /// Controllers in creation order.
    pub controllers: Vec<ControllerSetup>,
    /// Agents present at frame 0, spawned in order.
    #[serde(default)]
    pub agents: Vec<AgentSetup>,
    /// Orders, in any order; orders on the same frame keep their listed order.
    #[serde(default)]
    pub orders: Vec<ScriptedOrder>,
}

const fn default_seed() -> u32 {
    1
}

const fn default_pooling() -> bool {
    true
}

/// Output of [`Scenario::record`].
#[derive(Debug, Clone)]
pub struct Recording {
    /// The recorded replay, finalized.
    pub replay: Replay,
    /// State hash after every tick.
    pub trace: HashTrace,
}

impl Scenario {
    /// Load a scenario from a RON file.
    ///
    /// The data path is resolved against the scenario file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HeadlessError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut scenario = Self::from_ron_str(&contents)?;
        if scenario.data.is_relative() {
            if let Some(dir) = path.parent() {
                scenario.data = dir.join(&scenario.data);
            }
        }
        Ok(scenario)
    }

    /// Load from a RON string. The data path is left as written.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Read and parse the data file this scenario names.
    pub fn load_data(&self) -> Result<DataRegistry> {
        if !self.data.exists() {
            return Err(HeadlessError::FileNotFound(self.data.display().to_string()));
        }
        let text = std::fs::read_to_string(&self.data)?;
        let source = self.data.display().to_string();
        Ok(DataRegistry::from_ron_str(&source, &text)?)
    }

    /// Simulation configuration for this scenario.
    #[must_use]
    pub fn config(&self) -> SimulationConfig {
        SimulationConfig::default()
            .with_seed(self.seed)
            .with_pooling(self.pooling)
    }

    /// Set up controllers and agents at frame 0.
    pub fn build(&self, data: DataRegistry) -> Result<Session> {
        let problems = data.validate();
        if let Some(problem) = problems.first() {
            return Err(HeadlessError::InvalidScenario(problem.clone()));
        }

        let mut sim = Simulation::new(data, self.config());
        let mut controllers = Vec::with_capacity(self.controllers.len());
        for setup in &self.controllers {
            let registry = sim.registry_mut();
            let id = registry.create_controller(setup.default_allegiance.into(), &setup.name)?;
            if let (Some(team), Some(controller)) = (setup.team, registry.controller_mut(id)) {
                controller.join_team(TeamId(team));
            }
            controllers.push(id);
        }

        let mut agents = Vec::with_capacity(self.agents.len());
        for (index, setup) in self.agents.iter().enumerate() {
            let controller = *controllers.get(setup.controller).ok_or_else(|| {
                HeadlessError::InvalidScenario(format!(
                    "agent {index} names controller {} of {}",
                    setup.controller,
                    controllers.len()
                ))
            })?;
            let position = Vec2Fixed::from_int(setup.position.0, setup.position.1);
            let facing = Vec2Fixed::from_int(setup.facing.0, setup.facing.1).normalize();
            let facing = if facing == Vec2Fixed::ZERO {
                Vec2Fixed::RIGHT
            } else {
                facing
            };
            let handle = sim
                .registry_mut()
                .create_agent(controller, &setup.code, position, facing)?;
            agents.push(handle);
        }

        info!(
            scenario = %self.name,
            controllers = controllers.len(),
            agents = agents.len(),
            "Scenario set up"
        );
        Ok(Session {
            sim,
            controllers,
            agents,
        })
    }

    /// Play the script and record a replay of it.
    pub fn record(&self, data: DataRegistry) -> Result<Recording> {
        let mut session = self.build(data)?;
        let mut replay = Replay::new(self.name.clone(), &session.sim)?;
        let mut trace = HashTrace::new(self.name.clone());

        let mut orders: Vec<&ScriptedOrder> = self.orders.iter().collect();
        orders.sort_by_key(|order| order.frame);
        let mut next = 0;

        for _ in 0..self.frames {
            let frame = session.sim.frame();
            while let Some(order) = orders.get(next).filter(|order| order.frame <= frame) {
                next += 1;
                let Some(command) = session.command(order)? else {
                    continue;
                };
                replay.record_command(frame, command.clone());
                session.sim.queue_command(command)?;
            }
            let events = session.sim.tick();
            trace.push(TickRecord::capture(&session.sim, &events));
        }

        replay.finalize(session.sim.frame(), session.sim.state_hash());
        info!(
            scenario = %self.name,
            frames = self.frames,
            commands = replay.command_count(),
            final_hash = replay.final_hash,
            "Recorded scenario"
        );
        Ok(Recording { replay, trace })
    }
}

/// A scenario set up at frame 0.
#[derive(Debug, Clone)]
pub struct Session {
    /// The simulation.
    pub sim: Simulation,
    /// Controller IDs, indexed like [`Scenario::controllers`].
    pub controllers: Vec<ControllerId>,
    /// Agent handles, indexed like [`Scenario::agents`].
    pub agents: Vec<AgentHandle>,
}

impl Session {
    /// Translate a scripted order into a command.
    ///
    /// Returns `Ok(None)` when every selected agent is gone or the target
    /// agent is gone; those orders would do nothing.
    pub fn command(&self, order: &ScriptedOrder) -> Result<Option<Command>> {
        let controller = *self.controllers.get(order.controller).ok_or_else(|| {
            HeadlessError::InvalidScenario(format!(
                "order at frame {} names controller {}",
                order.frame, order.controller
            ))
        })?;

        let payload = match &order.payload {
            OrderPayload::Position(x, y) => CommandData::Position(Vec2Fixed::from_int(*x, *y)),
            OrderPayload::Agent(index) => match self.live_agent(*index)? {
                Some(handle) => CommandData::Target(handle.global_id),
                None => {
                    warn!(frame = order.frame, agent = index, "Order target is gone");
                    return Ok(None);
                }
            },
            OrderPayload::Text(text) => CommandData::Text(text.clone()),
            OrderPayload::Stop => CommandData::Stop,
        };

        let mut command = Command::new(controller, order.ability, payload);
        if !order.agents.is_empty() {
            let mut local_ids = Vec::with_capacity(order.agents.len());
            for &index in &order.agents {
                let agent = self
                    .live_agent(index)?
                    .and_then(|handle| self.sim.registry().get(handle))
                    .filter(|agent| agent.controller_id() == Some(controller));
                match agent {
                    Some(agent) => local_ids.push(agent.local_id()),
                    None => warn!(frame = order.frame, agent = index, "Skipping unavailable agent"),
                }
            }
            if local_ids.is_empty() {
                return Ok(None);
            }
            command = command.with_selection(Selection::new(local_ids));
        }
        Ok(Some(command))
    }

    fn live_agent(&self, index: usize) -> Result<Option<AgentHandle>> {
        let handle = *self.agents.get(index).ok_or_else(|| {
            HeadlessError::InvalidScenario(format!(
                "agent index {index} out of {}",
                self.agents.len()
            ))
        })?;
        Ok(self.sim.registry().get(handle).map(|_| handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_test_utils::fixtures::{sample_data, sample_data_ron};

    const SKIRMISH: &str = r#"
        Scenario(
            name: "build_and_fight",
            seed: 7,
            frames: 200,
            data: "data.ron",
            controllers: [
                (name: "red", default_allegiance: Enemy),
                (name: "blue", default_allegiance: Enemy, team: Some(2)),
            ],
            agents: [
                (controller: 0, code: "worker", position: (0, 0)),
                (controller: 0, code: "depot", position: (6, 0)),
                (controller: 0, code: "soldier", position: (0, -4)),
                (controller: 1, code: "scout", position: (3, -4), facing: (-1, 0)),
                (controller: 1, code: "barracks", position: (20, 0)),
            ],
            orders: [
                (frame: 0, controller: 0, agents: [0], ability: Construct, payload: Agent(1)),
                (frame: 0, controller: 0, agents: [2], ability: Attack, payload: Agent(3)),
                (frame: 2, controller: 1, agents: [4], ability: Spawner, payload: Text("soldier")),
                (frame: 150, controller: 0, agents: [2], ability: Attack, payload: Agent(3)),
                (frame: 160, controller: 1, ability: Spawner, payload: Position(14, 4)),
            ],
        )
    "#;

    #[test]
    fn test_parse_from_ron() {
        let scenario = Scenario::from_ron_str(SKIRMISH).unwrap();
        assert_eq!(scenario.name, "build_and_fight");
        assert_eq!(scenario.seed, 7);
        assert!(scenario.pooling);
        assert_eq!(scenario.agents[0].facing, (1, 0));
        assert_eq!(scenario.agents[3].facing, (-1, 0));
        assert_eq!(scenario.controllers[1].team, Some(2));
        assert_eq!(scenario.orders.len(), 5);
    }

    #[test]
    fn test_load_resolves_data_next_to_scenario() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.ron"), sample_data_ron()).unwrap();
        let path = dir.path().join("scenario.ron");
        std::fs::write(&path, SKIRMISH).unwrap();

        let scenario = Scenario::load(&path).unwrap();
        assert_eq!(scenario.data, dir.path().join("data.ron"));
        let data = scenario.load_data().unwrap();
        assert!(data.is_valid_agent_code("barracks"));
    }

    #[test]
    fn test_missing_file() {
        let err = Scenario::load("/definitely/not/here.ron").unwrap_err();
        assert!(matches!(err, HeadlessError::FileNotFound(_)));
    }

    #[test]
    fn test_build_spawns_every_agent() {
        let scenario = Scenario::from_ron_str(SKIRMISH).unwrap();
        let session = scenario.build(sample_data()).unwrap();
        assert_eq!(session.agents.len(), 5);
        assert_eq!(session.sim.registry().agent_count(), 5);
        let blue = session.sim.registry().controller(session.controllers[1]).unwrap();
        assert_eq!(blue.team(), Some(TeamId(2)));
    }

    #[test]
    fn test_bad_controller_index_is_rejected() {
        let mut scenario = Scenario::from_ron_str(SKIRMISH).unwrap();
        scenario.agents[0].controller = 9;
        let err = scenario.build(sample_data()).unwrap_err();
        assert!(matches!(err, HeadlessError::InvalidScenario(_)));
    }

    #[test]
    fn test_record_is_reproducible() {
        let scenario = Scenario::from_ron_str(SKIRMISH).unwrap();
        let first = scenario.record(sample_data()).unwrap();
        let second = scenario.record(sample_data()).unwrap();

        assert_eq!(first.trace.ticks.len(), 200);
        assert_eq!(first.replay.final_frame, 200);
        assert_eq!(first.replay.final_hash, second.replay.final_hash);
        assert_eq!(first.trace, second.trace);
        assert_eq!(first.trace.first_divergence(&second.trace), None);
    }

    #[test]
    fn test_orders_on_dead_agents_are_dropped() {
        let scenario = Scenario::from_ron_str(SKIRMISH).unwrap();
        let recording = scenario.record(sample_data()).unwrap();
        // The scout dies before frame 150, so the repeated attack is dropped.
        assert!(recording.replay.commands_at_frame(150).is_empty());
        assert_eq!(recording.replay.commands_at_frame(160).len(), 1);
    }
}
