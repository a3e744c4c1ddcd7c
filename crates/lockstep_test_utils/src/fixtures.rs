//! Test fixtures and helpers.
//!
//! A small but complete data set (scouts, workers, soldiers, a depot that
//! is built on site and a barracks that produces soldiers) plus helpers
//! for setting up two-player sessions and issuing orders to single agents.

use lockstep_core::agent::AgentHandle;
use lockstep_core::command::{Command, CommandData, Selection};
use lockstep_core::controller::{AllegianceType, ControllerId};
use lockstep_core::data::{
    AbilityData, AbilityKind, AgentTag, AgentTemplate, AttackConfig, ConstructConfig,
    DataRegistry, HealthConfig, MoveConfig, SpawnerConfig, StructureConfig, TurnConfig,
};
use lockstep_core::math::{Fixed, Vec2Fixed};
use lockstep_core::simulation::{Simulation, SimulationConfig};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> Fixed {
    Fixed::from_num(n)
}

/// Create a ground position from integers.
#[must_use]
pub fn pos(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_int(x, y)
}

/// Input identifiers of the sample abilities.
pub mod inputs {
    /// Move orders.
    pub const MOVE: u16 = 1;
    /// Turn orders.
    pub const TURN: u16 = 2;
    /// Attack orders.
    pub const ATTACK: u16 = 3;
    /// Build orders.
    pub const CONSTRUCT: u16 = 4;
    /// Production orders.
    pub const SPAWNER: u16 = 5;
}

/// The sample data set.
///
/// | code       | abilities                                  |
/// |------------|--------------------------------------------|
/// | `scout`    | move, turn, health                         |
/// | `worker`   | move, turn, construct, health              |
/// | `soldier`  | move, turn, attack, health                 |
/// | `depot`    | structure (3 work), health                 |
/// | `barracks` | spawner (`soldier`), structure (done), health |
/// | `rock`     | nothing                                    |
#[must_use]
pub fn sample_data() -> DataRegistry {
    let mut data = DataRegistry::new();
    data.register_ability(AbilityData::new(AbilityKind::Move, "Move", inputs::MOVE));
    data.register_ability(AbilityData::new(AbilityKind::Turn, "Turn", inputs::TURN));
    data.register_ability(AbilityData::new(
        AbilityKind::Attack,
        "Attack",
        inputs::ATTACK,
    ));
    data.register_ability(AbilityData::new(
        AbilityKind::Construct,
        "Construct",
        inputs::CONSTRUCT,
    ));
    data.register_ability(AbilityData::new(
        AbilityKind::Spawner,
        "Spawner",
        inputs::SPAWNER,
    ));

    data.register_agent(
        AgentTemplate::new("scout")
            .with_ability(MoveConfig { speed: fixed(6) })
            .with_ability(TurnConfig::default())
            .with_ability(HealthConfig {
                max_health: fixed(40),
            }),
    );
    data.register_agent(
        AgentTemplate::new("worker")
            .with_tag(AgentTag::Builder)
            .with_ability(MoveConfig::default())
            .with_ability(TurnConfig::default())
            .with_ability(ConstructConfig {
                build_actions: vec!["depot".to_string()],
                ..ConstructConfig::default()
            })
            .with_ability(HealthConfig {
                max_health: fixed(50),
            }),
    );
    data.register_agent(
        AgentTemplate::new("soldier")
            .with_tag(AgentTag::Soldier)
            .with_priority(1)
            .with_ability(MoveConfig::default())
            .with_ability(TurnConfig::default())
            .with_ability(AttackConfig {
                range: fixed(2),
                ..AttackConfig::default()
            })
            .with_ability(HealthConfig::default()),
    );
    data.register_agent(
        AgentTemplate::new("depot")
            .with_radius(fixed(1))
            .with_priority(5)
            .with_ability(StructureConfig {
                build_required: fixed(3),
                starts_constructed: false,
            })
            .with_ability(HealthConfig {
                max_health: fixed(200),
            }),
    );
    data.register_agent(
        AgentTemplate::new("barracks")
            .with_tag(AgentTag::Producer)
            .with_radius(fixed(2))
            .with_priority(5)
            .with_ability(SpawnerConfig {
                spawn_actions: vec!["soldier".to_string()],
                ..SpawnerConfig::default()
            })
            .with_ability(StructureConfig {
                starts_constructed: true,
                ..StructureConfig::default()
            })
            .with_ability(HealthConfig {
                max_health: fixed(300),
            }),
    );
    data.register_agent(AgentTemplate::new("rock"));
    data
}

/// The sample data set as RON text.
///
/// # Panics
///
/// Panics if the data cannot be written, which would be a bug in the data
/// types.
#[must_use]
pub fn sample_data_ron() -> String {
    sample_data()
        .to_ron_string()
        .expect("sample data always serializes")
}

/// Simulation over the sample data with two controllers that are enemies
/// of each other.
///
/// # Panics
///
/// Panics if controller creation fails, which cannot happen on a fresh
/// simulation.
#[must_use]
pub fn two_player_simulation(config: SimulationConfig) -> (Simulation, ControllerId, ControllerId) {
    let mut sim = Simulation::new(sample_data(), config);
    let registry = sim.registry_mut();
    let red = registry
        .create_controller(AllegianceType::ENEMY, "red")
        .expect("fresh simulation has controller room");
    let blue = registry
        .create_controller(AllegianceType::ENEMY, "blue")
        .expect("fresh simulation has controller room");
    (sim, red, blue)
}

/// Spawn `code` at `(x, y)` facing right.
///
/// # Panics
///
/// Panics if the code is not in the data set or the controller is full.
pub fn spawn(
    sim: &mut Simulation,
    controller: ControllerId,
    code: &str,
    x: i32,
    y: i32,
) -> AgentHandle {
    sim.registry_mut()
        .create_agent(controller, code, pos(x, y), Vec2Fixed::RIGHT)
        .unwrap_or_else(|err| panic!("failed to spawn {code}: {err}"))
}

/// Local ID selection naming just `agent`.
///
/// # Panics
///
/// Panics if the handle is stale.
#[must_use]
pub fn select(sim: &Simulation, agent: AgentHandle) -> Selection {
    let local_id = sim
        .registry()
        .get(agent)
        .map(|agent| agent.local_id())
        .expect("selected agent is alive");
    Selection::new(vec![local_id])
}

/// Queue an order for a single agent.
///
/// # Panics
///
/// Panics if the handle is stale or the agent has no controller.
pub fn order(sim: &mut Simulation, agent: AgentHandle, ability: AbilityKind, payload: CommandData) {
    let selection = select(sim, agent);
    let controller = sim
        .registry()
        .get(agent)
        .and_then(|agent| agent.controller_id())
        .expect("ordered agent has a controller");
    sim.queue_command(Command::new(controller, ability, payload).with_selection(selection))
        .expect("controller exists");
}

/// A skirmish used by determinism tests, benchmarks and the headless
/// verifier: a red builder crew with a depot to finish, a blue barracks
/// producing soldiers, and scouts from both sides wandering towards each
/// other.
#[must_use]
pub fn skirmish(seed: u32) -> Simulation {
    let (mut sim, red, blue) = two_player_simulation(SimulationConfig::default().with_seed(seed));

    let depot = spawn(&mut sim, red, "depot", 8, 0);
    for y in 0..3 {
        let worker = spawn(&mut sim, red, "worker", 0, y * 2);
        order(&mut sim, worker, AbilityKind::Construct, CommandData::Target(depot.global_id));
    }

    let barracks = spawn(&mut sim, blue, "barracks", 30, 0);
    order(&mut sim, barracks, AbilityKind::Spawner, CommandData::Position(pos(24, 4)));
    for _ in 0..3 {
        order(
            &mut sim,
            barracks,
            AbilityKind::Spawner,
            CommandData::Text("soldier".to_string()),
        );
    }

    for i in 0..4 {
        let red_scout = spawn(&mut sim, red, "scout", -4, i * 3);
        order(&mut sim, red_scout, AbilityKind::Move, CommandData::Position(pos(20, 10 - i)));
        let blue_scout = spawn(&mut sim, blue, "scout", 36, i * 3);
        order(&mut sim, blue_scout, AbilityKind::Move, CommandData::Position(pos(4, i)));
    }

    let soldier = spawn(&mut sim, red, "soldier", 2, -6);
    let target = spawn(&mut sim, blue, "scout", 10, -6);
    order(&mut sim, soldier, AbilityKind::Attack, CommandData::Target(target.global_id));

    sim
}

/// A crowd of `count` scouts split between two controllers, each walking
/// to a mirrored point. Used for throughput benchmarks.
#[must_use]
pub fn crowd(count: usize, seed: u32) -> Simulation {
    let (mut sim, red, blue) = two_player_simulation(SimulationConfig::default().with_seed(seed));
    let count = i32::try_from(count).unwrap_or(i32::MAX);
    for i in 0..count {
        let (controller, x) = if i % 2 == 0 { (red, -50) } else { (blue, 50) };
        let y = i / 2 % 100;
        let scout = spawn(&mut sim, controller, "scout", x, y);
        order(&mut sim, scout, AbilityKind::Move, CommandData::Position(pos(-x, 100 - y)));
    }
    sim
}
