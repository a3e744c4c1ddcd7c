//! Ability detail records survive a save/load cycle, and records written
//! by a newer build with extra properties still load.

use lockstep_core::ability::{SaveToken, SaveValue};
use lockstep_core::agent::AgentHandle;
use lockstep_core::command::CommandData;
use lockstep_core::data::AbilityKind;
use lockstep_core::simulation::{Simulation, SimulationConfig};
use lockstep_core::snapshot::WorldSnapshot;
use lockstep_test_utils::fixtures::{order, pos, sample_data, spawn, two_player_simulation};

/// A builder walking to its project and a barracks halfway through its queue.
fn busy_world() -> (Simulation, AgentHandle, AgentHandle) {
    let (mut sim, red, blue) = two_player_simulation(SimulationConfig::default());
    let depot = spawn(&mut sim, red, "depot", 20, 0);
    let worker = spawn(&mut sim, red, "worker", 0, 0);
    let barracks = spawn(&mut sim, blue, "barracks", -10, 0);

    order(&mut sim, worker, AbilityKind::Construct, CommandData::Target(depot.global_id));
    order(&mut sim, barracks, AbilityKind::Spawner, CommandData::Position(pos(-10, 8)));
    for _ in 0..2 {
        order(
            &mut sim,
            barracks,
            AbilityKind::Spawner,
            CommandData::Text("soldier".to_string()),
        );
    }
    sim.run(80);
    (sim, worker, barracks)
}

/// Insert an unrecognized property before every end marker.
fn with_unknown_properties(tokens: &[SaveToken]) -> Vec<SaveToken> {
    let mut out = Vec::with_capacity(tokens.len() * 2);
    for token in tokens {
        if matches!(token, SaveToken::EndRecord) {
            out.push(SaveToken::Property {
                name: "ArmorPlating".to_string(),
                value: SaveValue::Int(42),
            });
        }
        out.push(token.clone());
    }
    out
}

#[test]
fn test_unknown_saved_properties_are_ignored() {
    let (sim, worker, barracks) = busy_world();
    let mut extended: WorldSnapshot = sim.save();
    for agent in &mut extended.agents {
        agent.details = with_unknown_properties(&agent.details);
    }
    let restored = Simulation::load(&extended, sample_data(), SimulationConfig::default()).unwrap();

    for handle in [worker, barracks] {
        let original = sim.registry().get(handle).unwrap();
        let loaded = restored.registry().get(handle).unwrap();
        assert_eq!(loaded.save_details(), original.save_details(), "{}", original.code());
        assert!(loaded
            .abilities()
            .iter()
            .all(|ability| ability.core().loaded_saved_values()));
    }

    let builder = restored
        .registry()
        .get(worker)
        .and_then(|agent| agent.ability_of_kind(AbilityKind::Construct))
        .and_then(|ability| ability.as_construct())
        .unwrap();
    assert!(builder.is_building());
    assert!(builder.current_project().is_some());

    let spawner = restored
        .registry()
        .get(barracks)
        .and_then(|agent| agent.ability_of_kind(AbilityKind::Spawner))
        .and_then(|ability| ability.as_spawner())
        .unwrap();
    assert_eq!(spawner.queue_len(), 1);
    assert_eq!(spawner.rally_point().to_2d(), pos(-10, 8));

    assert_eq!(restored.state_hash(), sim.state_hash());
    let (mut sim, mut restored) = (sim, restored);
    for _ in 0..16 {
        sim.tick();
        restored.tick();
        assert_eq!(restored.detailed_state_hash(), sim.detailed_state_hash());
    }
}
