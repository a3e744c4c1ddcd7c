//! Replay verification.
//!
//! Re-simulates a recorded replay from its embedded initial state, records
//! the hash after every tick, and compares the final hash against the one
//! stored in the replay. When an expected trace is supplied the first
//! divergent frame is reported as well.

use serde::Serialize;
use tracing::{debug, info};

use lockstep_core::replay::{Replay, ReplayPlayer};

use crate::error::Result;
use crate::trace::{HashTrace, TickRecord};

/// Outcome of verifying one replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Scenario the replay was recorded from.
    pub scenario_id: String,
    /// First frame of the replay.
    pub start_frame: u64,
    /// Frame reached by the re-simulation.
    pub final_frame: u64,
    /// Commands in the replay.
    pub commands: usize,
    /// Hash stored in the replay.
    pub expected_hash: i64,
    /// Hash reached by the re-simulation.
    pub actual_hash: i64,
    /// First frame that differs from the expected trace, if one was given.
    pub first_divergence: Option<u64>,
    /// Active agents at the end.
    pub agents: usize,
}

impl VerificationReport {
    /// Whether the re-simulation matched.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.expected_hash == self.actual_hash && self.first_divergence.is_none()
    }
}

/// Result of [`verify_replay`]: the report and the trace of the run.
#[derive(Debug, Clone)]
pub struct Verification {
    /// Summary.
    pub report: VerificationReport,
    /// Hash after every re-simulated tick.
    pub trace: HashTrace,
}

/// Re-simulate `replay` and compare against its final hash and, when given,
/// an expected per-tick trace.
///
/// # Errors
///
/// Fails if the replay's data or initial state cannot be restored.
pub fn verify_replay(replay: Replay, expected: Option<&HashTrace>) -> Result<Verification> {
    let scenario_id = replay.scenario_id.clone();
    let expected_hash = replay.final_hash;
    let commands = replay.command_count();
    let start_frame = replay.start_frame;

    let mut player = ReplayPlayer::new(replay)?;
    let mut trace = HashTrace::new(scenario_id.clone());
    while let Some(events) = player.tick() {
        let record = TickRecord::capture(player.simulation(), &events);
        debug!(frame = record.frame, state_hash = record.state_hash, "Re-simulated tick");
        trace.push(record);
    }

    let sim = player.simulation();
    let report = VerificationReport {
        scenario_id,
        start_frame,
        final_frame: sim.frame(),
        commands,
        expected_hash,
        actual_hash: sim.state_hash(),
        first_divergence: expected.and_then(|expected| expected.first_divergence(&trace)),
        agents: sim.registry().agent_count(),
    };
    info!(
        scenario = %report.scenario_id,
        final_frame = report.final_frame,
        passed = report.passed(),
        "Verified replay"
    );
    Ok(Verification { report, trace })
}

/// Static facts about a replay, without simulating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Scenario the replay was recorded from.
    pub scenario_id: String,
    /// Format version.
    pub version: u32,
    /// RNG seed.
    pub seed: u32,
    /// Frames per second.
    pub frame_rate: u32,
    /// First frame.
    pub start_frame: u64,
    /// Last frame.
    pub final_frame: u64,
    /// Recorded commands.
    pub commands: usize,
    /// Expected final hash.
    pub final_hash: i64,
    /// Controller names in creation order.
    pub controllers: Vec<String>,
    /// Active agents at the first frame.
    pub agents: usize,
    /// Agent templates in the embedded data.
    pub templates: usize,
}

/// Summarize a replay.
///
/// # Errors
///
/// Fails if the embedded data or initial state cannot be decoded.
pub fn inspect_replay(replay: &Replay) -> Result<ReplaySummary> {
    let sim = replay.restore_initial_state()?;
    Ok(ReplaySummary {
        scenario_id: replay.scenario_id.clone(),
        version: replay.version,
        seed: replay.config.seed,
        frame_rate: replay.config.frame_rate,
        start_frame: replay.start_frame,
        final_frame: replay.final_frame,
        commands: replay.command_count(),
        final_hash: replay.final_hash,
        controllers: sim
            .registry()
            .controllers()
            .iter()
            .map(|controller| controller.name().to_string())
            .collect(),
        agents: sim.registry().agent_count(),
        templates: sim.data().template_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{OrderPayload, Scenario, ScriptedOrder};
    use lockstep_core::data::AbilityKind;
    use lockstep_test_utils::fixtures::sample_data;

    fn scenario() -> Scenario {
        Scenario::from_ron_str(
            r#"
            Scenario(
                name: "patrol",
                seed: 3,
                frames: 96,
                data: "unused.ron",
                controllers: [(name: "red"), (name: "blue", default_allegiance: Enemy)],
                agents: [
                    (controller: 0, code: "scout", position: (0, 0)),
                    (controller: 1, code: "barracks", position: (10, 10)),
                ],
                orders: [
                    (frame: 0, controller: 0, agents: [0], ability: Move, payload: Position(12, 0)),
                    (frame: 5, controller: 1, agents: [1], ability: Spawner, payload: Text("soldier")),
                    (frame: 40, controller: 0, ability: Move, payload: Position(0, 12)),
                ],
            )
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_recorded_replay_verifies() {
        let recording = scenario().record(sample_data()).unwrap();
        let verification = verify_replay(recording.replay.clone(), Some(&recording.trace)).unwrap();

        let report = &verification.report;
        assert!(report.passed(), "{report:?}");
        assert_eq!(report.final_frame, 96);
        assert_eq!(report.commands, 3);
        assert_eq!(verification.trace, recording.trace);
        assert_eq!(report.agents, 3);
    }

    #[test]
    fn test_tampered_hash_fails() {
        let mut recording = scenario().record(sample_data()).unwrap();
        recording.replay.final_hash ^= 1;
        let report = verify_replay(recording.replay, None).unwrap().report;
        assert!(!report.passed());
        assert_eq!(report.first_divergence, None);
    }

    #[test]
    fn test_dropped_command_is_located() {
        let recording = scenario().record(sample_data()).unwrap();
        let mut replay = recording.replay.clone();
        replay.commands.retain(|command| command.frame != 40);

        let report = verify_replay(replay, Some(&recording.trace)).unwrap().report;
        assert!(!report.passed());
        assert_eq!(report.first_divergence, Some(41));
    }

    #[test]
    fn test_inspect() {
        let mut scenario = scenario();
        scenario.orders.push(ScriptedOrder {
            frame: 90,
            controller: 0,
            agents: vec![],
            ability: AbilityKind::Move,
            payload: OrderPayload::Stop,
        });
        let recording = scenario.record(sample_data()).unwrap();
        let summary = inspect_replay(&recording.replay).unwrap();
        assert_eq!(summary.scenario_id, "patrol");
        assert_eq!(summary.seed, 3);
        assert_eq!(summary.frame_rate, 32);
        assert_eq!(summary.commands, 4);
        assert_eq!(summary.controllers, vec!["red".to_string(), "blue".to_string()]);
        assert_eq!(summary.agents, 2);
        assert_eq!(summary.templates, sample_data().template_count());
    }
}
