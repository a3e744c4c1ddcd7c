//! Replay system for recording and playing back sessions.
//!
//! A replay stores the data file, the session configuration, the initial
//! world snapshot and the stream of commands with the frame each one was
//! queued for. Re-simulating the stream from the snapshot reproduces the
//! session exactly, so the final state hash doubles as a desync check.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::command::Command;
use crate::data::DataRegistry;
use crate::error::{GameError, Result};
use crate::simulation::{Simulation, SimulationConfig, TickEvents};

/// A single command record for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayCommand {
    /// Frame whose tick dispatches the command.
    pub frame: u64,
    /// The command that was issued.
    pub command: Command,
}

impl ReplayCommand {
    /// Create a new replay command record.
    #[must_use]
    pub const fn new(frame: u64, command: Command) -> Self {
        Self { frame, command }
    }
}

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Complete replay data structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Scenario identifier or name.
    pub scenario_id: String,
    /// Session configuration, seed included.
    pub config: SimulationConfig,
    /// Data file the session ran on, as RON.
    pub data_ron: String,
    /// Bincode snapshot of the initial world.
    pub initial_state: Vec<u8>,
    /// Frame of the initial snapshot.
    pub start_frame: u64,
    /// Stream of commands in frame order.
    pub commands: Vec<ReplayCommand>,
    /// Frame when the session ended.
    pub final_frame: u64,
    /// State hash at `final_frame`.
    pub final_hash: i64,
}

impl Replay {
    /// Create a new replay from a simulation's current state.
    ///
    /// Commands already queued for the next tick are recorded at the
    /// current frame, since snapshots do not carry them.
    ///
    /// # Errors
    ///
    /// Returns an error if the data or the world cannot be encoded.
    pub fn new(scenario_id: impl Into<String>, initial_state: &Simulation) -> Result<Self> {
        let frame = initial_state.frame();
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            config: initial_state.config().clone(),
            data_ron: initial_state.data().to_ron_string()?,
            initial_state: initial_state.serialize()?,
            start_frame: frame,
            commands: initial_state
                .pending_commands()
                .iter()
                .map(|command| ReplayCommand::new(frame, command.clone()))
                .collect(),
            final_frame: frame,
            final_hash: initial_state.state_hash(),
        })
    }

    /// Record a command queued for `frame`.
    pub fn record_command(&mut self, frame: u64, command: Command) {
        self.commands.push(ReplayCommand::new(frame, command));
    }

    /// Finalize the replay with end-of-session state.
    pub fn finalize(&mut self, final_frame: u64, final_hash: i64) {
        self.final_frame = final_frame;
        self.final_hash = final_hash;
    }

    /// Encode with bincode.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::Serialization(format!("Failed to serialize replay: {e}")))
    }

    /// Decode and check the format version.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] for bad bytes and
    /// [`GameError::ReplayVersionMismatch`] for another format version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self = bincode::deserialize(bytes)
            .map_err(|e| GameError::Serialization(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::ReplayVersionMismatch {
                expected: REPLAY_VERSION,
                found: replay.version,
            });
        }

        Ok(replay)
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to write replay file: {e}")))?;
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if file reading, decoding or the version check
    /// fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| GameError::InvalidState(format!("Failed to read replay file: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Parse the embedded data file.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] for malformed data.
    pub fn data(&self) -> Result<DataRegistry> {
        DataRegistry::from_ron_str(&self.scenario_id, &self.data_ron)
    }

    /// Get the initial simulation state for playback.
    ///
    /// # Errors
    ///
    /// Returns an error if the data or the snapshot cannot be restored.
    pub fn restore_initial_state(&self) -> Result<Simulation> {
        Simulation::deserialize(&self.initial_state, self.data()?, self.config.clone())
    }

    /// Commands queued for a specific frame.
    #[must_use]
    pub fn commands_at_frame(&self, frame: u64) -> Vec<&ReplayCommand> {
        self.commands
            .iter()
            .filter(|cmd| cmd.frame == frame)
            .collect()
    }

    /// Number of frames played after the initial snapshot.
    #[must_use]
    pub const fn duration(&self) -> u64 {
        self.final_frame.saturating_sub(self.start_frame)
    }

    /// Get the total number of commands in the replay.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

/// Replay playback controller.
#[derive(Debug)]
pub struct ReplayPlayer {
    /// The replay being played.
    replay: Replay,
    /// Current simulation state.
    simulation: Simulation,
    /// Index into the command stream.
    command_index: usize,
    /// Playback speed multiplier (1.0 = normal, 2.0 = 2x, 0.5 = half).
    pub playback_speed: f64,
    /// Whether playback is paused.
    pub paused: bool,
}

impl ReplayPlayer {
    /// Create a new replay player from a replay.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial state cannot be restored.
    pub fn new(replay: Replay) -> Result<Self> {
        let simulation = replay.restore_initial_state()?;
        Ok(Self {
            replay,
            simulation,
            command_index: 0,
            playback_speed: 1.0,
            paused: false,
        })
    }

    fn step(&mut self) -> TickEvents {
        let frame = self.simulation.frame();
        while let Some(cmd) = self.replay.commands.get(self.command_index) {
            if cmd.frame > frame {
                break;
            }
            if let Err(err) = self.simulation.queue_command(cmd.command.clone()) {
                warn!(frame, error = %err, "Skipping replay command");
            }
            self.command_index += 1;
        }
        self.simulation.tick()
    }

    /// Advance the replay by one frame.
    ///
    /// Returns true if there are more frames to play.
    pub fn advance(&mut self) -> bool {
        if self.paused || self.is_finished() {
            return !self.is_finished();
        }
        self.step();
        !self.is_finished()
    }

    /// Advance one frame and return what it committed, or `None` when
    /// paused or finished.
    pub fn tick(&mut self) -> Option<TickEvents> {
        if self.paused || self.is_finished() {
            return None;
        }
        Some(self.step())
    }

    /// Seek to a specific frame by replaying from the start.
    ///
    /// # Errors
    ///
    /// Returns an error if state restoration fails.
    pub fn seek(&mut self, target_frame: u64) -> Result<()> {
        self.simulation = self.replay.restore_initial_state()?;
        self.command_index = 0;

        let target = target_frame.min(self.replay.final_frame);
        while self.simulation.frame() < target {
            self.step();
        }
        debug!(frame = self.simulation.frame(), "Replay seek complete");
        Ok(())
    }

    /// Get the current frame.
    #[must_use]
    pub const fn current_frame(&self) -> u64 {
        self.simulation.frame()
    }

    /// Get a reference to the current simulation state.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Get the replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Check if the replay has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.simulation.frame() >= self.replay.final_frame
    }

    /// Verify the replay produces the expected final hash.
    ///
    /// # Errors
    ///
    /// Returns an error if state restoration fails.
    pub fn verify(&mut self) -> Result<bool> {
        self.seek(self.replay.final_frame)?;
        Ok(self.simulation.state_hash() == self.replay.final_hash)
    }

    /// Like [`verify`](Self::verify), but a mismatch is an error.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DesyncDetected`] on a hash mismatch.
    pub fn check(&mut self) -> Result<()> {
        if self.verify()? {
            return Ok(());
        }
        Err(GameError::DesyncDetected {
            frame: self.simulation.frame(),
            local_hash: self.simulation.state_hash(),
            remote_hash: self.replay.final_hash,
        })
    }

    /// Toggle pause state.
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Set playback speed.
    pub fn set_speed(&mut self, speed: f64) {
        self.playback_speed = speed.clamp(0.1, 10.0);
    }

    /// Get progress as a percentage (0-100).
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        let duration = self.replay.duration();
        if duration == 0 {
            100.0
        } else {
            let played = self.simulation.frame().saturating_sub(self.replay.start_frame);
            (played as f64 / duration as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Selection;
    use crate::controller::{AllegianceType, ControllerId};
    use crate::data::{AbilityData, AbilityKind, AgentTemplate, MoveConfig};
    use crate::math::Vec2Fixed;

    fn create_test_simulation() -> (Simulation, ControllerId) {
        let mut data = DataRegistry::new();
        data.register_ability(AbilityData::new(AbilityKind::Move, "Move", 1));
        data.register_agent(AgentTemplate::new("scout").with_ability(MoveConfig::default()));

        let mut sim = Simulation::new(data, SimulationConfig::default().with_seed(12345));
        let player = sim
            .registry_mut()
            .create_controller(AllegianceType::NEUTRAL, "player")
            .unwrap();
        sim.registry_mut()
            .create_agent(player, "scout", Vec2Fixed::from_int(100, 100), Vec2Fixed::RIGHT)
            .unwrap();
        (sim, player)
    }

    fn record(frames: u64) -> Replay {
        let (mut sim, player) = create_test_simulation();
        let mut replay = Replay::new("test_scenario", &sim).unwrap();
        for _ in 0..frames {
            if sim.frame() == 3 {
                let command = Command::move_to(player, Vec2Fixed::from_int(120, 90))
                    .with_selection(Selection::new(vec![0]));
                replay.record_command(sim.frame(), command.clone());
                sim.queue_command(command).unwrap();
            }
            sim.tick();
        }
        replay.finalize(sim.frame(), sim.state_hash());
        replay
    }

    #[test]
    fn test_replay_create() {
        let (sim, _) = create_test_simulation();
        let replay = Replay::new("test_scenario", &sim).unwrap();
        assert_eq!(replay.version, REPLAY_VERSION);
        assert_eq!(replay.scenario_id, "test_scenario");
        assert_eq!(replay.config.seed, 12345);
        assert!(replay.commands.is_empty());
        assert_eq!(replay.duration(), 0);
    }

    #[test]
    fn test_replay_record_commands() {
        let (sim, player) = create_test_simulation();
        let mut replay = Replay::new("test_scenario", &sim).unwrap();

        replay.record_command(0, Command::stop(player));
        replay.record_command(5, Command::move_to(player, Vec2Fixed::from_int(200, 200)));
        replay.record_command(10, Command::stop(player));

        assert_eq!(replay.command_count(), 3);
        assert_eq!(replay.commands_at_frame(0).len(), 1);
        assert_eq!(replay.commands_at_frame(5).len(), 1);
        assert_eq!(replay.commands_at_frame(7).len(), 0);
    }

    #[test]
    fn test_replay_save_load() {
        let replay = record(20);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_replay.bin");
        replay.save(&path).unwrap();

        let loaded = Replay::load(&path).unwrap();
        assert_eq!(loaded, replay);
    }

    #[test]
    fn test_version_mismatch() {
        let mut replay = record(1);
        replay.version = REPLAY_VERSION + 1;
        let bytes = replay.to_bytes().unwrap();
        assert!(matches!(
            Replay::from_bytes(&bytes),
            Err(GameError::ReplayVersionMismatch { found, .. }) if found == REPLAY_VERSION + 1
        ));
    }

    #[test]
    fn test_replay_restore_state() {
        let (sim, _) = create_test_simulation();
        let replay = Replay::new("test_scenario", &sim).unwrap();
        let restored = replay.restore_initial_state().unwrap();
        assert_eq!(restored.registry().agent_count(), 1);
        assert_eq!(restored.state_hash(), sim.state_hash());
    }

    #[test]
    fn test_replay_player_advance() {
        let replay = record(10);
        let mut player = ReplayPlayer::new(replay).unwrap();

        for _ in 0..5 {
            assert!(player.advance());
        }
        assert_eq!(player.current_frame(), 5);
        assert!(!player.is_finished());

        while player.advance() {}
        assert!(player.is_finished());
    }

    #[test]
    fn test_replay_player_seek() {
        let mut player = ReplayPlayer::new(record(100)).unwrap();
        player.seek(50).unwrap();
        assert_eq!(player.current_frame(), 50);
        player.seek(10).unwrap();
        assert_eq!(player.current_frame(), 10);
    }

    #[test]
    fn test_replay_player_pause() {
        let mut player = ReplayPlayer::new(record(100)).unwrap();

        player.paused = true;
        let before = player.current_frame();
        player.advance();
        assert_eq!(player.current_frame(), before);

        player.toggle_pause();
        player.advance();
        assert_eq!(player.current_frame(), before + 1);
    }

    #[test]
    fn test_replay_player_tick_stops_at_the_end() {
        let mut player = ReplayPlayer::new(record(10)).unwrap();
        let mut ticks = 0;
        while player.tick().is_some() {
            ticks += 1;
        }
        assert_eq!(ticks, 10);
        assert!(player.is_finished());
        assert!(player.tick().is_none());
    }

    #[test]
    fn test_replay_player_progress() {
        let mut player = ReplayPlayer::new(record(100)).unwrap();
        assert!(player.progress_percent().abs() < 0.01);

        player.seek(50).unwrap();
        assert!((player.progress_percent() - 50.0).abs() < 0.01);

        player.seek(100).unwrap();
        assert!((player.progress_percent() - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_verify_matches_recording() {
        let replay = record(40);
        let mut player = ReplayPlayer::new(replay).unwrap();
        assert!(player.verify().unwrap());
        player.check().unwrap();
    }

    #[test]
    fn test_tampered_hash_is_desync() {
        let mut replay = record(40);
        replay.final_hash ^= 1;
        let mut player = ReplayPlayer::new(replay).unwrap();
        assert!(!player.verify().unwrap());
        assert!(matches!(
            player.check(),
            Err(GameError::DesyncDetected { frame: 40, .. })
        ));
    }
}
