//! Producing agents from a build queue.
//!
//! Each completed charge/windup cycle adds `spawn_increment` to the build
//! progress. Once progress exceeds `max_spawn_progress` the agent at the
//! head of the queue is emitted and the threshold is subtracted, so
//! fractional overflow carries into the next unit, even across an empty
//! queue. Spawns are buffered and created by the
//! registry at the end of the tick.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ability::{
    AbilityBehavior, AbilityCore, AgentParts, ChargeCycle, DetailWriter, InitContext, SaveValue,
    SimContext, SpawnRequest, VariableContainer,
};
use crate::command::{Command, CommandData};
use crate::data::{DataRegistry, SpawnerConfig};
use crate::math::{Fixed, Vec3Fixed};

/// Rally flag display state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlagState {
    /// No rally point chosen.
    #[default]
    SetFlag,
    /// The player is placing the flag.
    SettingFlag,
    /// A rally point is set.
    FlagSet,
}

impl FlagState {
    /// Name used in save records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SetFlag => "SetFlag",
            Self::SettingFlag => "SettingFlag",
            Self::FlagSet => "FlagSet",
        }
    }

    /// Parse a saved name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SetFlag" => Some(Self::SetFlag),
            "SettingFlag" => Some(Self::SettingFlag),
            "FlagSet" => Some(Self::FlagSet),
            _ => None,
        }
    }
}

/// Queues agent codes and spawns them in front of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnerAbility {
    spawn_increment: Fixed,
    max_spawn_progress: Fixed,
    spawn_offset: Fixed,
    spawn_actions: Vec<String>,
    cycle: ChargeCycle,
    build_queue: VecDeque<String>,
    progress: Fixed,
    spawn_point: Vec3Fixed,
    rally_point: Vec3Fixed,
    flag_state: FlagState,
    is_focused: bool,
}

impl SpawnerAbility {
    /// Create from template tunables.
    #[must_use]
    pub fn new(config: &SpawnerConfig) -> Self {
        Self {
            spawn_increment: config.spawn_increment,
            max_spawn_progress: config.max_spawn_progress,
            spawn_offset: config.spawn_offset,
            spawn_actions: config.spawn_actions.clone(),
            cycle: ChargeCycle::new(config.spawn_interval, config.windup),
            build_queue: VecDeque::new(),
            progress: Fixed::ZERO,
            spawn_point: Vec3Fixed::ZERO,
            rally_point: Vec3Fixed::ZERO,
            flag_state: FlagState::SetFlag,
            is_focused: false,
        }
    }

    /// Codes waiting to be produced, head first.
    pub fn build_queue(&self) -> impl Iterator<Item = &str> {
        self.build_queue.iter().map(String::as_str)
    }

    /// Number of queued codes.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.build_queue.len()
    }

    /// Codes this spawner accepts. Empty means any registered code.
    #[must_use]
    pub fn spawn_actions(&self) -> &[String] {
        &self.spawn_actions
    }

    /// Accumulated progress towards the next unit.
    #[must_use]
    pub const fn progress(&self) -> Fixed {
        self.progress
    }

    /// Progress as a fraction of one unit.
    #[must_use]
    pub fn build_percentage(&self) -> Fixed {
        if self.max_spawn_progress == Fixed::ZERO {
            return Fixed::ZERO;
        }
        self.progress / self.max_spawn_progress
    }

    /// Where new agents appear.
    #[must_use]
    pub const fn spawn_point(&self) -> Vec3Fixed {
        self.spawn_point
    }

    /// Where new agents walk to.
    #[must_use]
    pub const fn rally_point(&self) -> Vec3Fixed {
        self.rally_point
    }

    /// Rally flag state.
    #[must_use]
    pub const fn flag_state(&self) -> FlagState {
        self.flag_state
    }

    /// Change the rally flag state.
    pub fn set_flag_state(&mut self, state: FlagState) {
        self.flag_state = state;
    }

    /// Whether the spawner received an explicit order since activation.
    #[must_use]
    pub const fn is_focused(&self) -> bool {
        self.is_focused
    }

    /// Charge state.
    #[must_use]
    pub const fn cycle(&self) -> &ChargeCycle {
        &self.cycle
    }

    /// Move the rally point.
    pub fn set_rally_point(&mut self, position: Vec3Fixed) {
        self.rally_point = position;
        self.flag_state = FlagState::FlagSet;
    }

    /// Queue `code` if the data registry knows it and this spawner lists it.
    pub fn enqueue(&mut self, code: &str, data: &DataRegistry) -> bool {
        let allowed = self.spawn_actions.is_empty() || self.spawn_actions.iter().any(|c| c == code);
        if !allowed || !data.is_valid_agent_code(code) {
            debug!(code, "Rejected spawn order");
            return false;
        }
        self.build_queue.push_back(code.to_string());
        true
    }

    fn set_spawn_point(&mut self, parts: &AgentParts<'_>) {
        let forward = parts.body.forward();
        let point = parts.body.position + forward.scale(parts.body.radius + self.spawn_offset);
        self.spawn_point = Vec3Fixed::from_2d(point, Fixed::ZERO);
        self.rally_point = self.spawn_point;
    }

    fn process_build_queue(&mut self, parts: &AgentParts<'_>, ctx: &mut SimContext<'_>) {
        self.progress += self.spawn_increment;
        while self.progress > self.max_spawn_progress {
            let Some(code) = self.build_queue.pop_front() else {
                break;
            };
            self.progress -= self.max_spawn_progress;

            let Some(controller) = parts.controller else {
                debug!(global_id = parts.handle.global_id, code = %code, "Spawner has no controller");
                continue;
            };
            let rally_point = (self.rally_point != self.spawn_point).then(|| self.rally_point.to_2d());
            ctx.pending.spawn(SpawnRequest {
                controller,
                code,
                position: self.spawn_point.to_2d(),
                rotation: parts.body.forward(),
                rally_point,
            });
            if self.max_spawn_progress == Fixed::ZERO {
                break;
            }
        }
    }
}

impl AbilityBehavior for SpawnerAbility {
    fn on_initialize(
        &mut self,
        _core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        _ctx: &mut InitContext<'_>,
    ) {
        self.cycle.reset();
        self.build_queue.clear();
        self.progress = Fixed::ZERO;
        self.flag_state = FlagState::SetFlag;
        self.is_focused = false;
        self.set_spawn_point(parts);
    }

    fn on_simulate(
        &mut self,
        _core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        ctx: &mut SimContext<'_>,
    ) {
        self.cycle.charge(ctx.delta);
        if self.build_queue.is_empty() {
            self.cycle.cancel();
            return;
        }
        self.cycle.try_begin();
        if self.cycle.advance(ctx.delta) {
            self.process_build_queue(parts, ctx);
        }
    }

    fn on_execute(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        command: &Command,
        ctx: &mut SimContext<'_>,
    ) {
        self.is_focused = true;
        match &command.payload {
            CommandData::Position(position) => {
                self.set_rally_point(Vec3Fixed::from_2d(*position, Fixed::ZERO));
            }
            CommandData::Text(code) => {
                self.enqueue(code, ctx.data);
            }
            _ => {}
        }
    }

    fn on_deactivate(&mut self, _core: &mut AbilityCore, _parts: &mut AgentParts<'_>) {
        self.build_queue.clear();
        self.cycle.cancel();
    }

    fn save_details(&self, _core: &AbilityCore, writer: &mut DetailWriter) {
        writer.write_vec3("SpawnPoint", self.spawn_point);
        writer.write_vec3("RallyPoint", self.rally_point);
        writer.write_text("FlagState", self.flag_state.as_str());
        writer.write_fixed("BuildProgress", self.progress);
        let queue: Vec<&str> = self.build_queue().collect();
        writer.write_text_array("BuildQueue", &queue);
        writer.write_bool("Focused", self.is_focused);
        self.cycle.save(writer);
    }

    fn load_property(&mut self, _core: &mut AbilityCore, name: &str, value: &SaveValue) -> bool {
        match name {
            "SpawnPoint" => value.as_vec3().map(|v| self.spawn_point = v).is_some(),
            "RallyPoint" => value.as_vec3().map(|v| self.rally_point = v).is_some(),
            "FlagState" => value
                .as_text()
                .and_then(FlagState::from_name)
                .map(|v| self.flag_state = v)
                .is_some(),
            "BuildProgress" => value.as_fixed().map(|v| self.progress = v).is_some(),
            "BuildQueue" => value
                .as_text_array()
                .map(|v| self.build_queue = v.iter().cloned().collect())
                .is_some(),
            "Focused" => value.as_bool().map(|v| self.is_focused = v).is_some(),
            _ => self.cycle.load_property(name, value),
        }
    }

    fn register_variables(&self, variables: &mut VariableContainer) {
        variables.register("BuildProgress", 0);
        variables.register("QueueLength", 0);
    }

    fn publish_variables(&self, variables: &mut VariableContainer) {
        variables.set("BuildProgress", self.progress.to_bits());
        variables.set("QueueLength", self.build_queue.len() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AgentTemplate, MoveConfig};

    fn data() -> DataRegistry {
        let mut data = DataRegistry::new();
        data.register_agent(AgentTemplate::new("worker").with_ability(MoveConfig::default()));
        data.register_agent(AgentTemplate::new("tank"));
        data
    }

    #[test]
    fn test_enqueue_validates_code_and_actions() {
        let data = data();
        let mut spawner = SpawnerAbility::new(&SpawnerConfig {
            spawn_actions: vec!["worker".to_string()],
            ..SpawnerConfig::default()
        });
        assert!(spawner.enqueue("worker", &data));
        assert!(!spawner.enqueue("tank", &data));
        assert!(!spawner.enqueue("ghost", &data));
        assert_eq!(spawner.build_queue().collect::<Vec<_>>(), vec!["worker"]);
    }

    #[test]
    fn test_empty_actions_accept_any_registered_code() {
        let data = data();
        let mut spawner = SpawnerAbility::new(&SpawnerConfig::default());
        assert!(spawner.enqueue("tank", &data));
        assert!(!spawner.enqueue("ghost", &data));
    }

    #[test]
    fn test_flag_state_names() {
        for state in [FlagState::SetFlag, FlagState::SettingFlag, FlagState::FlagSet] {
            assert_eq!(FlagState::from_name(state.as_str()), Some(state));
        }
        assert_eq!(FlagState::from_name("Bogus"), None);
    }

    #[test]
    fn test_rally_point_sets_flag() {
        let mut spawner = SpawnerAbility::new(&SpawnerConfig::default());
        spawner.set_rally_point(Vec3Fixed::from_2d(
            crate::math::Vec2Fixed::from_int(4, 4),
            Fixed::ZERO,
        ));
        assert_eq!(spawner.flag_state(), FlagState::FlagSet);
    }
}
