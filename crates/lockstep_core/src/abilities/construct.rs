//! Building structures.
//!
//! A builder walks to its project, stops once the squared distance falls
//! under the precomputed squared reach, turns to face it, and then applies
//! construction work on every completed charge/windup cycle until the
//! structure is finished or lost. While in range the movement's auto-stop
//! and collision-stop are paused so the builder holds its place.

use tracing::debug;

use super::{is_facing, sibling_move, sibling_turn};
use crate::ability::{
    AbilityBehavior, AbilityCore, AgentParts, AgentTable, CastParts, ChargeCycle, DetailWriter,
    FrameTimer, InitContext, SaveValue, SimContext, VariableContainer,
};
use crate::agent::{Agent, AgentHandle};
use crate::command::{Command, CommandData};
use crate::data::{AbilityKind, AgentTag, AttackConfig, ConstructConfig};
use crate::math::{Fixed, Vec2Fixed};
use crate::simulation::FRAME_RATE;

/// Frames between target searches while idle or walking.
pub const SEARCH_RATE: u32 = FRAME_RATE / 2;

/// Frames between repath checks while chasing a moving project.
pub const REPATH_INTERVAL: u32 = FRAME_RATE * 2;

/// Minimum project displacement (in units) that triggers a repath.
pub const REPATH_DISTANCE: i32 = 2;

/// Constructs structures with a charge/windup cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructAbility {
    construct_amount: Fixed,
    increase_priority: bool,
    build_actions: Vec<String>,
    cycle: ChargeCycle,

    move_index: Option<usize>,
    turn_index: Option<usize>,
    range: Fixed,
    attack_angle: Fixed,
    track_attack_angle: bool,

    current_project: Option<AgentHandle>,
    loaded_project_id: Option<u16>,
    last_project_position: Vec2Fixed,
    is_building: bool,
    is_build_moving: bool,
    is_focused: bool,
    in_range: bool,
    base_priority: i32,
    search_count: i32,
    fast_range_to_target: Fixed,
    current_amount_built: Fixed,
    repath_timer: FrameTimer,
    repath_random: u32,
}

impl ConstructAbility {
    /// Create from template tunables.
    #[must_use]
    pub fn new(config: &ConstructConfig) -> Self {
        let reach = AttackConfig::default();
        Self {
            construct_amount: config.construct_amount,
            increase_priority: config.increase_priority,
            build_actions: config.build_actions.clone(),
            cycle: ChargeCycle::new(config.construct_interval, config.windup),
            move_index: None,
            turn_index: None,
            range: reach.range,
            attack_angle: reach.attack_angle,
            track_attack_angle: reach.track_attack_angle,
            current_project: None,
            loaded_project_id: None,
            last_project_position: Vec2Fixed::ZERO,
            is_building: false,
            is_build_moving: false,
            is_focused: false,
            in_range: false,
            base_priority: 0,
            search_count: 0,
            fast_range_to_target: Fixed::ZERO,
            current_amount_built: Fixed::ZERO,
            repath_timer: FrameTimer::new(REPATH_INTERVAL),
            repath_random: 0,
        }
    }

    /// Agent codes this builder may place.
    #[must_use]
    pub fn build_actions(&self) -> &[String] {
        &self.build_actions
    }

    /// Whether a project is assigned.
    #[must_use]
    pub const fn is_building(&self) -> bool {
        self.is_building
    }

    /// Whether the builder is walking to its project.
    #[must_use]
    pub const fn is_build_moving(&self) -> bool {
        self.is_build_moving
    }

    /// Whether the project was ordered explicitly.
    #[must_use]
    pub const fn is_focused(&self) -> bool {
        self.is_focused
    }

    /// Whether the project was in reach on the last check.
    #[must_use]
    pub const fn in_range(&self) -> bool {
        self.in_range
    }

    /// The structure being built.
    #[must_use]
    pub const fn current_project(&self) -> Option<AgentHandle> {
        self.current_project
    }

    /// Work applied since the last move order.
    #[must_use]
    pub const fn current_amount_built(&self) -> Fixed {
        self.current_amount_built
    }

    /// Squared reach to the current project.
    #[must_use]
    pub const fn fast_range_to_target(&self) -> Fixed {
        self.fast_range_to_target
    }

    /// Frames left until the next target search.
    #[must_use]
    pub const fn search_count(&self) -> i32 {
        self.search_count
    }

    /// Charge state.
    #[must_use]
    pub const fn cycle(&self) -> &ChargeCycle {
        &self.cycle
    }

    /// Assign `project` and start working on it, walking there first when
    /// out of reach. Assigning the builder itself is ignored.
    pub fn set_building(
        &mut self,
        core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        project: &Agent,
    ) {
        let handle = project.handle();
        if handle == parts.handle {
            return;
        }
        *parts.tag = AgentTag::Builder;
        parts.stop_sibling_casts();

        let position = project.body().position;
        self.current_project = Some(handle);
        self.last_project_position = position;
        self.is_building = true;
        core.set_casting(true, parts.check_casting);

        let reach = self.range + project.body().radius + parts.body.radius;
        self.fast_range_to_target = reach * reach;

        if !self.check_range(parts.body.position, position) {
            self.start_build_move(parts, position);
        }
    }

    /// Walk to `destination` as part of a build order.
    pub fn start_build_move(&mut self, parts: &mut AgentParts<'_>, destination: Vec2Fixed) {
        parts.stop_sibling_casts();
        self.is_build_moving = true;
        if let Some(mover) = sibling_move(&mut parts.siblings, self.move_index) {
            mover.start_move(destination);
        }
    }

    /// Drop the project because it is done or another order took over.
    /// Movement is left alone.
    pub fn stop_building(&mut self, core: &mut AbilityCore, parts: &mut CastParts<'_>) {
        self.in_range = false;
        self.is_focused = false;
        self.is_build_moving = false;
        self.release_project(core, parts);
    }

    /// Drop the project because it was lost. A builder still walking keeps
    /// walking to where the project was last seen; one already there stops.
    pub fn abandon_building(&mut self, core: &mut AbilityCore, parts: &mut AgentParts<'_>) {
        self.in_range = false;
        self.is_focused = false;
        if let Some(mover) = sibling_move(&mut parts.siblings, self.move_index) {
            if self.is_build_moving {
                mover.start_move(self.last_project_position);
            } else if self.current_project.is_some() {
                mover.stop_move();
            }
        }
        self.release_project(core, &mut parts.cast_parts());
    }

    fn release_project(&mut self, core: &mut AbilityCore, parts: &mut CastParts<'_>) {
        self.current_project = None;
        self.cycle.cancel();
        parts.body.priority = self.base_priority;
        core.set_casting(false, parts.check_casting);
        self.is_building = false;
    }

    fn check_range(&self, position: Vec2Fixed, project_position: Vec2Fixed) -> bool {
        (project_position - position).fast_magnitude() <= self.fast_range_to_target
    }

    fn count_search(&mut self, amount: i32) {
        self.search_count -= amount;
        if self.search_count <= 0 {
            self.search_count = SEARCH_RATE as i32;
        }
    }

    fn behave_with_no_target(&mut self) {
        if self.is_build_moving {
            self.count_search(8);
        }
    }

    fn behave_with_target(
        &mut self,
        core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        ctx: &mut SimContext<'_>,
    ) {
        let project = self
            .current_project
            .and_then(|handle| ctx.agents.get_live(handle))
            .filter(|agent| {
                agent
                    .ability_of_kind(AbilityKind::Structure)
                    .and_then(|ability| ability.as_structure())
                    .is_some_and(super::StructureAbility::under_construction)
            });
        let Some(project) = project else {
            debug!(global_id = parts.handle.global_id, "Build project lost");
            self.abandon_building(core, parts);
            self.behave_with_no_target();
            return;
        };
        let project_handle = project.handle();
        let project_position = project.body().position;
        let project_moved = project.body().position_changed_buffer;
        self.last_project_position = project_position;

        if !self.cycle.is_winding_up() {
            let offset = project_position - parts.body.position;
            if self.check_range(parts.body.position, project_position) {
                self.is_build_moving = false;
                if !self.in_range {
                    if let Some(mover) = sibling_move(&mut parts.siblings, self.move_index) {
                        mover.stop_move();
                    }
                    self.in_range = true;
                }

                let facing = !self.track_attack_angle
                    || is_facing(parts.body.rotation, offset, self.attack_angle);
                let need_turn = offset != Vec2Fixed::ZERO && !facing;
                if need_turn {
                    match sibling_turn(&mut parts.siblings, self.turn_index) {
                        Some(turn) => turn.start_turn_direction(offset),
                        None => parts.body.rotation = offset.normalize(),
                    }
                } else {
                    self.cycle.try_begin();
                }
            } else {
                self.chase(parts, project_position, project_moved);
                if self.is_build_moving || !self.is_focused {
                    self.count_search(1);
                }
                self.in_range = false;
            }
        }

        if self.cycle.advance(ctx.delta) {
            self.build(core, parts, ctx, project_handle);
        }

        if self.in_range {
            if let Some(mover) = sibling_move(&mut parts.siblings, self.move_index) {
                mover.pause_auto_stop();
                mover.pause_collision_stop();
            }
        }
    }

    fn chase(&mut self, parts: &mut AgentParts<'_>, project_position: Vec2Fixed, moved: bool) {
        let Some(mover) = sibling_move(&mut parts.siblings, self.move_index) else {
            return;
        };
        mover.pause_auto_stop();
        mover.pause_collision_stop();
        if !mover.is_moving() {
            mover.start_move(project_position);
            parts.body.priority = self.base_priority;
        } else if self.in_range {
            mover.set_destination(project_position);
        } else if self.repath_timer.advance_frame() {
            let threshold = Fixed::from_num(REPATH_DISTANCE);
            if moved && project_position.fast_distance(mover.destination()) >= threshold * threshold
            {
                mover.start_move(project_position);
                // Keep builders from repathing on the same frame.
                self.repath_timer.advance_frames(self.repath_random);
            }
        }
    }

    fn build(
        &mut self,
        core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        ctx: &mut SimContext<'_>,
        project: AgentHandle,
    ) {
        if let Some(mover) = sibling_move(&mut parts.siblings, self.move_index) {
            mover.stop_move();
        }
        parts.body.priority = if self.increase_priority {
            self.base_priority + 1
        } else {
            self.base_priority
        };

        let amount = self.construct_amount;
        let finished = ctx
            .agents
            .get_live_mut(project)
            .and_then(|agent| agent.ability_of_kind_mut(AbilityKind::Structure))
            .and_then(|ability| ability.as_structure_mut())
            .map_or(true, |structure| {
                structure.construct(amount);
                !structure.under_construction()
            });
        self.current_amount_built += amount;

        if finished {
            debug!(
                global_id = parts.handle.global_id,
                project = project.global_id,
                "Construction finished"
            );
            self.stop_building(core, &mut parts.cast_parts());
        }
    }
}

impl AbilityBehavior for ConstructAbility {
    fn on_setup(&mut self, _core: &mut AbilityCore, parts: &mut AgentParts<'_>) {
        self.move_index = parts.siblings.find(AbilityKind::Move);
        self.turn_index = parts.siblings.find(AbilityKind::Turn);
        if let Some(attack) = parts
            .siblings
            .find(AbilityKind::Attack)
            .and_then(|index| parts.siblings.get(index))
            .and_then(|ability| ability.as_attack())
        {
            self.range = attack.range();
            self.attack_angle = attack.attack_angle();
            self.track_attack_angle = attack.track_attack_angle();
        }
        self.base_priority = parts.body.priority;

        if *parts.tag == AgentTag::None {
            *parts.tag = AgentTag::Builder;
        }
    }

    fn on_initialize(
        &mut self,
        _core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        ctx: &mut InitContext<'_>,
    ) {
        self.base_priority = parts.body.priority;
        self.search_count = ctx.rng.next_int(SEARCH_RATE) as i32 + 1;
        self.cycle.reset();
        self.current_project = None;
        self.loaded_project_id = None;
        self.last_project_position = parts.body.position;
        self.is_building = false;
        self.is_build_moving = false;
        self.is_focused = false;
        self.in_range = false;
        self.fast_range_to_target = Fixed::ZERO;
        self.current_amount_built = Fixed::ZERO;
        self.repath_timer.reset(REPATH_INTERVAL);
        self.repath_random = ctx.rng.next_int(REPATH_INTERVAL);
    }

    fn on_simulate(
        &mut self,
        core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        ctx: &mut SimContext<'_>,
    ) {
        if *parts.tag != AgentTag::Builder {
            return;
        }
        self.cycle.charge(ctx.delta);

        if self.is_building {
            self.behave_with_target(core, parts, ctx);
        } else {
            self.behave_with_no_target();
        }

        if self.is_build_moving {
            if let Some(mover) = sibling_move(&mut parts.siblings, self.move_index) {
                mover.pause_auto_stop();
            }
        }
    }

    fn on_execute(
        &mut self,
        core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        command: &Command,
        ctx: &mut SimContext<'_>,
    ) {
        let CommandData::Target(global_id) = command.payload else {
            return;
        };
        self.is_focused = true;
        self.is_build_moving = false;

        let Some(project) = ctx.agents.get(global_id) else {
            debug!(global_id, "Ignoring build order on inactive agent");
            return;
        };
        let buildable = project
            .ability_of_kind(AbilityKind::Structure)
            .and_then(|ability| ability.as_structure())
            .is_some_and(super::StructureAbility::under_construction);
        if buildable {
            self.set_building(core, parts, project);
        }
    }

    fn on_stop_cast(&mut self, core: &mut AbilityCore, parts: &mut CastParts<'_>) {
        if self.is_building {
            self.stop_building(core, parts);
        }
    }

    fn on_move_commanded(&mut self, core: &mut AbilityCore, parts: &mut AgentParts<'_>) {
        self.current_amount_built = Fixed::ZERO;
        if !self.is_build_moving && self.is_building {
            self.abandon_building(core, parts);
            self.behave_with_no_target();
        }
    }

    fn on_deactivate(&mut self, core: &mut AbilityCore, parts: &mut AgentParts<'_>) {
        self.stop_building(core, &mut parts.cast_parts());
    }

    fn save_details(&self, _core: &AbilityCore, writer: &mut DetailWriter) {
        writer.write_bool("Building", self.is_building);
        writer.write_fixed("AmountBuilt", self.current_amount_built);
        writer.write_bool("BuildMoving", self.is_build_moving);
        if let Some(project) = self.current_project {
            writer.write_int("CurrentProjectId", i64::from(project.global_id));
        }
        writer.write_vec2("LastProjectPosition", self.last_project_position);
        writer.write_bool("Focused", self.is_focused);
        writer.write_bool("InRange", self.in_range);
        writer.write_int("SearchCount", i64::from(self.search_count));
        writer.write_fixed("FastRangeToTarget", self.fast_range_to_target);
        writer.write_int("BasePriority", i64::from(self.base_priority));
        writer.write_int("RepathElapsed", i64::from(self.repath_timer.elapsed()));
        writer.write_int("RepathRandom", i64::from(self.repath_random));
        self.cycle.save(writer);
    }

    fn load_property(&mut self, _core: &mut AbilityCore, name: &str, value: &SaveValue) -> bool {
        match name {
            "Building" => value.as_bool().map(|v| self.is_building = v).is_some(),
            "AmountBuilt" => value
                .as_fixed()
                .map(|v| self.current_amount_built = v)
                .is_some(),
            "BuildMoving" => value.as_bool().map(|v| self.is_build_moving = v).is_some(),
            "CurrentProjectId" => value
                .as_int()
                .and_then(|v| u16::try_from(v).ok())
                .map(|v| self.loaded_project_id = Some(v))
                .is_some(),
            "LastProjectPosition" => value
                .as_vec2()
                .map(|v| self.last_project_position = v)
                .is_some(),
            "Focused" => value.as_bool().map(|v| self.is_focused = v).is_some(),
            "InRange" => value.as_bool().map(|v| self.in_range = v).is_some(),
            "SearchCount" => value
                .as_int()
                .and_then(|v| i32::try_from(v).ok())
                .map(|v| self.search_count = v)
                .is_some(),
            "FastRangeToTarget" => value
                .as_fixed()
                .map(|v| self.fast_range_to_target = v)
                .is_some(),
            "BasePriority" => value
                .as_int()
                .and_then(|v| i32::try_from(v).ok())
                .map(|v| self.base_priority = v)
                .is_some(),
            "RepathElapsed" => value
                .as_int()
                .and_then(|v| u32::try_from(v).ok())
                .map(|v| self.repath_timer.set_elapsed(v))
                .is_some(),
            "RepathRandom" => value
                .as_int()
                .and_then(|v| u32::try_from(v).ok())
                .map(|v| self.repath_random = v)
                .is_some(),
            _ => self.cycle.load_property(name, value),
        }
    }

    fn on_loaded(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        agents: &AgentTable<'_>,
    ) {
        self.current_project = self
            .loaded_project_id
            .take()
            .and_then(|global_id| agents.get(global_id))
            .filter(|agent| agent.ability_of_kind(AbilityKind::Structure).is_some())
            .map(Agent::handle);
    }

    fn register_variables(&self, variables: &mut VariableContainer) {
        variables.register("Building", 0);
        variables.register("AmountBuilt", 0);
    }

    fn publish_variables(&self, variables: &mut VariableContainer) {
        variables.set("Building", i64::from(self.is_building));
        variables.set("AmountBuilt", self.current_amount_built.to_bits());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_attack_sibling() {
        let construct = ConstructAbility::new(&ConstructConfig::default());
        let reach = AttackConfig::default();
        assert_eq!(construct.range, reach.range);
        assert_eq!(construct.attack_angle, reach.attack_angle);
        assert!(!construct.is_building());
        assert!(construct.current_project().is_none());
    }

    #[test]
    fn test_search_counter_wraps_to_rate() {
        let mut construct = ConstructAbility::new(&ConstructConfig::default());
        construct.search_count = 3;
        construct.is_build_moving = true;
        construct.behave_with_no_target();
        assert_eq!(construct.search_count(), SEARCH_RATE as i32);
    }
}
