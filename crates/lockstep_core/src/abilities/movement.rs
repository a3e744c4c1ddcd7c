//! Straight-line movement towards a destination.

use crate::ability::{
    AbilityBehavior, AbilityCore, AgentParts, DetailWriter, InitContext, SaveValue, SimContext,
    VariableContainer,
};
use crate::command::{Command, CommandData};
use crate::data::{AbilityKind, MoveConfig};
use crate::math::{Fixed, Vec2Fixed};

/// Moves the body at a fixed speed and stops on arrival.
///
/// Moving does not occupy the action slot: casting abilities steer the body
/// through this ability (chasing a target, walking to a build site) while
/// keeping the slot for themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveAbility {
    speed: Fixed,
    destination: Vec2Fixed,
    is_moving: bool,
    auto_stop_paused: bool,
    collision_stop_paused: bool,
    turn_index: Option<usize>,
}

impl MoveAbility {
    /// Create from template tunables.
    #[must_use]
    pub fn new(config: &MoveConfig) -> Self {
        Self {
            speed: config.speed,
            destination: Vec2Fixed::ZERO,
            is_moving: false,
            auto_stop_paused: false,
            collision_stop_paused: false,
            turn_index: None,
        }
    }

    /// Distance per second.
    #[must_use]
    pub const fn speed(&self) -> Fixed {
        self.speed
    }

    /// Current destination.
    #[must_use]
    pub const fn destination(&self) -> Vec2Fixed {
        self.destination
    }

    /// Whether a move is in progress.
    #[must_use]
    pub const fn is_moving(&self) -> bool {
        self.is_moving
    }

    /// Whether arrival-within-radius is suppressed this tick.
    #[must_use]
    pub const fn auto_stop_paused(&self) -> bool {
        self.auto_stop_paused
    }

    /// Whether stopping on contact is suppressed this tick.
    #[must_use]
    pub const fn collision_stop_paused(&self) -> bool {
        self.collision_stop_paused
    }

    /// Start moving to `destination`.
    pub fn start_move(&mut self, destination: Vec2Fixed) {
        self.destination = destination;
        self.is_moving = true;
    }

    /// Retarget an ongoing move without restarting it.
    pub fn set_destination(&mut self, destination: Vec2Fixed) {
        self.destination = destination;
    }

    /// Stop where the body stands.
    pub fn stop_move(&mut self) {
        self.is_moving = false;
    }

    /// Keep moving even when the destination is within the body radius.
    /// Lasts until the end of the current tick.
    pub fn pause_auto_stop(&mut self) {
        self.auto_stop_paused = true;
    }

    /// Ignore contacts for the current tick.
    pub fn pause_collision_stop(&mut self) {
        self.collision_stop_paused = true;
    }

    /// Contact with another body. Stops the move unless paused or the other
    /// body has lower priority.
    pub fn handle_collision(&mut self, own_priority: i32, other_priority: i32) {
        if self.is_moving && !self.collision_stop_paused && other_priority >= own_priority {
            self.stop_move();
        }
    }
}

impl AbilityBehavior for MoveAbility {
    fn on_setup(&mut self, _core: &mut AbilityCore, parts: &mut AgentParts<'_>) {
        self.turn_index = parts.siblings.find(AbilityKind::Turn);
    }

    fn on_initialize(
        &mut self,
        _core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        _ctx: &mut InitContext<'_>,
    ) {
        self.destination = parts.body.position;
        self.is_moving = false;
        self.auto_stop_paused = false;
        self.collision_stop_paused = false;
    }

    fn on_simulate(
        &mut self,
        _core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        ctx: &mut SimContext<'_>,
    ) {
        if !self.is_moving {
            return;
        }

        let step = self.speed * ctx.delta;
        let offset = self.destination - parts.body.position;
        let distance_sq = offset.fast_magnitude();

        if distance_sq <= step * step {
            parts.body.set_position(self.destination);
            self.stop_move();
            return;
        }
        if !self.auto_stop_paused && distance_sq <= parts.body.radius * parts.body.radius {
            self.stop_move();
            return;
        }

        let direction = offset.normalize();
        parts
            .body
            .set_position(parts.body.position + direction.scale(step));

        let turn = self
            .turn_index
            .and_then(|index| parts.siblings.get_mut(index))
            .and_then(|ability| ability.as_turn_mut());
        match turn {
            Some(turn) => turn.start_turn_direction(direction),
            None => parts.body.rotation = direction,
        }
    }

    fn on_late_simulate(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        _ctx: &mut SimContext<'_>,
    ) {
        self.auto_stop_paused = false;
        self.collision_stop_paused = false;
    }

    fn on_execute(
        &mut self,
        _core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        command: &Command,
        _ctx: &mut SimContext<'_>,
    ) {
        if let CommandData::Position(destination) = command.payload {
            parts.stop_sibling_casts();
            self.start_move(destination);
        }
    }

    fn on_deactivate(&mut self, _core: &mut AbilityCore, _parts: &mut AgentParts<'_>) {
        self.stop_move();
    }

    fn save_details(&self, _core: &AbilityCore, writer: &mut DetailWriter) {
        writer.write_vec2("Destination", self.destination);
        writer.write_bool("IsMoving", self.is_moving);
        writer.write_bool("AutoStopPaused", self.auto_stop_paused);
        writer.write_bool("CollisionStopPaused", self.collision_stop_paused);
    }

    fn load_property(&mut self, _core: &mut AbilityCore, name: &str, value: &SaveValue) -> bool {
        match name {
            "Destination" => value.as_vec2().map(|v| self.destination = v).is_some(),
            "IsMoving" => value.as_bool().map(|v| self.is_moving = v).is_some(),
            "AutoStopPaused" => value.as_bool().map(|v| self.auto_stop_paused = v).is_some(),
            "CollisionStopPaused" => value
                .as_bool()
                .map(|v| self.collision_stop_paused = v)
                .is_some(),
            _ => false,
        }
    }

    fn register_variables(&self, variables: &mut VariableContainer) {
        variables.register("IsMoving", 0);
    }

    fn publish_variables(&self, variables: &mut VariableContainer) {
        variables.set("IsMoving", i64::from(self.is_moving));
    }
}
