//! Target engagement: chase into range, face, wind up, hit.

use tracing::debug;

use super::{is_facing, sibling_move, sibling_turn};
use crate::ability::{
    AbilityBehavior, AbilityCore, AgentParts, AgentTable, CastParts, ChargeCycle, DetailWriter,
    InitContext, SaveValue, SimContext, VariableContainer,
};
use crate::agent::AgentHandle;
use crate::command::{Command, CommandData};
use crate::data::{AbilityKind, AttackConfig};
use crate::math::Fixed;

/// Attacks one target agent with a charge/windup cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackAbility {
    range: Fixed,
    attack_angle: Fixed,
    track_attack_angle: bool,
    damage: Fixed,
    cycle: ChargeCycle,
    target: Option<AgentHandle>,
    loaded_target: Option<u16>,
    in_range: bool,
    can_attack: bool,
    move_index: Option<usize>,
    turn_index: Option<usize>,
}

impl AttackAbility {
    /// Create from template tunables.
    #[must_use]
    pub fn new(config: &AttackConfig) -> Self {
        Self {
            range: config.range,
            attack_angle: config.attack_angle,
            track_attack_angle: config.track_attack_angle,
            damage: config.damage,
            cycle: ChargeCycle::new(config.interval, config.windup),
            target: None,
            loaded_target: None,
            in_range: false,
            can_attack: true,
            move_index: None,
            turn_index: None,
        }
    }

    /// Reach beyond both body radii.
    #[must_use]
    pub const fn range(&self) -> Fixed {
        self.range
    }

    /// Maximum sideways offset of the target direction that counts as facing.
    #[must_use]
    pub const fn attack_angle(&self) -> Fixed {
        self.attack_angle
    }

    /// Whether facing is required before firing.
    #[must_use]
    pub const fn track_attack_angle(&self) -> bool {
        self.track_attack_angle
    }

    /// Current target, if engaged.
    #[must_use]
    pub const fn target(&self) -> Option<AgentHandle> {
        self.target
    }

    /// Whether the target was in range on the last check.
    #[must_use]
    pub const fn in_range(&self) -> bool {
        self.in_range
    }

    /// Charge state.
    #[must_use]
    pub const fn cycle(&self) -> &ChargeCycle {
        &self.cycle
    }

    /// Whether hits deal damage.
    #[must_use]
    pub const fn can_attack(&self) -> bool {
        self.can_attack
    }

    /// Enable or disable dealing damage. The cycle keeps running.
    pub fn set_can_attack(&mut self, value: bool) {
        self.can_attack = value;
    }

    fn engage(&mut self, core: &mut AbilityCore, parts: &mut AgentParts<'_>, target: AgentHandle) {
        parts.stop_sibling_casts();
        core.set_casting(true, parts.check_casting);
        self.target = Some(target);
        self.in_range = false;
        self.cycle.cancel();
    }

    fn disengage(&mut self, core: &mut AbilityCore, parts: &mut CastParts<'_>) {
        core.set_casting(false, parts.check_casting);
        self.target = None;
        self.loaded_target = None;
        self.in_range = false;
        self.cycle.cancel();
    }
}

impl AbilityBehavior for AttackAbility {
    fn on_setup(&mut self, _core: &mut AbilityCore, parts: &mut AgentParts<'_>) {
        self.move_index = parts.siblings.find(AbilityKind::Move);
        self.turn_index = parts.siblings.find(AbilityKind::Turn);
    }

    fn on_initialize(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        _ctx: &mut InitContext<'_>,
    ) {
        self.cycle.reset();
        self.target = None;
        self.loaded_target = None;
        self.in_range = false;
        self.can_attack = true;
    }

    fn on_simulate(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        ctx: &mut SimContext<'_>,
    ) {
        self.cycle.charge(ctx.delta);
    }

    fn on_cast(
        &mut self,
        core: &mut AbilityCore,
        parts: &mut AgentParts<'_>,
        ctx: &mut SimContext<'_>,
    ) {
        let Some(handle) = self.target else {
            self.disengage(core, &mut parts.cast_parts());
            return;
        };
        let Some(target) = ctx.agents.get_live(handle) else {
            debug!(global_id = parts.handle.global_id, "Attack target lost");
            self.disengage(core, &mut parts.cast_parts());
            if let Some(mover) = sibling_move(&mut parts.siblings, self.move_index) {
                mover.stop_move();
            }
            return;
        };
        let target_position = target.body().position;
        let target_radius = target.body().radius;

        if !self.cycle.is_winding_up() {
            let offset = target_position - parts.body.position;
            let reach = self.range + target_radius + parts.body.radius;
            if offset.fast_magnitude() <= reach * reach {
                if !self.in_range {
                    if let Some(mover) = sibling_move(&mut parts.siblings, self.move_index) {
                        mover.stop_move();
                    }
                    self.in_range = true;
                }
                let facing = !self.track_attack_angle
                    || is_facing(parts.body.rotation, offset, self.attack_angle);
                if facing {
                    self.cycle.try_begin();
                } else if let Some(turn) = sibling_turn(&mut parts.siblings, self.turn_index) {
                    turn.start_turn_direction(offset);
                } else {
                    parts.body.rotation = offset.normalize();
                }
            } else {
                self.in_range = false;
                if let Some(mover) = sibling_move(&mut parts.siblings, self.move_index) {
                    mover.pause_auto_stop();
                    if mover.is_moving() {
                        mover.set_destination(target_position);
                    } else {
                        mover.start_move(target_position);
                    }
                }
            }
        }

        if self.in_range {
            if let Some(mover) = sibling_move(&mut parts.siblings, self.move_index) {
                mover.pause_auto_stop();
                mover.pause_collision_stop();
            }
        }

        if self.cycle.advance(ctx.delta) && self.can_attack {
            let damage = self.damage;
            let pending = &mut *ctx.pending;
            if let Some(health) = ctx
                .agents
                .get_live_mut(handle)
                .and_then(|agent| agent.ability_of_kind_mut(AbilityKind::Health))
                .and_then(|ability| ability.as_health_mut())
            {
                if health.apply_damage(damage, handle, pending) {
                    debug!(
                        attacker = parts.handle.global_id,
                        target = handle.global_id,
                        "Target destroyed"
                    );
                    self.disengage(core, &mut parts.cast_parts());
                }
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
        if global_id == parts.handle.global_id {
            return;
        }
        let Some(target) = ctx.agents.get(global_id) else {
            debug!(global_id, "Ignoring attack on inactive agent");
            return;
        };
        if target.ability_of_kind(AbilityKind::Health).is_none() {
            return;
        }
        let handle = target.handle();
        self.engage(core, parts, handle);
    }

    fn on_stop_cast(&mut self, core: &mut AbilityCore, parts: &mut CastParts<'_>) {
        if core.is_casting() {
            self.disengage(core, parts);
        }
    }

    fn on_deactivate(&mut self, _core: &mut AbilityCore, _parts: &mut AgentParts<'_>) {
        self.target = None;
        self.in_range = false;
        self.cycle.cancel();
    }

    fn save_details(&self, _core: &AbilityCore, writer: &mut DetailWriter) {
        self.cycle.save(writer);
        if let Some(target) = self.target {
            writer.write_int("TargetId", i64::from(target.global_id));
        }
        writer.write_bool("InRange", self.in_range);
        writer.write_bool("CanAttack", self.can_attack);
    }

    fn load_property(&mut self, _core: &mut AbilityCore, name: &str, value: &SaveValue) -> bool {
        match name {
            "TargetId" => value
                .as_int()
                .and_then(|v| u16::try_from(v).ok())
                .map(|v| self.loaded_target = Some(v))
                .is_some(),
            "InRange" => value.as_bool().map(|v| self.in_range = v).is_some(),
            "CanAttack" => value.as_bool().map(|v| self.can_attack = v).is_some(),
            _ => self.cycle.load_property(name, value),
        }
    }

    fn on_loaded(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        agents: &AgentTable<'_>,
    ) {
        self.target = self
            .loaded_target
            .take()
            .and_then(|global_id| agents.get(global_id))
            .map(crate::agent::Agent::handle);
    }

    fn register_variables(&self, variables: &mut VariableContainer) {
        variables.register("Charge", 0);
        variables.register("Target", -1);
    }

    fn publish_variables(&self, variables: &mut VariableContainer) {
        variables.set("Charge", self.cycle.charge_value().to_bits());
        variables.set(
            "Target",
            self.target.map_or(-1, |t| i64::from(t.global_id)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::fixed;

    #[test]
    fn test_config_accessors() {
        let attack = AttackAbility::new(&AttackConfig {
            range: fixed(3),
            ..AttackConfig::default()
        });
        assert_eq!(attack.range(), fixed(3));
        assert!(attack.track_attack_angle());
        assert!(attack.can_attack());
        assert!(attack.target().is_none());
    }
}
