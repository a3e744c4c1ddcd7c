//! Simulated agents.
//!
//! An [`Agent`] owns its [`Body`] and an ordered list of [`Ability`] values.
//! Abilities never hold references to each other or to the agent; each phase
//! call lends the running ability an [`AgentParts`] view assembled from the
//! agent's disjoint fields, with the other abilities reachable as
//! [`Siblings`](crate::ability::Siblings).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ability::{
    Ability, AgentParts, AgentTable, CastParts, DetailReader, DetailWriter, InitContext,
    SaveToken, Siblings, SimContext,
};
use crate::body::Body;
use crate::command::{Command, CommandData};
use crate::controller::ControllerId;
use crate::data::{AbilityKind, AgentTag, AgentTemplate, DataRegistry};
use crate::error::Result;
use crate::math::Vec2Fixed;

/// Type index of agents that were never registered in a pooling bucket.
pub const UNREGISTERED_TYPE_INDEX: u16 = u16::MAX;

/// Stable reference to one activation of an agent.
///
/// Global IDs are recycled; the spawn version tells activations apart, so a
/// handle kept past its agent's death never resolves to the agent that
/// reused the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentHandle {
    /// Slot in the global table.
    pub global_id: u16,
    /// Activation counter value at binding time.
    pub spawn_version: u32,
}

/// Presentation state refreshed by the visualize phases.
///
/// Lives outside the deterministic boundary and never feeds a hash.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VisualState {
    /// Body position in render units.
    pub position: [f32; 2],
    /// Facing in render units.
    pub facing: [f32; 2],
    /// Selection highlight.
    pub selected: bool,
    /// Whether some ability holds the action slot.
    pub busy: bool,
}

/// A simulated entity.
#[derive(Debug, Clone)]
pub struct Agent {
    global_id: u16,
    local_id: u16,
    controller: Option<ControllerId>,
    type_index: u16,
    code: String,
    code_index: usize,
    tag: AgentTag,
    setup_tag: AgentTag,
    body: Body,
    abilities: Vec<Ability>,
    is_active: bool,
    is_selected: bool,
    check_casting: bool,
    spawn_version: u32,
    visual: VisualState,
}

impl Agent {
    /// Build an agent from its template and run every ability's setup.
    ///
    /// # Errors
    ///
    /// Fails when an active ability kind has no registered descriptor.
    pub fn setup(template: &AgentTemplate, code_index: usize, data: &DataRegistry) -> Result<Self> {
        let abilities = template
            .abilities
            .iter()
            .enumerate()
            .map(|(id, config)| Ability::new(id, config, data))
            .collect::<Result<Vec<_>>>()?;

        let mut agent = Self {
            global_id: 0,
            local_id: 0,
            controller: None,
            type_index: UNREGISTERED_TYPE_INDEX,
            code: template.code.clone(),
            code_index,
            tag: template.tag,
            setup_tag: template.tag,
            body: Body::from_template(template),
            abilities,
            is_active: false,
            is_selected: false,
            check_casting: true,
            spawn_version: 0,
            visual: VisualState::default(),
        };
        agent.for_each_ability(Ability::setup);
        agent.for_each_ability(Ability::late_setup);
        agent.setup_tag = agent.tag;
        Ok(agent)
    }

    /// Run `f` on the ability at `index` with the rest of the agent lent out.
    fn with_ability<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut Ability, &mut AgentParts<'_>) -> R,
    ) -> Option<R> {
        let handle = self.handle();
        let (before, rest) = self.abilities.split_at_mut(index);
        let (ability, after) = rest.split_first_mut()?;
        let mut parts = AgentParts {
            handle,
            controller: self.controller,
            tag: &mut self.tag,
            body: &mut self.body,
            check_casting: &mut self.check_casting,
            siblings: Siblings::new(before, after),
        };
        Some(f(ability, &mut parts))
    }

    fn for_each_ability(&mut self, mut f: impl FnMut(&mut Ability, &mut AgentParts<'_>)) {
        for index in 0..self.abilities.len() {
            self.with_ability(index, &mut f);
        }
    }

    /// Activate at `position` facing `rotation`.
    ///
    /// Resets the body and every ability's per-activation state.
    pub fn initialize(
        &mut self,
        position: Vec2Fixed,
        rotation: Vec2Fixed,
        ctx: &mut InitContext<'_>,
    ) {
        self.body.reset(position, rotation);
        self.tag = self.setup_tag;
        self.is_active = true;
        self.is_selected = false;
        self.check_casting = true;
        self.for_each_ability(|ability, parts| ability.initialize(parts, ctx));
    }

    /// One deterministic step of every ability, in declared order.
    pub fn simulate(&mut self, ctx: &mut SimContext<'_>) {
        self.for_each_ability(|ability, parts| {
            ability.simulate(parts, ctx);
            ability.publish_variables();
        });
    }

    /// Cross-ability resolution after every agent simulated.
    pub fn late_simulate(&mut self, ctx: &mut SimContext<'_>) {
        self.for_each_ability(|ability, parts| ability.late_simulate(parts, ctx));
        self.body.late_simulate();
    }

    /// Refresh presentation state.
    pub fn visualize(&mut self) {
        self.for_each_ability(Ability::visualize);
        self.visual = VisualState {
            position: [
                self.body.position.x.to_num(),
                self.body.position.y.to_num(),
            ],
            facing: [
                self.body.rotation.x.to_num(),
                self.body.rotation.y.to_num(),
            ],
            selected: self.is_selected,
            busy: !self.check_casting,
        };
    }

    /// Presentation pass after every agent visualized.
    pub fn late_visualize(&mut self) {
        self.for_each_ability(Ability::late_visualize);
    }

    /// Stop every ability and mark the agent inactive.
    pub fn deactivate(&mut self) {
        self.for_each_ability(Ability::deactivate);
        self.is_active = false;
        self.is_selected = false;
    }

    /// Apply a command addressed to this agent.
    ///
    /// `Stop` halts movement and every cast. Other payloads go to the first
    /// ability of the command's kind; an external move order is then
    /// announced to the remaining abilities.
    pub fn execute(&mut self, command: &Command, ctx: &mut SimContext<'_>) {
        if command.payload == CommandData::Stop {
            self.stop_cast(None);
            if let Some(mover) = self
                .ability_of_kind_mut(AbilityKind::Move)
                .and_then(Ability::as_move_mut)
            {
                mover.stop_move();
            }
            return;
        }

        let Some(index) = self.ability_index(command.ability) else {
            debug!(
                global_id = self.global_id,
                ability = command.ability.type_name(),
                "Agent has no ability for command"
            );
            return;
        };
        self.with_ability(index, |ability, parts| ability.execute(command, parts, ctx));

        if command.ability == AbilityKind::Move && matches!(command.payload, CommandData::Position(_))
        {
            for other in (0..self.abilities.len()).filter(|&i| i != index) {
                self.with_ability(other, Ability::move_commanded);
            }
        }
    }

    /// Stop every casting ability except `except`.
    pub fn stop_cast(&mut self, except: Option<usize>) {
        let mut parts = CastParts {
            body: &mut self.body,
            check_casting: &mut self.check_casting,
        };
        for ability in &mut self.abilities {
            if Some(ability.id()) != except {
                ability.stop_cast(&mut parts);
            }
        }
    }

    /// Start a move if the agent can move.
    pub fn order_move(&mut self, destination: Vec2Fixed) -> bool {
        match self
            .ability_of_kind_mut(AbilityKind::Move)
            .and_then(Ability::as_move_mut)
        {
            Some(mover) => {
                mover.start_move(destination);
                true
            }
            None => false,
        }
    }

    /// Forget bindings from a previous session. Used on pooled agents.
    pub fn session_reset(&mut self) {
        self.global_id = 0;
        self.local_id = 0;
        self.controller = None;
        self.is_active = false;
        self.is_selected = false;
        self.check_casting = true;
        self.tag = self.setup_tag;
        self.visual = VisualState::default();
    }

    /// Append one record per ability.
    #[must_use]
    pub fn save_details(&self) -> Vec<SaveToken> {
        let mut writer = DetailWriter::new();
        for ability in &self.abilities {
            ability.save_details(&mut writer);
        }
        writer.into_tokens()
    }

    /// Read one record per ability, in declared order.
    pub(crate) fn load_details(&mut self, tokens: &[SaveToken]) {
        let mut reader = DetailReader::new(tokens);
        for ability in &mut self.abilities {
            ability.load_details(&mut reader);
        }
        self.check_casting = !self.abilities.iter().any(Ability::is_casting);
    }

    /// Resolve saved cross-agent references.
    pub(crate) fn loaded(&mut self, agents: &AgentTable<'_>) {
        self.for_each_ability(|ability, parts| ability.loaded(parts, agents));
    }

    /// Fold of every ability's tracked variables.
    #[must_use]
    pub fn variables_hash(&self) -> i64 {
        self.abilities.iter().fold(0_i64, |hash, ability| {
            hash.wrapping_mul(31)
                .wrapping_add(ability.core().variables().state_hash())
        })
    }

    pub(crate) fn bind(
        &mut self,
        global_id: u16,
        local_id: u16,
        controller: Option<ControllerId>,
        spawn_version: u32,
    ) {
        self.global_id = global_id;
        self.local_id = local_id;
        self.controller = controller;
        self.spawn_version = spawn_version;
    }

    pub(crate) fn set_type_index(&mut self, type_index: u16) {
        self.type_index = type_index;
    }

    pub(crate) fn set_selected(&mut self, selected: bool) {
        self.is_selected = selected;
    }

    pub(crate) fn set_tag(&mut self, tag: AgentTag) {
        self.tag = tag;
    }

    /// Handle to this activation.
    #[must_use]
    pub const fn handle(&self) -> AgentHandle {
        AgentHandle {
            global_id: self.global_id,
            spawn_version: self.spawn_version,
        }
    }

    /// Slot in the global table.
    #[must_use]
    pub const fn global_id(&self) -> u16 {
        self.global_id
    }

    /// Slot in the owning controller's table.
    #[must_use]
    pub const fn local_id(&self) -> u16 {
        self.local_id
    }

    /// Owning controller.
    #[must_use]
    pub const fn controller_id(&self) -> Option<ControllerId> {
        self.controller
    }

    /// Position in the pooling bucket, or [`UNREGISTERED_TYPE_INDEX`].
    #[must_use]
    pub const fn type_index(&self) -> u16 {
        self.type_index
    }

    /// Template code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Dense index of the template code.
    #[must_use]
    pub const fn code_index(&self) -> usize {
        self.code_index
    }

    /// Role tag.
    #[must_use]
    pub const fn tag(&self) -> AgentTag {
        self.tag
    }

    /// Physical body.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Mutable physical body.
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Whether the agent is live.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.is_active
    }

    /// Whether the owning controller has it selected.
    #[must_use]
    pub const fn is_selected(&self) -> bool {
        self.is_selected
    }

    /// `false` while some ability occupies the action slot.
    #[must_use]
    pub const fn check_casting(&self) -> bool {
        self.check_casting
    }

    /// Activation counter value.
    #[must_use]
    pub const fn spawn_version(&self) -> u32 {
        self.spawn_version
    }

    /// Presentation state.
    #[must_use]
    pub const fn visual(&self) -> &VisualState {
        &self.visual
    }

    /// Abilities in declared order.
    #[must_use]
    pub fn abilities(&self) -> &[Ability] {
        &self.abilities
    }

    /// Ability by ID.
    #[must_use]
    pub fn ability(&self, id: usize) -> Option<&Ability> {
        self.abilities.get(id)
    }

    /// Mutable ability by ID.
    pub fn ability_mut(&mut self, id: usize) -> Option<&mut Ability> {
        self.abilities.get_mut(id)
    }

    fn ability_index(&self, kind: AbilityKind) -> Option<usize> {
        self.abilities.iter().position(|a| a.kind() == kind)
    }

    /// First ability of a kind.
    #[must_use]
    pub fn ability_of_kind(&self, kind: AbilityKind) -> Option<&Ability> {
        self.abilities.iter().find(|a| a.kind() == kind)
    }

    /// First ability of a kind, mutable.
    pub fn ability_of_kind_mut(&mut self, kind: AbilityKind) -> Option<&mut Ability> {
        self.abilities.iter_mut().find(|a| a.kind() == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        AbilityData, ConstructConfig, HealthConfig, MoveConfig, StructureConfig, TurnConfig,
    };
    use crate::random::SeededRandom;

    fn data() -> DataRegistry {
        let mut data = DataRegistry::new();
        data.register_ability(AbilityData::new(AbilityKind::Move, "move", 1));
        data.register_ability(AbilityData::new(AbilityKind::Turn, "turn", 2));
        data.register_ability(AbilityData::new(AbilityKind::Construct, "build", 3));
        data.register_agent(
            AgentTemplate::new("worker")
                .with_ability(MoveConfig::default())
                .with_ability(TurnConfig::default())
                .with_ability(ConstructConfig::default())
                .with_ability(HealthConfig::default()),
        );
        data.register_agent(AgentTemplate::new("depot").with_ability(StructureConfig::default()));
        data
    }

    fn build(code: &str, data: &DataRegistry) -> Agent {
        let template = data.agent_template(code).unwrap();
        Agent::setup(template, data.agent_code_index(code).unwrap(), data).unwrap()
    }

    #[test]
    fn test_setup_resolves_codes_and_tag() {
        let data = data();
        let agent = build("worker", &data);

        let codes: Vec<&str> = agent.abilities().iter().map(Ability::code).collect();
        assert_eq!(codes, vec!["move", "turn", "build", "Health"]);
        // Builders default to the builder tag.
        assert_eq!(agent.tag(), AgentTag::Builder);
        assert_eq!(agent.type_index(), UNREGISTERED_TYPE_INDEX);
        assert!(!agent.is_active());
    }

    #[test]
    fn test_setup_fails_for_unregistered_ability() {
        let mut data = DataRegistry::new();
        data.register_agent(AgentTemplate::new("ghost").with_ability(MoveConfig::default()));
        let template = data.agent_template("ghost").unwrap();
        assert!(Agent::setup(template, 0, &data).is_err());
    }

    #[test]
    fn test_initialize_activates() {
        let data = data();
        let mut rng = SeededRandom::new(7);
        let mut agent = build("worker", &data);
        let mut ctx = InitContext {
            data: &data,
            rng: &mut rng,
        };
        agent.initialize(Vec2Fixed::from_int(2, 3), Vec2Fixed::ZERO, &mut ctx);

        assert!(agent.is_active());
        assert!(agent.check_casting());
        assert_eq!(agent.body().position, Vec2Fixed::from_int(2, 3));
        assert_eq!(agent.body().rotation, Vec2Fixed::RIGHT);
    }

    #[test]
    fn test_stop_cast_on_idle_agent_is_noop() {
        let data = data();
        let mut agent = build("depot", &data);
        agent.stop_cast(None);
        assert!(agent.check_casting());
    }

    #[test]
    fn test_order_move() {
        let data = data();
        let mut worker = build("worker", &data);
        assert!(worker.order_move(Vec2Fixed::from_int(5, 5)));
        let mover = worker
            .ability_of_kind(AbilityKind::Move)
            .and_then(Ability::as_move)
            .unwrap();
        assert!(mover.is_moving());

        let mut depot = build("depot", &data);
        assert!(!depot.order_move(Vec2Fixed::from_int(5, 5)));
    }

    #[test]
    fn test_save_details_has_one_record_per_ability() {
        let data = data();
        let agent = build("worker", &data);
        let tokens = agent.save_details();
        let records = tokens
            .iter()
            .filter(|t| matches!(t, SaveToken::EndRecord))
            .count();
        assert_eq!(records, agent.abilities().len());
    }
}
