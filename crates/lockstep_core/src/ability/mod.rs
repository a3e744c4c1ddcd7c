//! Ability framework: per-agent behavior modules and their phase protocol.
//!
//! An agent owns an ordered list of [`Ability`] values. Each ability pairs
//! the shared bookkeeping in [`AbilityCore`] with one concrete behavior from
//! the closed [`AbilityVariant`] set. Every behavior implements
//! [`AbilityBehavior`], whose hooks the agent drives in a fixed order:
//!
//! ```text
//! setup -> late_setup -> initialize -> { simulate -> late_simulate
//!       -> visualize -> late_visualize }* -> deactivate -> (initialize again when pooled)
//! ```
//!
//! Only the simulate-time hooks may change state that feeds the state hash.
//! The first simulate after each initialize also runs `on_first_frame`, and
//! `on_cast` runs after `on_simulate` while the ability is casting.

pub mod charge;
pub mod context;
pub mod detail;
pub mod variables;

use tracing::debug;

use crate::abilities::{
    AttackAbility, ConstructAbility, HealthAbility, MoveAbility, SpawnerAbility,
    StructureAbility, TurnAbility,
};
use crate::command::Command;
use crate::data::{AbilityConfig, AbilityData, AbilityKind, DataRegistry};
use crate::error::Result;

pub use charge::{ChargeCycle, FrameTimer};
pub use context::{
    AgentParts, AgentTable, CastParts, Deactivation, InitContext, PendingChanges, Siblings,
    SimContext, SpawnRequest,
};
pub use detail::{DetailReader, DetailWriter, SaveToken, SaveValue};
pub use variables::{TrackedVariable, VariableContainer};

/// Bookkeeping shared by every ability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityCore {
    id: usize,
    kind: AbilityKind,
    code: String,
    data: Option<AbilityData>,
    variables: VariableContainer,
    is_casting: bool,
    is_first_frame: bool,
    loaded_saved_values: bool,
}

impl AbilityCore {
    /// Resolve the ability code once.
    ///
    /// Active kinds take their code from the registered descriptor; passive
    /// kinds use their type name.
    fn resolve(id: usize, kind: AbilityKind, data: &DataRegistry) -> Result<Self> {
        let (code, descriptor) = if kind.is_active() {
            let descriptor = data.ability_data(kind)?.clone();
            (descriptor.code.clone(), Some(descriptor))
        } else {
            (kind.type_name().to_string(), None)
        };
        Ok(Self {
            id,
            kind,
            code,
            data: descriptor,
            variables: VariableContainer::new(),
            is_casting: false,
            is_first_frame: true,
            loaded_saved_values: false,
        })
    }

    /// Position in the owning agent's ability list.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Ability kind.
    #[must_use]
    pub const fn kind(&self) -> AbilityKind {
        self.kind
    }

    /// Ability code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Static descriptor (active kinds only).
    #[must_use]
    pub const fn data(&self) -> Option<&AbilityData> {
        self.data.as_ref()
    }

    /// Tracked variables.
    #[must_use]
    pub const fn variables(&self) -> &VariableContainer {
        &self.variables
    }

    /// Whether this ability occupies the agent's action slot.
    #[must_use]
    pub const fn is_casting(&self) -> bool {
        self.is_casting
    }

    /// Whether the next simulate is the first since activation.
    #[must_use]
    pub const fn is_first_frame(&self) -> bool {
        self.is_first_frame
    }

    /// Whether the last load pass read a saved record.
    #[must_use]
    pub const fn loaded_saved_values(&self) -> bool {
        self.loaded_saved_values
    }

    /// Change the casting flag. A change also flips the agent's
    /// `check_casting` flag to the opposite value.
    pub fn set_casting(&mut self, value: bool, check_casting: &mut bool) {
        if value != self.is_casting {
            *check_casting = !value;
            self.is_casting = value;
        }
    }
}

/// The hooks every concrete ability implements. All default to no-ops.
pub trait AbilityBehavior {
    /// Once per attachment. Siblings exist but are not yet initialized.
    fn on_setup(&mut self, _core: &mut AbilityCore, _parts: &mut AgentParts<'_>) {}

    /// After every sibling ran its setup.
    fn on_late_setup(&mut self, _core: &mut AbilityCore, _parts: &mut AgentParts<'_>) {}

    /// Reset all per-activation state.
    fn on_initialize(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        _ctx: &mut InitContext<'_>,
    ) {
    }

    /// First simulate after an initialize.
    fn on_first_frame(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        _ctx: &mut SimContext<'_>,
    ) {
    }

    /// Every tick.
    fn on_simulate(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        _ctx: &mut SimContext<'_>,
    ) {
    }

    /// Every tick, after every agent simulated.
    fn on_late_simulate(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        _ctx: &mut SimContext<'_>,
    ) {
    }

    /// Every tick while casting, after `on_simulate`.
    fn on_cast(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        _ctx: &mut SimContext<'_>,
    ) {
    }

    /// Presentation only; never feeds the state hash.
    fn on_visualize(&mut self, _core: &mut AbilityCore, _parts: &mut AgentParts<'_>) {}

    /// Presentation only, after every agent visualized.
    fn on_late_visualize(&mut self, _core: &mut AbilityCore, _parts: &mut AgentParts<'_>) {}

    /// The agent is being destroyed or pooled.
    fn on_deactivate(&mut self, _core: &mut AbilityCore, _parts: &mut AgentParts<'_>) {}

    /// A command addressed to this ability's kind.
    fn on_execute(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        _command: &Command,
        _ctx: &mut SimContext<'_>,
    ) {
    }

    /// Another ability or a stop command wants the action slot back.
    fn on_stop_cast(&mut self, _core: &mut AbilityCore, _parts: &mut CastParts<'_>) {}

    /// The agent received an external move order.
    fn on_move_commanded(&mut self, _core: &mut AbilityCore, _parts: &mut AgentParts<'_>) {}

    /// Write every saved property.
    fn save_details(&self, _core: &AbilityCore, _writer: &mut DetailWriter) {}

    /// Read one saved property. Returns `false` for names it does not know.
    fn load_property(&mut self, _core: &mut AbilityCore, _name: &str, _value: &SaveValue) -> bool {
        false
    }

    /// After every agent was loaded; resolve saved references here.
    fn on_loaded(
        &mut self,
        _core: &mut AbilityCore,
        _parts: &mut AgentParts<'_>,
        _agents: &AgentTable<'_>,
    ) {
    }

    /// Declare tracked variables (once, at setup).
    fn register_variables(&self, _variables: &mut VariableContainer) {}

    /// Publish current values after each simulate.
    fn publish_variables(&self, _variables: &mut VariableContainer) {}
}

/// Closed set of concrete behaviors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbilityVariant {
    /// Movement.
    Move(MoveAbility),
    /// Facing.
    Turn(TurnAbility),
    /// Combat.
    Attack(AttackAbility),
    /// Building structures.
    Construct(ConstructAbility),
    /// Producing agents.
    Spawner(SpawnerAbility),
    /// Being built.
    Structure(StructureAbility),
    /// Hit points.
    Health(HealthAbility),
}

impl AbilityVariant {
    fn from_config(config: &AbilityConfig) -> Self {
        match config {
            AbilityConfig::Move(c) => Self::Move(MoveAbility::new(c)),
            AbilityConfig::Turn(c) => Self::Turn(TurnAbility::new(c)),
            AbilityConfig::Attack(c) => Self::Attack(AttackAbility::new(c)),
            AbilityConfig::Construct(c) => Self::Construct(ConstructAbility::new(c)),
            AbilityConfig::Spawner(c) => Self::Spawner(SpawnerAbility::new(c)),
            AbilityConfig::Structure(c) => Self::Structure(StructureAbility::new(c)),
            AbilityConfig::Health(c) => Self::Health(HealthAbility::new(c)),
        }
    }

    fn behavior(&self) -> &dyn AbilityBehavior {
        match self {
            Self::Move(a) => a,
            Self::Turn(a) => a,
            Self::Attack(a) => a,
            Self::Construct(a) => a,
            Self::Spawner(a) => a,
            Self::Structure(a) => a,
            Self::Health(a) => a,
        }
    }

    fn behavior_mut(&mut self) -> &mut dyn AbilityBehavior {
        match self {
            Self::Move(a) => a,
            Self::Turn(a) => a,
            Self::Attack(a) => a,
            Self::Construct(a) => a,
            Self::Spawner(a) => a,
            Self::Structure(a) => a,
            Self::Health(a) => a,
        }
    }
}

/// One behavior module attached to an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ability {
    core: AbilityCore,
    variant: AbilityVariant,
}

macro_rules! typed_access {
    ($($variant:ident => $ty:ty, $get:ident, $get_mut:ident;)*) => {
        impl Ability {
            $(
                #[doc = concat!("The [`", stringify!($ty), "`] behind this ability, if it is one.")]
                #[must_use]
                pub const fn $get(&self) -> Option<&$ty> {
                    match &self.variant {
                        AbilityVariant::$variant(a) => Some(a),
                        _ => None,
                    }
                }

                #[doc = concat!("Mutable [`", stringify!($ty), "`] behind this ability, if it is one.")]
                pub fn $get_mut(&mut self) -> Option<&mut $ty> {
                    match &mut self.variant {
                        AbilityVariant::$variant(a) => Some(a),
                        _ => None,
                    }
                }
            )*
        }
    };
}

typed_access! {
    Move => MoveAbility, as_move, as_move_mut;
    Turn => TurnAbility, as_turn, as_turn_mut;
    Attack => AttackAbility, as_attack, as_attack_mut;
    Construct => ConstructAbility, as_construct, as_construct_mut;
    Spawner => SpawnerAbility, as_spawner, as_spawner_mut;
    Structure => StructureAbility, as_structure, as_structure_mut;
    Health => HealthAbility, as_health, as_health_mut;
}

impl Ability {
    /// Build an ability from its template entry, resolving its code.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnregisteredAbility`](crate::error::GameError::UnregisteredAbility)
    /// for an active kind with no registered descriptor.
    pub fn new(id: usize, config: &AbilityConfig, data: &DataRegistry) -> Result<Self> {
        Ok(Self {
            core: AbilityCore::resolve(id, config.kind(), data)?,
            variant: AbilityVariant::from_config(config),
        })
    }

    /// Shared bookkeeping.
    #[must_use]
    pub const fn core(&self) -> &AbilityCore {
        &self.core
    }

    /// Concrete behavior.
    #[must_use]
    pub const fn variant(&self) -> &AbilityVariant {
        &self.variant
    }

    /// Position in the owning agent's ability list.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.core.id
    }

    /// Ability kind.
    #[must_use]
    pub const fn kind(&self) -> AbilityKind {
        self.core.kind
    }

    /// Ability code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.core.code
    }

    /// Whether this ability occupies the action slot.
    #[must_use]
    pub const fn is_casting(&self) -> bool {
        self.core.is_casting
    }

    pub(crate) fn setup(&mut self, parts: &mut AgentParts<'_>) {
        self.variant.behavior_mut().on_setup(&mut self.core, parts);
        self.variant
            .behavior()
            .register_variables(&mut self.core.variables);
    }

    pub(crate) fn late_setup(&mut self, parts: &mut AgentParts<'_>) {
        self.variant.behavior_mut().on_late_setup(&mut self.core, parts);
    }

    pub(crate) fn initialize(&mut self, parts: &mut AgentParts<'_>, ctx: &mut InitContext<'_>) {
        self.core.variables.reset();
        self.core.set_casting(false, parts.check_casting);
        self.core.is_first_frame = true;
        self.core.loaded_saved_values = false;
        self.variant
            .behavior_mut()
            .on_initialize(&mut self.core, parts, ctx);
    }

    pub(crate) fn simulate(&mut self, parts: &mut AgentParts<'_>, ctx: &mut SimContext<'_>) {
        let behavior = self.variant.behavior_mut();
        if self.core.is_first_frame {
            behavior.on_first_frame(&mut self.core, parts, ctx);
            self.core.is_first_frame = false;
        }
        behavior.on_simulate(&mut self.core, parts, ctx);
        if self.core.is_casting {
            behavior.on_cast(&mut self.core, parts, ctx);
        }
    }

    pub(crate) fn late_simulate(&mut self, parts: &mut AgentParts<'_>, ctx: &mut SimContext<'_>) {
        self.variant
            .behavior_mut()
            .on_late_simulate(&mut self.core, parts, ctx);
    }

    pub(crate) fn visualize(&mut self, parts: &mut AgentParts<'_>) {
        self.variant.behavior_mut().on_visualize(&mut self.core, parts);
    }

    pub(crate) fn late_visualize(&mut self, parts: &mut AgentParts<'_>) {
        self.variant
            .behavior_mut()
            .on_late_visualize(&mut self.core, parts);
    }

    pub(crate) fn deactivate(&mut self, parts: &mut AgentParts<'_>) {
        self.core.set_casting(false, parts.check_casting);
        self.variant.behavior_mut().on_deactivate(&mut self.core, parts);
    }

    pub(crate) fn execute(
        &mut self,
        command: &Command,
        parts: &mut AgentParts<'_>,
        ctx: &mut SimContext<'_>,
    ) {
        self.variant
            .behavior_mut()
            .on_execute(&mut self.core, parts, command, ctx);
    }

    pub(crate) fn stop_cast(&mut self, parts: &mut CastParts<'_>) {
        self.variant.behavior_mut().on_stop_cast(&mut self.core, parts);
    }

    pub(crate) fn move_commanded(&mut self, parts: &mut AgentParts<'_>) {
        self.variant
            .behavior_mut()
            .on_move_commanded(&mut self.core, parts);
    }

    pub(crate) fn publish_variables(&mut self) {
        self.variant
            .behavior()
            .publish_variables(&mut self.core.variables);
    }

    /// Append this ability's record (terminated by an end marker).
    pub fn save_details(&self, writer: &mut DetailWriter) {
        writer.write_bool("Casting", self.core.is_casting);
        writer.write_bool("FirstFrame", self.core.is_first_frame);
        self.variant.behavior().save_details(&self.core, writer);
        writer.end_record();
    }

    /// Consume one record. Unknown property names are ignored.
    pub(crate) fn load_details(&mut self, reader: &mut DetailReader<'_>) {
        while let Some((name, value)) = reader.next_property() {
            let handled = match name {
                "Casting" => value.as_bool().map(|v| self.core.is_casting = v).is_some(),
                "FirstFrame" => value.as_bool().map(|v| self.core.is_first_frame = v).is_some(),
                _ => self
                    .variant
                    .behavior_mut()
                    .load_property(&mut self.core, name, value),
            };
            if !handled {
                debug!(ability = %self.core.code, property = name, "Ignoring saved property");
            }
        }
        self.core.loaded_saved_values = true;
    }

    pub(crate) fn loaded(&mut self, parts: &mut AgentParts<'_>, agents: &AgentTable<'_>) {
        self.variant
            .behavior_mut()
            .on_loaded(&mut self.core, parts, agents);
    }
}
