//! Views handed to abilities during each phase.
//!
//! While the registry runs one agent, that agent is taken out of the global
//! table. Its abilities see the rest of the world through [`AgentTable`] and
//! their own agent through [`AgentParts`]. Structural changes (destroying
//! or spawning agents) are never applied mid-sweep: they are queued in
//! [`PendingChanges`] and committed by the registry at a single drain point.

use crate::ability::Ability;
use crate::agent::{Agent, AgentHandle};
use crate::body::Body;
use crate::controller::ControllerId;
use crate::data::{AbilityKind, AgentTag, DataRegistry};
use crate::math::{Fixed, Vec2Fixed};
use crate::random::SeededRandom;

/// Buffered request to destroy an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deactivation {
    /// Agent to destroy.
    pub handle: AgentHandle,
    /// Skip the dying period and finish its life in the same drain.
    pub immediate: bool,
}

/// Buffered request to create an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Owner of the new agent.
    pub controller: ControllerId,
    /// Template code.
    pub code: String,
    /// Spawn position.
    pub position: Vec2Fixed,
    /// Initial facing.
    pub rotation: Vec2Fixed,
    /// Move here after spawning.
    pub rally_point: Option<Vec2Fixed>,
}

/// Structural changes requested during a sweep, in request order.
#[derive(Debug, Clone, Default)]
pub struct PendingChanges {
    destroys: Vec<Deactivation>,
    spawns: Vec<SpawnRequest>,
}

impl PendingChanges {
    /// Queue a destroy request.
    pub fn destroy(&mut self, handle: AgentHandle, immediate: bool) {
        self.destroys.push(Deactivation { handle, immediate });
    }

    /// Queue a spawn request.
    pub fn spawn(&mut self, request: SpawnRequest) {
        self.spawns.push(request);
    }

    /// Queued destroy requests.
    #[must_use]
    pub fn destroys(&self) -> &[Deactivation] {
        &self.destroys
    }

    /// Queued spawn requests.
    #[must_use]
    pub fn spawns(&self) -> &[SpawnRequest] {
        &self.spawns
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.destroys.is_empty() && self.spawns.is_empty()
    }

    pub(crate) fn take_destroys(&mut self) -> Vec<Deactivation> {
        std::mem::take(&mut self.destroys)
    }

    pub(crate) fn take_spawns(&mut self) -> Vec<SpawnRequest> {
        std::mem::take(&mut self.spawns)
    }

    pub(crate) fn clear(&mut self) {
        self.destroys.clear();
        self.spawns.clear();
    }
}

/// The global agent table, minus the agent currently running.
#[derive(Debug)]
pub struct AgentTable<'a> {
    slots: &'a mut [Option<Agent>],
    active: &'a [bool],
}

impl<'a> AgentTable<'a> {
    /// Wrap the registry's global tables.
    pub fn new(slots: &'a mut [Option<Agent>], active: &'a [bool]) -> Self {
        Self { slots, active }
    }

    fn is_active(&self, global_id: u16) -> bool {
        self.active
            .get(usize::from(global_id))
            .copied()
            .unwrap_or(false)
    }

    /// Active agent at a global ID.
    #[must_use]
    pub fn get(&self, global_id: u16) -> Option<&Agent> {
        if !self.is_active(global_id) {
            return None;
        }
        self.slots.get(usize::from(global_id))?.as_ref()
    }

    /// Mutable active agent at a global ID.
    pub fn get_mut(&mut self, global_id: u16) -> Option<&mut Agent> {
        if !self.is_active(global_id) {
            return None;
        }
        self.slots.get_mut(usize::from(global_id))?.as_mut()
    }

    /// Active agent if the handle is still current.
    #[must_use]
    pub fn get_live(&self, handle: AgentHandle) -> Option<&Agent> {
        self.get(handle.global_id)
            .filter(|agent| agent.spawn_version() == handle.spawn_version)
    }

    /// Mutable active agent if the handle is still current.
    pub fn get_live_mut(&mut self, handle: AgentHandle) -> Option<&mut Agent> {
        self.get_mut(handle.global_id)
            .filter(|agent| agent.spawn_version() == handle.spawn_version)
    }
}

/// Everything the simulate-time hooks may touch outside their own agent.
#[derive(Debug)]
pub struct SimContext<'a> {
    /// Fixed tick length.
    pub delta: Fixed,
    /// Frame being simulated.
    pub frame: u64,
    /// Static data.
    pub data: &'a DataRegistry,
    /// Shared deterministic RNG.
    pub rng: &'a mut SeededRandom,
    /// Other agents.
    pub agents: AgentTable<'a>,
    /// Deferred structural changes.
    pub pending: &'a mut PendingChanges,
}

/// Context for activation.
#[derive(Debug)]
pub struct InitContext<'a> {
    /// Static data.
    pub data: &'a DataRegistry,
    /// Shared deterministic RNG.
    pub rng: &'a mut SeededRandom,
}

/// The owning agent's state, split away from the running ability.
#[derive(Debug)]
pub struct AgentParts<'a> {
    /// Handle of the owning agent.
    pub handle: AgentHandle,
    /// Owning controller, if bound.
    pub controller: Option<ControllerId>,
    /// Role tag.
    pub tag: &'a mut AgentTag,
    /// Physical body.
    pub body: &'a mut Body,
    /// Cleared while some ability occupies the agent's action slot.
    pub check_casting: &'a mut bool,
    /// The agent's other abilities.
    pub siblings: Siblings<'a>,
}

impl AgentParts<'_> {
    /// Stop every casting sibling. The running ability is never stopped.
    pub fn stop_sibling_casts(&mut self) {
        let mut cast = CastParts {
            body: &mut *self.body,
            check_casting: &mut *self.check_casting,
        };
        for sibling in self.siblings.iter_mut() {
            sibling.stop_cast(&mut cast);
        }
    }

    /// Narrow to the parts a stop-cast hook may touch.
    pub fn cast_parts(&mut self) -> CastParts<'_> {
        CastParts {
            body: &mut *self.body,
            check_casting: &mut *self.check_casting,
        }
    }
}

/// The parts of an agent a stop-cast hook may touch.
#[derive(Debug)]
pub struct CastParts<'a> {
    /// Physical body.
    pub body: &'a mut Body,
    /// Agent casting flag.
    pub check_casting: &'a mut bool,
}

/// Mutable view of an agent's abilities except the running one.
#[derive(Debug)]
pub struct Siblings<'a> {
    before: &'a mut [Ability],
    after: &'a mut [Ability],
    index: usize,
}

impl<'a> Siblings<'a> {
    /// Split around the ability at `index`.
    pub(crate) fn new(before: &'a mut [Ability], after: &'a mut [Ability]) -> Self {
        let index = before.len();
        Self {
            before,
            after,
            index,
        }
    }

    /// Sibling by ability ID. The running ability's own ID yields `None`.
    pub fn get_mut(&mut self, id: usize) -> Option<&mut Ability> {
        match id.cmp(&self.index) {
            std::cmp::Ordering::Less => self.before.get_mut(id),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => self.after.get_mut(id - self.index - 1),
        }
    }

    /// Sibling by ability ID, shared.
    #[must_use]
    pub fn get(&self, id: usize) -> Option<&Ability> {
        match id.cmp(&self.index) {
            std::cmp::Ordering::Less => self.before.get(id),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => self.after.get(id - self.index - 1),
        }
    }

    /// ID of the first sibling of a kind.
    #[must_use]
    pub fn find(&self, kind: AbilityKind) -> Option<usize> {
        self.iter().find(|a| a.kind() == kind).map(Ability::id)
    }

    /// Siblings in declared order.
    pub fn iter(&self) -> impl Iterator<Item = &Ability> {
        self.before.iter().chain(self.after.iter())
    }

    /// Mutable siblings in declared order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Ability> {
        self.before.iter_mut().chain(self.after.iter_mut())
    }
}
