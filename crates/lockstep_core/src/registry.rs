//! The agent registry: every process-wide agent table as one value.
//!
//! The registry owns the global agent table, the controllers, the pooling
//! buckets and the buffered structural changes. Each phase walks global IDs
//! `0..peak` in ascending order and skips inactive slots. Destroy and spawn
//! requests made during a sweep wait in [`PendingChanges`] until the single
//! drain point at the end of [`AgentRegistry::late_simulate`].
//!
//! # Example
//!
//! ```
//! use lockstep_core::controller::AllegianceType;
//! use lockstep_core::data::{AgentTemplate, DataRegistry};
//! use lockstep_core::math::Vec2Fixed;
//! use lockstep_core::registry::AgentRegistry;
//! use lockstep_core::simulation::SimulationConfig;
//!
//! let mut data = DataRegistry::new();
//! data.register_agent(AgentTemplate::new("crate"));
//!
//! let mut registry = AgentRegistry::new(data, SimulationConfig::default());
//! let player = registry.create_controller(AllegianceType::NEUTRAL, "player").unwrap();
//! let handle = registry
//!     .create_agent(player, "crate", Vec2Fixed::from_int(1, 2), Vec2Fixed::RIGHT)
//!     .unwrap();
//! assert_eq!(handle.global_id, 0);
//! assert_eq!(registry.agent_count(), 1);
//! ```

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::ability::{AgentTable, Deactivation, InitContext, PendingChanges, SimContext};
use crate::agent::{Agent, AgentHandle, UNREGISTERED_TYPE_INDEX};
use crate::command::Command;
use crate::controller::{AgentController, AllegianceType, ControllerId, TeamId};
use crate::data::DataRegistry;
use crate::error::{GameError, Result};
use crate::ids::IdAllocator;
use crate::math::Vec2Fixed;
use crate::random::SeededRandom;
use crate::simulation::SimulationConfig;
use crate::snapshot::{AgentSnapshot, ControllerSnapshot, WorldSnapshot};

/// Maximum number of agents one controller may own.
pub const MAX_AGENTS: usize = 16384;

/// Maximum number of controllers per session.
pub const MAX_CONTROLLERS: usize = 256;

/// Structural changes committed at a drain point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Agents destroyed, in request order.
    pub destroyed: Vec<AgentHandle>,
    /// Agents spawned, in request order.
    pub spawned: Vec<AgentHandle>,
    /// Codes whose spawn request failed.
    pub failed_spawns: Vec<String>,
}

impl TickEvents {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.destroyed.is_empty() && self.spawned.is_empty() && self.failed_spawns.is_empty()
    }
}

/// Owner of every agent, controller and pool in a session.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    config: SimulationConfig,
    data: DataRegistry,
    rng: SeededRandom,
    global_agents: Vec<Option<Agent>>,
    global_agent_active: Vec<bool>,
    global_ids: IdAllocator,
    controllers: Vec<AgentController>,
    /// Active flag per pooled-type slot, keyed by code index.
    type_agents_active: BTreeMap<usize, Vec<bool>>,
    cached_agents: BTreeMap<String, Vec<Agent>>,
    pending: PendingChanges,
    dying: Vec<Agent>,
    spawn_counter: u32,
}

impl AgentRegistry {
    /// Create an empty registry over static data.
    #[must_use]
    pub fn new(data: DataRegistry, config: SimulationConfig) -> Self {
        Self {
            rng: SeededRandom::new(config.seed),
            global_ids: IdAllocator::new(config.global_capacity),
            config,
            data,
            global_agents: Vec::new(),
            global_agent_active: Vec::new(),
            controllers: Vec::new(),
            type_agents_active: BTreeMap::new(),
            cached_agents: BTreeMap::new(),
            pending: PendingChanges::default(),
            dying: Vec::new(),
            spawn_counter: 0,
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Start a new session.
    ///
    /// Clears the global table, controllers and ID free-lists, drops buffered
    /// changes, and session-resets every pooled agent. Pools survive, so a
    /// test harness can run many sessions in one registry.
    pub fn initialize(&mut self) {
        for agent in std::mem::take(&mut self.dying) {
            self.complete_life(agent);
        }
        self.global_agents.clear();
        self.global_agent_active.clear();
        self.global_ids.clear();
        self.controllers.clear();
        for bucket in self.type_agents_active.values_mut() {
            bucket.fill(false);
        }
        for cache in self.cached_agents.values_mut() {
            for agent in cache.iter_mut() {
                agent.session_reset();
            }
        }
        self.pending.clear();
        self.spawn_counter = 0;
        self.rng = SeededRandom::new(self.config.seed);
        debug!(seed = self.config.seed, "Agent registry initialized");
    }

    /// End the session: destroy every active agent immediately and finish
    /// every dying one.
    pub fn deactivate(&mut self) {
        for global_id in self.active_ids() {
            if let Some(handle) = self.handle_of(global_id) {
                self.destroy_agent(handle, true);
            }
        }
        self.pending.take_spawns();
        let mut events = TickEvents::default();
        self.drain_destroys(&mut events);
        for agent in std::mem::take(&mut self.dying) {
            self.complete_life(agent);
        }
        info!(destroyed = events.destroyed.len(), "Agent registry deactivated");
    }

    /// Queue an immediate destroy for every active agent, highest ID first.
    pub fn clear_agents(&mut self) {
        for global_id in self.active_ids().into_iter().rev() {
            if let Some(handle) = self.handle_of(global_id) {
                self.destroy_agent(handle, true);
            }
        }
    }

    // ------------------------------------------------------------------
    // Controllers
    // ------------------------------------------------------------------

    /// Register a controller.
    ///
    /// Every existing controller regards the new one with its own default
    /// allegiance, and the new controller regards each existing one with
    /// the new default. A controller is always friendly to itself.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ControllerLimitExceeded`] past the controller
    /// ceiling.
    pub fn create_controller(
        &mut self,
        default_allegiance: AllegianceType,
        name: impl Into<String>,
    ) -> Result<ControllerId> {
        let limit = self.config.max_controllers.min(MAX_CONTROLLERS);
        if self.controllers.len() >= limit {
            return Err(GameError::ControllerLimitExceeded { limit });
        }
        let id = ControllerId(self.controllers.len() as u8);
        let mut controller =
            AgentController::new(id, name, default_allegiance, self.config.max_agents);
        controller.set_allegiance(id, AllegianceType::FRIENDLY);
        for other in &mut self.controllers {
            other.set_allegiance(id, other.default_allegiance());
            controller.set_allegiance(other.id(), default_allegiance);
        }
        info!(controller = id.0, name = controller.name(), "Created controller");
        self.controllers.push(controller);
        Ok(id)
    }

    /// Controller by ID.
    #[must_use]
    pub fn controller(&self, id: ControllerId) -> Option<&AgentController> {
        self.controllers.get(id.index())
    }

    /// Mutable controller by ID.
    pub fn controller_mut(&mut self, id: ControllerId) -> Option<&mut AgentController> {
        self.controllers.get_mut(id.index())
    }

    /// Every controller in creation order.
    #[must_use]
    pub fn controllers(&self) -> &[AgentController] {
        &self.controllers
    }

    /// How `from` regards `to`. Unknown controllers are neutral.
    #[must_use]
    pub fn allegiance(&self, from: ControllerId, to: ControllerId) -> AllegianceType {
        match (self.controller(from), self.controller(to)) {
            (Some(a), Some(b)) => a.allegiance_to(b),
            _ => AllegianceType::NEUTRAL,
        }
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Take an unbound agent for `code`, from its pool if one is waiting.
    ///
    /// Fresh agents are set up from their template and registered in the
    /// code's type bucket.
    ///
    /// # Errors
    ///
    /// Fails for unknown codes and for templates with unregistered
    /// abilities.
    pub fn create_raw_agent(&mut self, code: &str) -> Result<Agent> {
        let code_index = self.data.agent_code_index(code)?;

        if let Some(agent) = self.cached_agents.get_mut(code).and_then(Vec::pop) {
            if let Some(slot) = self
                .type_agents_active
                .get_mut(&code_index)
                .and_then(|bucket| bucket.get_mut(usize::from(agent.type_index())))
            {
                *slot = true;
            }
            debug!(code, type_index = agent.type_index(), "Reusing pooled agent");
            return Ok(agent);
        }

        let template = self.data.agent_template(code)?;
        let mut agent = Agent::setup(template, code_index, &self.data)?;
        let bucket = self.type_agents_active.entry(code_index).or_default();
        if let Ok(type_index) = u16::try_from(bucket.len()) {
            if type_index != UNREGISTERED_TYPE_INDEX {
                agent.set_type_index(type_index);
                bucket.push(true);
            }
        }
        debug!(code, type_index = agent.type_index(), "Instantiated agent");
        Ok(agent)
    }

    /// Bind `agent` to a controller and place it in the global table.
    ///
    /// Local and global IDs both reuse the smallest freed ID before growing.
    /// On failure the agent's life is completed and the error returned.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ControllerNotFound`] or
    /// [`GameError::AgentCapacityExceeded`].
    pub fn add_agent(&mut self, controller_id: ControllerId, mut agent: Agent) -> Result<AgentHandle> {
        let index = controller_id.index();
        if index >= self.controllers.len() {
            self.retire(agent);
            return Err(GameError::ControllerNotFound(controller_id.0));
        }
        let Some(global_id) = self.global_ids.allocate() else {
            let capacity = self.global_ids.capacity() as usize;
            self.retire(agent);
            return Err(GameError::AgentCapacityExceeded {
                table: "global agents",
                capacity,
            });
        };
        let Some(local_id) = self.controllers[index].allocate_local(global_id) else {
            self.global_ids.release(global_id);
            let capacity = self.config.max_agents;
            self.retire(agent);
            return Err(GameError::AgentCapacityExceeded {
                table: "controller agents",
                capacity,
            });
        };

        self.spawn_counter = self.spawn_counter.wrapping_add(1);
        agent.bind(global_id, local_id, Some(controller_id), self.spawn_counter);
        let handle = agent.handle();

        let slot = usize::from(global_id);
        if self.global_agents.len() <= slot {
            self.global_agents.resize_with(slot + 1, || None);
            self.global_agent_active.resize(slot + 1, false);
        }
        self.global_agents[slot] = Some(agent);
        self.global_agent_active[slot] = true;
        Ok(handle)
    }

    /// Create, bind and activate an agent at a position.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`create_raw_agent`](Self::create_raw_agent)
    /// and [`add_agent`](Self::add_agent).
    pub fn create_agent(
        &mut self,
        controller: ControllerId,
        code: &str,
        position: Vec2Fixed,
        rotation: Vec2Fixed,
    ) -> Result<AgentHandle> {
        let agent = self.create_raw_agent(code)?;
        let handle = self.add_agent(controller, agent)?;
        if let Some(agent) = self
            .global_agents
            .get_mut(usize::from(handle.global_id))
            .and_then(Option::as_mut)
        {
            let mut ctx = InitContext {
                data: &self.data,
                rng: &mut self.rng,
            };
            agent.initialize(position, rotation, &mut ctx);
        }
        debug!(
            global_id = handle.global_id,
            controller = controller.0,
            code,
            "Created agent"
        );
        Ok(handle)
    }

    /// Create and bind an agent at the template's origin, facing +X.
    ///
    /// Pooled agents are placed there too, not where their last life ended.
    ///
    /// # Errors
    ///
    /// Same as [`create_agent`](Self::create_agent).
    pub fn create_bare_agent(&mut self, controller: ControllerId, code: &str) -> Result<AgentHandle> {
        let agent = self.create_raw_agent(code)?;
        let handle = self.add_agent(controller, agent)?;
        if let Some(agent) = self
            .global_agents
            .get_mut(usize::from(handle.global_id))
            .and_then(Option::as_mut)
        {
            let mut ctx = InitContext {
                data: &self.data,
                rng: &mut self.rng,
            };
            agent.initialize(Vec2Fixed::ZERO, Vec2Fixed::RIGHT, &mut ctx);
        }
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // Destruction
    // ------------------------------------------------------------------

    /// Queue a destroy. Nothing changes until the next drain.
    ///
    /// Stale handles and duplicate requests are dropped at the drain.
    pub fn destroy_agent(&mut self, handle: AgentHandle, immediate: bool) {
        self.pending.destroy(handle, immediate);
    }

    /// Pool a destroyed agent, or drop it when pooling is off or the agent
    /// never got a type slot.
    pub fn complete_life(&mut self, agent: Agent) {
        if self.config.pooling_enabled && agent.type_index() != UNREGISTERED_TYPE_INDEX {
            debug!(code = agent.code(), type_index = agent.type_index(), "Pooled agent");
            self.cached_agents
                .entry(agent.code().to_string())
                .or_default()
                .push(agent);
        } else {
            debug!(code = agent.code(), "Disposed agent");
        }
    }

    fn retire(&mut self, agent: Agent) {
        self.release_type_slot(&agent);
        self.complete_life(agent);
    }

    fn release_type_slot(&mut self, agent: &Agent) {
        if agent.type_index() == UNREGISTERED_TYPE_INDEX {
            return;
        }
        if let Some(slot) = self
            .type_agents_active
            .get_mut(&agent.code_index())
            .and_then(|bucket| bucket.get_mut(usize::from(agent.type_index())))
        {
            *slot = false;
        }
    }

    /// Take a live agent out of the tables and free its IDs.
    fn unbind(&mut self, handle: AgentHandle) -> Option<Agent> {
        let slot = usize::from(handle.global_id);
        if !self.global_agent_active.get(slot).copied().unwrap_or(false) {
            return None;
        }
        let current = self.global_agents.get(slot)?.as_ref()?;
        if current.spawn_version() != handle.spawn_version {
            return None;
        }
        let agent = self.global_agents[slot].take()?;
        self.global_agent_active[slot] = false;
        self.global_ids.release(handle.global_id);
        if let Some(controller) = agent
            .controller_id()
            .and_then(|id| self.controllers.get_mut(id.index()))
        {
            controller.release_local(agent.local_id());
            controller.remove_from_selection(handle.global_id);
        }
        Some(agent)
    }

    fn drain_destroys(&mut self, events: &mut TickEvents) {
        for Deactivation { handle, immediate } in self.pending.take_destroys() {
            let Some(mut agent) = self.unbind(handle) else {
                debug!(
                    global_id = handle.global_id,
                    spawn_version = handle.spawn_version,
                    "Ignoring destroy of inactive agent"
                );
                continue;
            };
            agent.deactivate();
            self.release_type_slot(&agent);
            events.destroyed.push(handle);
            debug!(global_id = handle.global_id, code = agent.code(), immediate, "Destroyed agent");
            if immediate {
                self.complete_life(agent);
            } else {
                self.dying.push(agent);
            }
        }
    }

    /// Commit buffered changes: finish last drain's dying agents, then
    /// destroys, then spawns, each in request order.
    fn drain(&mut self) -> TickEvents {
        let mut events = TickEvents::default();
        for agent in std::mem::take(&mut self.dying) {
            self.complete_life(agent);
        }
        self.drain_destroys(&mut events);

        for request in self.pending.take_spawns() {
            match self.create_agent(
                request.controller,
                &request.code,
                request.position,
                request.rotation,
            ) {
                Ok(handle) => {
                    if let Some(rally_point) = request.rally_point {
                        if let Some(agent) = self.get_mut(handle) {
                            agent.order_move(rally_point);
                        }
                    }
                    events.spawned.push(handle);
                }
                Err(err) => {
                    warn!(code = %request.code, controller = request.controller.0, error = %err, "Spawn failed");
                    events.failed_spawns.push(request.code);
                }
            }
        }
        events
    }

    // ------------------------------------------------------------------
    // Ownership and selection
    // ------------------------------------------------------------------

    /// Move a live agent to another controller.
    ///
    /// Both IDs are freed and reallocated, so the returned handle replaces
    /// the old one. Stale handles yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ControllerNotFound`] for an unknown target, or a
    /// capacity error from [`add_agent`](Self::add_agent).
    pub fn change_controller(
        &mut self,
        handle: AgentHandle,
        controller: ControllerId,
    ) -> Result<Option<AgentHandle>> {
        if self.controller(controller).is_none() {
            return Err(GameError::ControllerNotFound(controller.0));
        }
        let Some(mut agent) = self.unbind(handle) else {
            return Ok(None);
        };
        agent.set_selected(false);
        self.add_agent(controller, agent).map(Some)
    }

    /// Take a live agent out of the registry without deactivating it.
    ///
    /// The agent keeps its abilities' state and loses its IDs and owner.
    pub fn detach_agent(&mut self, handle: AgentHandle) -> Option<Agent> {
        let mut agent = self.unbind(handle)?;
        agent.set_selected(false);
        agent.bind(0, 0, None, agent.spawn_version());
        Some(agent)
    }

    /// Select or deselect a live agent in its controller. Stale handles are
    /// ignored.
    pub fn set_selected(&mut self, handle: AgentHandle, selected: bool) -> bool {
        let Some(controller_id) = self.get(handle).and_then(Agent::controller_id) else {
            return false;
        };
        let Some(controller) = self.controllers.get_mut(controller_id.index()) else {
            return false;
        };
        let changed = if selected {
            controller.add_to_selection(handle.global_id)
        } else {
            controller.remove_from_selection(handle.global_id)
        };
        if let Some(agent) = self.get_mut(handle) {
            agent.set_selected(selected);
        }
        changed
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    /// Run `f` on one active agent, with the rest of the world lent out.
    fn with_agent<R>(
        &mut self,
        global_id: u16,
        frame: u64,
        f: impl FnOnce(&mut Agent, &mut SimContext<'_>) -> R,
    ) -> Option<R> {
        let slot = usize::from(global_id);
        if !self.global_agent_active.get(slot).copied().unwrap_or(false) {
            return None;
        }
        let mut agent = self.global_agents.get_mut(slot)?.take()?;
        let result = {
            let mut ctx = SimContext {
                delta: self.config.delta(),
                frame,
                data: &self.data,
                rng: &mut self.rng,
                agents: AgentTable::new(&mut self.global_agents, &self.global_agent_active),
                pending: &mut self.pending,
            };
            f(&mut agent, &mut ctx)
        };
        self.global_agents[slot] = Some(agent);
        Some(result)
    }

    fn global_id_range(&self) -> impl Iterator<Item = u16> {
        (0..=u16::MAX).take(self.global_ids.peak() as usize)
    }

    fn sweep(&mut self, frame: u64, mut f: impl FnMut(&mut Agent, &mut SimContext<'_>)) {
        for global_id in self.global_id_range() {
            self.with_agent(global_id, frame, &mut f);
        }
    }

    /// Simulate every active agent in ascending global ID order.
    pub fn simulate(&mut self, frame: u64) {
        self.sweep(frame, Agent::simulate);
    }

    /// Late-simulate every active agent, then drain buffered changes.
    pub fn late_simulate(&mut self, frame: u64) -> TickEvents {
        self.sweep(frame, Agent::late_simulate);
        let events = self.drain();
        #[cfg(feature = "debug-validation")]
        self.validate_tables();
        events
    }

    /// Cross-check the global table against every controller's local map.
    #[cfg(feature = "debug-validation")]
    fn validate_tables(&self) {
        let slots = self.global_agents.iter().zip(&self.global_agent_active);
        for (slot, (agent, &active)) in slots.enumerate() {
            assert_eq!(agent.is_some(), active, "global slot {slot} out of sync");
            if let Some(agent) = agent {
                assert_eq!(usize::from(agent.global_id()), slot, "agent stored in wrong slot");
            }
        }
        for controller in &self.controllers {
            for (local_id, global_id) in controller.local_agents() {
                let owner = self
                    .try_get_agent_instance(global_id)
                    .and_then(|agent| (agent.local_id() == local_id).then(|| agent.controller_id()))
                    .flatten();
                assert_eq!(
                    owner,
                    Some(controller.id()),
                    "local ID {local_id} points at a foreign agent"
                );
            }
        }
    }

    /// Refresh presentation state. Never affects the state hash.
    pub fn visualize(&mut self) {
        for (slot, &active) in self.global_agents.iter_mut().zip(&self.global_agent_active) {
            if let (true, Some(agent)) = (active, slot.as_mut()) {
                agent.visualize();
            }
        }
    }

    /// Presentation pass after [`visualize`](Self::visualize).
    pub fn late_visualize(&mut self) {
        for (slot, &active) in self.global_agents.iter_mut().zip(&self.global_agent_active) {
            if let (true, Some(agent)) = (active, slot.as_mut()) {
                agent.late_visualize();
            }
        }
    }

    /// Dispatch a command to its controller's selection.
    ///
    /// An explicit selection becomes the controller's previous selection;
    /// a command without one reuses it. Targets are visited in selection
    /// order and local IDs that are not live are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ControllerNotFound`] for an unknown controller.
    pub fn execute(&mut self, command: &Command, frame: u64) -> Result<()> {
        let controller = self
            .controllers
            .get_mut(command.controller.index())
            .ok_or(GameError::ControllerNotFound(command.controller.0))?;
        controller.remember_selection(command);

        let controller = &*controller;
        let targets: Vec<u16> = controller
            .get_selection(command)
            .local_ids
            .iter()
            .filter_map(|&local_id| {
                let global_id = controller.local_agent(local_id);
                if global_id.is_none() {
                    debug!(controller = command.controller.0, local_id, "Skipping stale selection");
                }
                global_id
            })
            .collect();

        for global_id in targets {
            self.with_agent(global_id, frame, |agent, ctx| agent.execute(command, ctx));
        }
        Ok(())
    }

    /// Fingerprint of every active body, in ascending global ID order.
    ///
    /// Seeded with a peeked random value; combines with XOR, wrapping add
    /// and XOR-times-three in rotation.
    #[must_use]
    pub fn get_state_hash(&self) -> i64 {
        let mut hash = i64::from(self.rng.peek_int(i32::MAX.unsigned_abs()));
        for (turn, agent) in self.active_agents().enumerate() {
            let n1 = agent.body().state_hash();
            match turn % 3 {
                0 => hash ^= n1,
                1 => hash = hash.wrapping_add(n1),
                _ => hash ^= n1.wrapping_mul(3),
            }
        }
        hash
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Active agent at a global ID.
    #[must_use]
    pub fn try_get_agent_instance(&self, global_id: u16) -> Option<&Agent> {
        let slot = usize::from(global_id);
        if !self.global_agent_active.get(slot).copied().unwrap_or(false) {
            return None;
        }
        self.global_agents.get(slot)?.as_ref()
    }

    /// Active agent for a handle that is still current.
    #[must_use]
    pub fn get(&self, handle: AgentHandle) -> Option<&Agent> {
        self.try_get_agent_instance(handle.global_id)
            .filter(|agent| agent.spawn_version() == handle.spawn_version)
    }

    /// Mutable active agent for a handle that is still current.
    pub fn get_mut(&mut self, handle: AgentHandle) -> Option<&mut Agent> {
        let slot = usize::from(handle.global_id);
        if !self.global_agent_active.get(slot).copied().unwrap_or(false) {
            return None;
        }
        self.global_agents
            .get_mut(slot)?
            .as_mut()
            .filter(|agent| agent.spawn_version() == handle.spawn_version)
    }

    /// Active agents in ascending global ID order.
    pub fn active_agents(&self) -> impl Iterator<Item = &Agent> {
        self.global_agents
            .iter()
            .zip(&self.global_agent_active)
            .filter_map(|(slot, &active)| if active { slot.as_ref() } else { None })
    }

    fn active_ids(&self) -> Vec<u16> {
        self.active_agents().map(Agent::global_id).collect()
    }

    fn handle_of(&self, global_id: u16) -> Option<AgentHandle> {
        self.try_get_agent_instance(global_id).map(Agent::handle)
    }

    /// Number of active agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.global_agent_active.iter().filter(|&&active| active).count()
    }

    /// One past the highest global ID handed out.
    #[must_use]
    pub const fn peak_global_id(&self) -> u32 {
        self.global_ids.peak()
    }

    /// Pooled agents waiting for reuse under `code`.
    #[must_use]
    pub fn pooled_count(&self, code: &str) -> usize {
        self.cached_agents.get(code).map_or(0, Vec::len)
    }

    /// Active flags of the type bucket for a code index.
    #[must_use]
    pub fn type_agents_active(&self, code_index: usize) -> &[bool] {
        self.type_agents_active
            .get(&code_index)
            .map_or(&[], Vec::as_slice)
    }

    /// Destroyed agents waiting for their life to complete.
    #[must_use]
    pub fn dying_count(&self) -> usize {
        self.dying.len()
    }

    /// Destroyed agents waiting for their life to complete, in drain order.
    ///
    /// They are outside every sweep; only their last state is visible here.
    #[must_use]
    pub fn dying_agents(&self) -> &[Agent] {
        &self.dying
    }

    /// Changes waiting for the next drain.
    #[must_use]
    pub const fn pending(&self) -> &PendingChanges {
        &self.pending
    }

    /// Static data.
    #[must_use]
    pub const fn data(&self) -> &DataRegistry {
        &self.data
    }

    /// Shared deterministic RNG.
    #[must_use]
    pub const fn rng(&self) -> &SeededRandom {
        &self.rng
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Activation counter of the most recent binding.
    #[must_use]
    pub const fn spawn_counter(&self) -> u32 {
        self.spawn_counter
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Capture the session between ticks.
    #[must_use]
    pub fn snapshot(&self, frame: u64) -> WorldSnapshot {
        let controllers = self
            .controllers
            .iter()
            .map(|controller| ControllerSnapshot {
                name: controller.name().to_string(),
                default_allegiance: controller.default_allegiance().bits(),
                diplomacy: controller.diplomacy().iter().map(|a| a.bits()).collect(),
                team: controller.team().map(|team| team.0),
                player_index: controller.player_index(),
                peak_local_id: controller.peak_local_id(),
                open_local_ids: controller.local_id_allocator().open_ids(),
                previous_selection: controller.previous_selection().clone(),
                selected: controller.selected_agents().to_vec(),
            })
            .collect();

        let agents = self
            .active_agents()
            .filter_map(|agent| {
                Some(AgentSnapshot {
                    global_id: agent.global_id(),
                    local_id: agent.local_id(),
                    controller: agent.controller_id()?,
                    code: agent.code().to_string(),
                    tag: agent.tag(),
                    body: agent.body().clone(),
                    is_selected: agent.is_selected(),
                    spawn_version: agent.spawn_version(),
                    details: agent.save_details(),
                })
            })
            .collect();

        WorldSnapshot {
            frame,
            rng_state: self.rng.state(),
            spawn_counter: self.spawn_counter,
            peak_global_id: self.global_ids.peak(),
            open_global_ids: self.global_ids.open_ids(),
            controllers,
            agents,
        }
    }

    /// Replace the session with a snapshot.
    ///
    /// IDs and free-lists come back exactly, so allocation after the load
    /// continues as it would have. Agents are re-activated, then their
    /// bodies and ability records are restored, then cross-agent references
    /// are resolved. The RNG state is restored last because activation
    /// draws from it.
    ///
    /// # Errors
    ///
    /// Fails for unknown codes or controllers in the snapshot. The registry
    /// is left partially loaded; call [`initialize`](Self::initialize)
    /// before reusing it.
    pub fn restore(&mut self, snapshot: &WorldSnapshot) -> Result<()> {
        self.initialize();

        for saved in &snapshot.controllers {
            let id = self.create_controller(
                AllegianceType::from_bits(saved.default_allegiance),
                saved.name.clone(),
            )?;
            let controller = &mut self.controllers[id.index()];
            for (other, &bits) in saved.diplomacy.iter().enumerate() {
                let other = u8::try_from(other)
                    .map_err(|_| GameError::InvalidState(format!("diplomacy entry {other}")))?;
                controller.set_allegiance(ControllerId(other), AllegianceType::from_bits(bits));
            }
            match saved.team {
                Some(team) => controller.join_team(TeamId(team)),
                None => controller.leave_team(),
            }
            controller.set_player_index(saved.player_index);
            controller.restore_local_ids(saved.peak_local_id, &saved.open_local_ids);
            controller.set_previous_selection(saved.previous_selection.clone());
        }
        self.global_ids
            .restore(snapshot.peak_global_id, &snapshot.open_global_ids);

        for saved in &snapshot.agents {
            let mut agent = self.create_raw_agent(&saved.code)?;
            let Some(controller) = self.controllers.get_mut(saved.controller.index()) else {
                self.retire(agent);
                return Err(GameError::ControllerNotFound(saved.controller.0));
            };
            controller.restore_local(saved.local_id, saved.global_id);
            agent.bind(
                saved.global_id,
                saved.local_id,
                Some(saved.controller),
                saved.spawn_version,
            );
            let mut ctx = InitContext {
                data: &self.data,
                rng: &mut self.rng,
            };
            agent.initialize(saved.body.position, saved.body.rotation, &mut ctx);
            *agent.body_mut() = saved.body.clone();
            agent.set_tag(saved.tag);
            agent.load_details(&saved.details);
            agent.set_selected(saved.is_selected);

            let slot = usize::from(saved.global_id);
            if self.global_agents.len() <= slot {
                self.global_agents.resize_with(slot + 1, || None);
                self.global_agent_active.resize(slot + 1, false);
            }
            self.global_agents[slot] = Some(agent);
            self.global_agent_active[slot] = true;
        }

        for (controller, saved) in self.controllers.iter_mut().zip(&snapshot.controllers) {
            for &global_id in &saved.selected {
                controller.add_to_selection(global_id);
            }
            controller.clear_selection_changed();
        }

        for global_id in self.global_id_range() {
            let slot = usize::from(global_id);
            if !self.global_agent_active.get(slot).copied().unwrap_or(false) {
                continue;
            }
            let Some(mut agent) = self.global_agents[slot].take() else {
                continue;
            };
            agent.loaded(&AgentTable::new(
                &mut self.global_agents,
                &self.global_agent_active,
            ));
            self.global_agents[slot] = Some(agent);
        }

        self.spawn_counter = snapshot.spawn_counter;
        self.rng.set_state(snapshot.rng_state);
        info!(
            frame = snapshot.frame,
            agents = snapshot.agents.len(),
            "Restored snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandData, Selection};
    use crate::data::{
        AbilityData, AbilityKind, AgentTemplate, HealthConfig, MoveConfig, TurnConfig,
    };

    fn data() -> DataRegistry {
        let mut data = DataRegistry::new();
        data.register_ability(AbilityData::new(AbilityKind::Move, "Move", 1));
        data.register_ability(AbilityData::new(AbilityKind::Turn, "Turn", 2));
        data.register_agent(
            AgentTemplate::new("scout")
                .with_ability(MoveConfig::default())
                .with_ability(TurnConfig::default())
                .with_ability(HealthConfig::default()),
        );
        data.register_agent(AgentTemplate::new("rock"));
        data
    }

    fn registry() -> (AgentRegistry, ControllerId) {
        let mut registry = AgentRegistry::new(data(), SimulationConfig::default());
        let player = registry
            .create_controller(AllegianceType::NEUTRAL, "player")
            .unwrap();
        (registry, player)
    }

    fn spawn(registry: &mut AgentRegistry, controller: ControllerId, x: i32) -> AgentHandle {
        registry
            .create_agent(controller, "scout", Vec2Fixed::from_int(x, 0), Vec2Fixed::RIGHT)
            .unwrap()
    }

    #[test]
    fn test_unknown_code_is_an_error() {
        let (mut registry, player) = registry();
        let err = registry
            .create_agent(player, "ghost", Vec2Fixed::ZERO, Vec2Fixed::RIGHT)
            .unwrap_err();
        assert!(matches!(err, GameError::UnknownAgentCode(code) if code == "ghost"));
        assert_eq!(registry.agent_count(), 0);
    }

    #[test]
    fn test_controller_ceiling() {
        let config = SimulationConfig {
            max_controllers: 2,
            ..SimulationConfig::default()
        };
        let mut registry = AgentRegistry::new(data(), config);
        registry.create_controller(AllegianceType::NEUTRAL, "a").unwrap();
        registry.create_controller(AllegianceType::NEUTRAL, "b").unwrap();
        let err = registry
            .create_controller(AllegianceType::NEUTRAL, "c")
            .unwrap_err();
        assert!(matches!(err, GameError::ControllerLimitExceeded { limit: 2 }));
    }

    #[test]
    fn test_allegiance_at_creation() {
        let mut registry = AgentRegistry::new(data(), SimulationConfig::default());
        let a = registry.create_controller(AllegianceType::NEUTRAL, "a").unwrap();
        let b = registry.create_controller(AllegianceType::ENEMY, "b").unwrap();
        registry
            .controller_mut(a)
            .unwrap()
            .set_allegiance(b, AllegianceType::FRIENDLY);
        let c = registry.create_controller(AllegianceType::NEUTRAL, "c").unwrap();

        assert_eq!(registry.allegiance(a, a), AllegianceType::FRIENDLY);
        assert_eq!(registry.allegiance(a, c), AllegianceType::NEUTRAL);
        assert_eq!(registry.allegiance(c, a), AllegianceType::NEUTRAL);
        assert_eq!(registry.allegiance(b, c), AllegianceType::ENEMY);
        assert_eq!(registry.allegiance(a, b), AllegianceType::FRIENDLY);
        assert_eq!(registry.allegiance(b, a), AllegianceType::ENEMY);
    }

    #[test]
    fn test_destroy_is_buffered() {
        let (mut registry, player) = registry();
        let handle = spawn(&mut registry, player, 0);
        registry.destroy_agent(handle, true);
        assert!(registry.get(handle).is_some());

        let events = registry.late_simulate(0);
        assert_eq!(events.destroyed, vec![handle]);
        assert!(registry.get(handle).is_none());
        assert_eq!(registry.controller(player).unwrap().agent_count(), 0);
    }

    #[test]
    fn test_double_destroy_is_noop() {
        let (mut registry, player) = registry();
        let handle = spawn(&mut registry, player, 0);
        registry.destroy_agent(handle, true);
        registry.destroy_agent(handle, true);
        let events = registry.late_simulate(0);
        assert_eq!(events.destroyed.len(), 1);
        registry.destroy_agent(handle, false);
        assert!(registry.late_simulate(1).destroyed.is_empty());
    }

    #[test]
    fn test_ids_reuse_smallest_freed() {
        let (mut registry, player) = registry();
        let handles: Vec<_> = (0..5).map(|x| spawn(&mut registry, player, x)).collect();
        registry.destroy_agent(handles[3], true);
        registry.destroy_agent(handles[1], true);
        registry.late_simulate(0);

        let a = spawn(&mut registry, player, 10);
        let b = spawn(&mut registry, player, 11);
        let c = spawn(&mut registry, player, 12);
        assert_eq!((a.global_id, b.global_id, c.global_id), (1, 3, 5));
        let locals: Vec<u16> = [a, b, c]
            .iter()
            .map(|h| registry.get(*h).unwrap().local_id())
            .collect();
        assert_eq!(locals, vec![1, 3, 5]);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let (mut registry, player) = registry();
        let old = spawn(&mut registry, player, 0);
        registry.destroy_agent(old, true);
        registry.late_simulate(0);
        let new = spawn(&mut registry, player, 1);
        assert_eq!(old.global_id, new.global_id);
        assert!(registry.get(old).is_none());
        assert!(registry.get(new).is_some());

        registry.destroy_agent(old, true);
        assert!(registry.late_simulate(1).destroyed.is_empty());
        assert!(registry.get(new).is_some());
    }

    #[test]
    fn test_pooling_reuses_instance() {
        let (mut registry, player) = registry();
        let handle = spawn(&mut registry, player, 0);
        let type_index = registry.get(handle).unwrap().type_index();
        registry.destroy_agent(handle, true);
        registry.late_simulate(0);
        assert_eq!(registry.pooled_count("scout"), 1);
        assert_eq!(registry.type_agents_active(0), &[false]);

        let reused = spawn(&mut registry, player, 4);
        assert_eq!(registry.pooled_count("scout"), 0);
        assert_eq!(registry.get(reused).unwrap().type_index(), type_index);
        assert_eq!(registry.type_agents_active(0), &[true]);
    }

    #[test]
    fn test_pooling_disabled_disposes() {
        let config = SimulationConfig {
            pooling_enabled: false,
            ..SimulationConfig::default()
        };
        let mut registry = AgentRegistry::new(data(), config);
        let player = registry.create_controller(AllegianceType::NEUTRAL, "p").unwrap();
        let handle = spawn(&mut registry, player, 0);
        registry.destroy_agent(handle, true);
        registry.late_simulate(0);
        assert_eq!(registry.pooled_count("scout"), 0);
    }

    #[test]
    fn test_dying_agent_completes_at_next_drain() {
        let (mut registry, player) = registry();
        let handle = spawn(&mut registry, player, 0);
        registry.destroy_agent(handle, false);
        registry.late_simulate(0);
        assert_eq!(registry.dying_count(), 1);
        assert_eq!(registry.pooled_count("scout"), 0);
        registry.late_simulate(1);
        assert_eq!(registry.dying_count(), 0);
        assert_eq!(registry.pooled_count("scout"), 1);
    }

    #[test]
    fn test_execute_uses_previous_selection() {
        let (mut registry, player) = registry();
        let a = spawn(&mut registry, player, 0);
        let b = spawn(&mut registry, player, 5);

        let first = Command::move_to(player, Vec2Fixed::from_int(0, 9))
            .with_selection(Selection::new(vec![0]));
        registry.execute(&first, 0).unwrap();
        let second = Command::new(
            player,
            AbilityKind::Move,
            CommandData::Position(Vec2Fixed::from_int(3, 3)),
        );
        registry.execute(&second, 1).unwrap();

        let destination = |h| {
            registry
                .get(h)
                .unwrap()
                .ability_of_kind(AbilityKind::Move)
                .and_then(crate::ability::Ability::as_move)
                .unwrap()
                .destination()
        };
        assert_eq!(destination(a), Vec2Fixed::from_int(3, 3));
        assert_eq!(destination(b), Vec2Fixed::from_int(5, 0));
    }

    #[test]
    fn test_execute_unknown_controller() {
        let (mut registry, _) = registry();
        let command = Command::stop(ControllerId(9));
        assert!(matches!(
            registry.execute(&command, 0),
            Err(GameError::ControllerNotFound(9))
        ));
    }

    #[test]
    fn test_state_hash_tracks_bodies() {
        let (mut registry, player) = registry();
        spawn(&mut registry, player, 0);
        let handle = spawn(&mut registry, player, 3);
        let before = registry.get_state_hash();
        assert_eq!(before, registry.get_state_hash());

        registry.get_mut(handle).unwrap().body_mut().position = Vec2Fixed::from_int(4, 0);
        assert_ne!(before, registry.get_state_hash());
    }

    #[test]
    fn test_change_controller_moves_ids() {
        let (mut registry, player) = registry();
        let other = registry.create_controller(AllegianceType::NEUTRAL, "other").unwrap();
        let handle = spawn(&mut registry, player, 0);
        registry.set_selected(handle, true);

        let moved = registry.change_controller(handle, other).unwrap().unwrap();
        assert!(registry.get(handle).is_none());
        let agent = registry.get(moved).unwrap();
        assert_eq!(agent.controller_id(), Some(other));
        assert!(!agent.is_selected());
        assert_eq!(registry.controller(player).unwrap().agent_count(), 0);
        assert!(registry.controller(player).unwrap().selected_agents().is_empty());
        assert_eq!(registry.controller(other).unwrap().agent_count(), 1);
    }

    #[test]
    fn test_detach_agent() {
        let (mut registry, player) = registry();
        let handle = spawn(&mut registry, player, 0);
        let agent = registry.detach_agent(handle).unwrap();
        assert!(agent.controller_id().is_none());
        assert!(agent.is_active());
        assert_eq!(registry.agent_count(), 0);
        assert!(registry.detach_agent(handle).is_none());
    }

    #[test]
    fn test_deactivate_and_initialize() {
        let (mut registry, player) = registry();
        spawn(&mut registry, player, 0);
        let dying = spawn(&mut registry, player, 1);
        registry.destroy_agent(dying, false);
        registry.late_simulate(0);

        registry.deactivate();
        assert_eq!(registry.agent_count(), 0);
        assert_eq!(registry.dying_count(), 0);
        assert_eq!(registry.pooled_count("scout"), 2);

        registry.initialize();
        assert!(registry.controllers().is_empty());
        assert_eq!(registry.peak_global_id(), 0);
        let player = registry.create_controller(AllegianceType::NEUTRAL, "again").unwrap();
        let handle = spawn(&mut registry, player, 0);
        assert_eq!(handle.global_id, 0);
        assert_eq!(registry.pooled_count("scout"), 1);
    }

    #[test]
    fn test_clear_agents_is_buffered() {
        let (mut registry, player) = registry();
        for x in 0..3 {
            spawn(&mut registry, player, x);
        }
        registry.clear_agents();
        assert_eq!(registry.agent_count(), 3);
        let events = registry.late_simulate(0);
        let order: Vec<u16> = events.destroyed.iter().map(|h| h.global_id).collect();
        assert_eq!(order, vec![2, 1, 0]);
        assert_eq!(registry.agent_count(), 0);
    }

    #[test]
    fn test_bare_agent_keeps_template_body() {
        let (mut registry, player) = registry();
        let handle = registry.create_bare_agent(player, "rock").unwrap();
        let agent = registry.get(handle).unwrap();
        assert!(agent.is_active());
        assert_eq!(agent.body().position, Vec2Fixed::ZERO);
    }

    #[test]
    fn test_pooled_bare_agent_starts_at_origin() {
        let (mut registry, player) = registry();
        let fresh = registry.create_bare_agent(player, "rock").unwrap();
        let expected = registry.get(fresh).unwrap().body().clone();

        let body = registry.get_mut(fresh).unwrap().body_mut();
        body.set_position(Vec2Fixed::from_int(7, 7));
        body.rotation = Vec2Fixed::UP;
        body.priority = 9;
        registry.destroy_agent(fresh, true);
        registry.late_simulate(0);
        assert_eq!(registry.pooled_count("rock"), 1);

        let reused = registry.create_bare_agent(player, "rock").unwrap();
        assert_eq!(registry.pooled_count("rock"), 0);
        assert_eq!(registry.get(reused).unwrap().body(), &expected);
    }

    #[test]
    fn test_controller_capacity() {
        let config = SimulationConfig {
            max_agents: 2,
            ..SimulationConfig::default()
        };
        let mut registry = AgentRegistry::new(data(), config);
        let player = registry.create_controller(AllegianceType::NEUTRAL, "p").unwrap();
        spawn(&mut registry, player, 0);
        spawn(&mut registry, player, 1);
        let err = registry
            .create_agent(player, "scout", Vec2Fixed::ZERO, Vec2Fixed::RIGHT)
            .unwrap_err();
        assert!(matches!(err, GameError::AgentCapacityExceeded { capacity: 2, .. }));
        assert_eq!(registry.agent_count(), 2);
        assert_eq!(registry.pooled_count("scout"), 1);
    }
}
