//! Agent controllers: ownership, local IDs, selection and diplomacy.
//!
//! A controller is one player or faction. It owns a bounded local table of
//! agents (local ID to global ID), a free-list of local IDs, the current
//! selection, and an allegiance entry towards every other controller.

use serde::{Deserialize, Serialize};

use crate::command::{Command, Selection};
use crate::ids::IdAllocator;

/// Index of a controller in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControllerId(pub u8);

impl ControllerId {
    /// Index into per-controller tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Team identifier. Controllers on the same team are friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamId(pub u8);

/// Allegiance flags. Flags so that queries can ask for several at once.
///
/// # Example
///
/// ```
/// use lockstep_core::controller::AllegianceType;
///
/// let hostile_or_neutral = AllegianceType::ENEMY | AllegianceType::NEUTRAL;
/// assert!(hostile_or_neutral.intersects(AllegianceType::ENEMY));
/// assert!(!hostile_or_neutral.contains(AllegianceType::FRIENDLY));
/// assert!(AllegianceType::ALL.contains(hostile_or_neutral));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllegianceType(u8);

impl AllegianceType {
    /// Neither friend nor foe.
    pub const NEUTRAL: Self = Self(1 << 0);
    /// Allied.
    pub const FRIENDLY: Self = Self(1 << 1);
    /// Hostile.
    pub const ENEMY: Self = Self(1 << 2);
    /// Every allegiance.
    pub const ALL: Self = Self(0xff);

    /// Check if all flags in `other` are set in `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check if any flags in `other` are set in `self`.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Union of flags.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Get raw bits for serialization.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Create from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }
}

impl Default for AllegianceType {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl std::ops::BitOr for AllegianceType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for AllegianceType {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// One player or faction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentController {
    name: String,
    id: ControllerId,
    default_allegiance: AllegianceType,
    diplomacy: Vec<AllegianceType>,
    local_agents: Vec<Option<u16>>,
    local_ids: IdAllocator,
    selected: Vec<u16>,
    selection_changed: bool,
    previous_selection: Selection,
    player_index: i32,
    team: Option<TeamId>,
}

impl AgentController {
    pub(crate) fn new(
        id: ControllerId,
        name: impl Into<String>,
        default_allegiance: AllegianceType,
        max_agents: usize,
    ) -> Self {
        Self {
            name: name.into(),
            id,
            default_allegiance,
            diplomacy: Vec::new(),
            local_agents: Vec::new(),
            local_ids: IdAllocator::new(max_agents),
            selected: Vec::new(),
            selection_changed: false,
            previous_selection: Selection::default(),
            player_index: 0,
            team: None,
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Controller index.
    #[must_use]
    pub const fn id(&self) -> ControllerId {
        self.id
    }

    /// Allegiance given to controllers created later.
    #[must_use]
    pub const fn default_allegiance(&self) -> AllegianceType {
        self.default_allegiance
    }

    /// Seat index of the player driving this controller.
    #[must_use]
    pub const fn player_index(&self) -> i32 {
        self.player_index
    }

    /// Set the seat index.
    pub fn set_player_index(&mut self, index: i32) {
        self.player_index = index;
    }

    /// Current team, if any.
    #[must_use]
    pub const fn team(&self) -> Option<TeamId> {
        self.team
    }

    /// Join a team. Team membership overrides the diplomacy table.
    pub fn join_team(&mut self, team: TeamId) {
        self.team = Some(team);
    }

    /// Leave the current team.
    pub fn leave_team(&mut self) {
        self.team = None;
    }

    /// Set how this controller regards `other`.
    pub fn set_allegiance(&mut self, other: ControllerId, allegiance: AllegianceType) {
        let index = other.index();
        if self.diplomacy.len() <= index {
            self.diplomacy.resize(index + 1, AllegianceType::NEUTRAL);
        }
        self.diplomacy[index] = allegiance;
    }

    /// How this controller regards `other`.
    ///
    /// When both are on teams, the same team is friendly and any other team
    /// is an enemy. Otherwise the diplomacy table decides.
    #[must_use]
    pub fn allegiance_to(&self, other: &Self) -> AllegianceType {
        match (self.team, other.team) {
            (Some(mine), Some(theirs)) if mine == theirs => AllegianceType::FRIENDLY,
            (Some(_), Some(_)) => AllegianceType::ENEMY,
            _ => self.allegiance_by_id(other.id),
        }
    }

    /// Diplomacy entry for a controller index, ignoring teams.
    #[must_use]
    pub fn allegiance_by_id(&self, other: ControllerId) -> AllegianceType {
        self.diplomacy
            .get(other.index())
            .copied()
            .unwrap_or(AllegianceType::NEUTRAL)
    }

    /// Raw diplomacy table, for snapshots.
    #[must_use]
    pub fn diplomacy(&self) -> &[AllegianceType] {
        &self.diplomacy
    }

    /// Global ID of the agent at a local ID, if that slot is live.
    #[must_use]
    pub fn local_agent(&self, local_id: u16) -> Option<u16> {
        self.local_agents.get(usize::from(local_id)).copied().flatten()
    }

    /// Live `(local_id, global_id)` pairs in local ID order.
    pub fn local_agents(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.local_agents
            .iter()
            .enumerate()
            .filter_map(|(local, global)| global.map(|g| (local as u16, g)))
    }

    /// Number of live agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.local_ids.in_use()
    }

    /// One past the highest local ID handed out.
    #[must_use]
    pub const fn peak_local_id(&self) -> u32 {
        self.local_ids.peak()
    }

    pub(crate) fn local_id_allocator(&self) -> &IdAllocator {
        &self.local_ids
    }

    pub(crate) fn allocate_local(&mut self, global_id: u16) -> Option<u16> {
        let local = self.local_ids.allocate()?;
        let index = usize::from(local);
        if self.local_agents.len() <= index {
            self.local_agents.resize(index + 1, None);
        }
        self.local_agents[index] = Some(global_id);
        Some(local)
    }

    pub(crate) fn release_local(&mut self, local_id: u16) {
        if let Some(slot) = self.local_agents.get_mut(usize::from(local_id)) {
            if slot.take().is_some() {
                self.local_ids.release(local_id);
            }
        }
    }

    pub(crate) fn restore_local(&mut self, local_id: u16, global_id: u16) {
        let index = usize::from(local_id);
        if self.local_agents.len() <= index {
            self.local_agents.resize(index + 1, None);
        }
        self.local_agents[index] = Some(global_id);
    }

    pub(crate) fn restore_local_ids(&mut self, peak: u32, open: &[u16]) {
        self.local_ids.restore(peak, open);
    }

    /// Add an agent to the selection. Returns `false` if it already was.
    pub fn add_to_selection(&mut self, global_id: u16) -> bool {
        if self.selected.contains(&global_id) {
            return false;
        }
        self.selected.push(global_id);
        self.selection_changed = true;
        true
    }

    /// Remove an agent from the selection. Unknown agents are ignored.
    pub fn remove_from_selection(&mut self, global_id: u16) -> bool {
        let Some(position) = self.selected.iter().position(|&g| g == global_id) else {
            return false;
        };
        self.selected.remove(position);
        self.selection_changed = true;
        true
    }

    /// Global IDs of selected agents, in selection order.
    #[must_use]
    pub fn selected_agents(&self) -> &[u16] {
        &self.selected
    }

    /// Whether the selection changed since the flag was last cleared.
    #[must_use]
    pub const fn selection_changed(&self) -> bool {
        self.selection_changed
    }

    /// Clear the selection-changed flag.
    pub fn clear_selection_changed(&mut self) {
        self.selection_changed = false;
    }

    /// The selection a command applies to: its own, or the previous one.
    #[must_use]
    pub fn get_selection<'a>(&'a self, command: &'a Command) -> &'a Selection {
        command
            .selection
            .as_ref()
            .unwrap_or(&self.previous_selection)
    }

    /// Last explicit selection received.
    #[must_use]
    pub const fn previous_selection(&self) -> &Selection {
        &self.previous_selection
    }

    pub(crate) fn remember_selection(&mut self, command: &Command) {
        if let Some(selection) = &command.selection {
            self.previous_selection = selection.clone();
        }
    }

    pub(crate) fn set_previous_selection(&mut self, selection: Selection) {
        self.previous_selection = selection;
    }
}
