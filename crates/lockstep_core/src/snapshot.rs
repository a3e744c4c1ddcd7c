//! Between-tick world snapshots.
//!
//! A [`WorldSnapshot`] holds everything needed to resume a session on
//! another machine and stay in lockstep: the frame, the RNG state, every
//! controller with its diplomacy and local ID free-list, the global ID
//! free-list, and every active agent with its IDs, body and per-ability
//! detail records. Capture and restore live on
//! [`AgentRegistry`](crate::registry::AgentRegistry).

use serde::{Deserialize, Serialize};

use crate::ability::SaveToken;
use crate::body::Body;
use crate::command::Selection;
use crate::controller::ControllerId;
use crate::data::AgentTag;
use crate::error::{GameError, Result};

/// Saved controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    /// Display name.
    pub name: String,
    /// Default allegiance bits.
    pub default_allegiance: u8,
    /// Allegiance bits towards each controller index.
    pub diplomacy: Vec<u8>,
    /// Team, if any.
    pub team: Option<u8>,
    /// Seat index.
    pub player_index: i32,
    /// One past the highest local ID handed out.
    pub peak_local_id: u32,
    /// Freed local IDs.
    pub open_local_ids: Vec<u16>,
    /// Selection reused by commands without one.
    pub previous_selection: Selection,
    /// Selected global IDs, in selection order.
    pub selected: Vec<u16>,
}

/// Saved agent state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Global table slot.
    pub global_id: u16,
    /// Slot in the owning controller.
    pub local_id: u16,
    /// Owner.
    pub controller: ControllerId,
    /// Template code.
    pub code: String,
    /// Role tag at capture time.
    pub tag: AgentTag,
    /// Physical body.
    pub body: Body,
    /// Selection highlight.
    pub is_selected: bool,
    /// Activation counter value.
    pub spawn_version: u32,
    /// One detail record per ability, in declared order.
    pub details: Vec<SaveToken>,
}

/// Complete world state between two ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Next frame to simulate.
    pub frame: u64,
    /// Shared RNG state.
    pub rng_state: u32,
    /// Activation counter.
    pub spawn_counter: u32,
    /// One past the highest global ID handed out.
    pub peak_global_id: u32,
    /// Freed global IDs.
    pub open_global_ids: Vec<u16>,
    /// Controllers in creation order.
    pub controllers: Vec<ControllerSnapshot>,
    /// Active agents in ascending global ID order.
    pub agents: Vec<AgentSnapshot>,
}

impl WorldSnapshot {
    /// Encode with bincode.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::Serialization(format!("Failed to encode snapshot: {e}")))
    }

    /// Decode from bincode.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] if the bytes are not a snapshot.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| GameError::Serialization(format!("Failed to decode snapshot: {e}")))
    }

    /// Pretty RON, for inspecting snapshots by hand.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] if encoding fails.
    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GameError::Serialization(format!("Failed to write snapshot RON: {e}")))
    }

    /// Parse RON written by [`to_ron`](Self::to_ron).
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] on malformed input.
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text)
            .map_err(|e| GameError::Serialization(format!("Failed to read snapshot RON: {e}")))
    }

    /// Snapshot of the agent at a global ID.
    #[must_use]
    pub fn agent(&self, global_id: u16) -> Option<&AgentSnapshot> {
        self.agents
            .binary_search_by_key(&global_id, |agent| agent.global_id)
            .ok()
            .map(|index| &self.agents[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::SaveValue;
    use crate::data::AgentTemplate;
    use crate::math::Vec2Fixed;

    fn snapshot() -> WorldSnapshot {
        let mut body = Body::from_template(&AgentTemplate::new("scout"));
        body.reset(Vec2Fixed::from_int(3, -2), Vec2Fixed::UP);
        WorldSnapshot {
            frame: 12,
            rng_state: 77,
            spawn_counter: 3,
            peak_global_id: 3,
            open_global_ids: vec![1],
            controllers: vec![ControllerSnapshot {
                name: "player".to_string(),
                default_allegiance: 1,
                diplomacy: vec![2],
                team: None,
                player_index: 0,
                peak_local_id: 3,
                open_local_ids: vec![1],
                previous_selection: Selection::new(vec![0, 2]),
                selected: vec![2],
            }],
            agents: vec![
                AgentSnapshot {
                    global_id: 0,
                    local_id: 0,
                    controller: ControllerId(0),
                    code: "scout".to_string(),
                    tag: AgentTag::None,
                    body: body.clone(),
                    is_selected: false,
                    spawn_version: 1,
                    details: vec![
                        SaveToken::Property {
                            name: "Casting".to_string(),
                            value: SaveValue::Bool(false),
                        },
                        SaveToken::EndRecord,
                    ],
                },
                AgentSnapshot {
                    global_id: 2,
                    local_id: 2,
                    controller: ControllerId(0),
                    code: "scout".to_string(),
                    tag: AgentTag::Builder,
                    body,
                    is_selected: true,
                    spawn_version: 3,
                    details: vec![SaveToken::EndRecord],
                },
            ],
        }
    }

    #[test]
    fn test_bincode_roundtrip() {
        let snapshot = snapshot();
        let bytes = snapshot.to_bytes().unwrap();
        assert_eq!(WorldSnapshot::from_bytes(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn test_ron_roundtrip() {
        let snapshot = snapshot();
        let text = snapshot.to_ron().unwrap();
        assert_eq!(WorldSnapshot::from_ron(&text).unwrap(), snapshot);
    }

    #[test]
    fn test_garbage_is_a_serialization_error() {
        assert!(matches!(
            WorldSnapshot::from_bytes(&[0xff, 0x01]),
            Err(GameError::Serialization(_))
        ));
    }

    #[test]
    fn test_agent_lookup() {
        let snapshot = snapshot();
        assert_eq!(snapshot.agent(2).unwrap().tag, AgentTag::Builder);
        assert!(snapshot.agent(1).is_none());
    }
}
