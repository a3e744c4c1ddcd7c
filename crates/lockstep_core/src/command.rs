//! Externally ordered commands and their dispatch payloads.
//!
//! Commands arrive already globally ordered (the transport is not part of
//! this crate). The order they are queued in is the order they execute in;
//! nothing here reorders or re-enters dispatch.

use serde::{Deserialize, Serialize};

use crate::controller::ControllerId;
use crate::data::{AbilityKind, DataRegistry};
use crate::math::Vec2Fixed;

/// Explicit target selection: local IDs within the issuing controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    /// Local IDs in dispatch order.
    pub local_ids: Vec<u16>,
}

impl Selection {
    /// Selection of the given local IDs.
    #[must_use]
    pub fn new(local_ids: impl Into<Vec<u16>>) -> Self {
        Self {
            local_ids: local_ids.into(),
        }
    }

    /// Whether the selection names no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local_ids.is_empty()
    }
}

/// Typed command payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandData {
    /// No payload.
    #[default]
    None,
    /// A ground-plane position.
    Position(Vec2Fixed),
    /// A target agent's global ID.
    Target(u16),
    /// A text value, such as an agent code to produce.
    Text(String),
    /// Stop every move and cast on the selected agents.
    Stop,
}

/// One instruction for a controller's selected agents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    /// Issuing controller.
    pub controller: ControllerId,
    /// Ability kind that receives the payload.
    ///
    /// Ignored for [`CommandData::Stop`], which the agent handles itself.
    pub ability: AbilityKind,
    /// Payload.
    pub payload: CommandData,
    /// Explicit selection, or `None` to reuse the controller's previous one.
    pub selection: Option<Selection>,
}

impl Command {
    /// Command for an ability kind with the previous selection.
    #[must_use]
    pub const fn new(controller: ControllerId, ability: AbilityKind, payload: CommandData) -> Self {
        Self {
            controller,
            ability,
            payload,
            selection: None,
        }
    }

    /// Command routed by the listen input of a registered ability.
    ///
    /// Returns `None` if no ability listens on `input`.
    #[must_use]
    pub fn for_input(
        data: &DataRegistry,
        controller: ControllerId,
        input: u16,
        payload: CommandData,
    ) -> Option<Self> {
        data.ability_by_input(input)
            .map(|ability| Self::new(controller, ability.kind, payload))
    }

    /// Move the selection to `destination`.
    #[must_use]
    pub const fn move_to(controller: ControllerId, destination: Vec2Fixed) -> Self {
        Self::new(controller, AbilityKind::Move, CommandData::Position(destination))
    }

    /// Stop the selection.
    #[must_use]
    pub const fn stop(controller: ControllerId) -> Self {
        Self::new(controller, AbilityKind::Move, CommandData::Stop)
    }

    /// Target explicit local IDs instead of the previous selection.
    #[must_use]
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }
}

/// Commands buffered between ticks, in receipt order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandQueue {
    commands: Vec<Command>,
}

impl CommandQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Take every queued command, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Command> + '_ {
        self.commands.drain(..)
    }

    /// Queued commands, oldest first.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every queued command.
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AbilityData;

    #[test]
    fn test_queue_preserves_receipt_order() {
        let mut queue = CommandQueue::new();
        let controller = ControllerId(0);
        queue.push(Command::stop(controller));
        queue.push(Command::move_to(controller, Vec2Fixed::from_int(1, 1)));
        queue.push(Command::new(
            controller,
            AbilityKind::Spawner,
            CommandData::Text("worker".into()),
        ));

        let drained: Vec<_> = queue.drain().map(|c| c.payload).collect();
        assert_eq!(
            drained,
            vec![
                CommandData::Stop,
                CommandData::Position(Vec2Fixed::from_int(1, 1)),
                CommandData::Text("worker".into()),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_for_input() {
        let mut data = DataRegistry::new();
        data.register_ability(AbilityData::new(AbilityKind::Attack, "Attack", 7));

        let command = Command::for_input(&data, ControllerId(1), 7, CommandData::Target(3)).unwrap();
        assert_eq!(command.ability, AbilityKind::Attack);
        assert!(command.selection.is_none());
        assert!(Command::for_input(&data, ControllerId(1), 8, CommandData::None).is_none());
    }

    #[test]
    fn test_with_selection() {
        let command =
            Command::stop(ControllerId(0)).with_selection(Selection::new(vec![4, 2]));
        assert_eq!(command.selection.unwrap().local_ids, vec![4, 2]);
    }
}
