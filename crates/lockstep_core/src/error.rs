//! Error types for the simulation core.
//!
//! Configuration errors (unknown codes, unregistered abilities, capacity
//! overflow) are fatal to the call that discovered them. Operations on stale
//! agent handles are not errors and never produce a [`GameError`].

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// No agent template is registered under this code.
    #[error("Agent code '{0}' not found")]
    UnknownAgentCode(String),

    /// An active ability kind has no data descriptor in the registry.
    #[error("The ability of type {0} has not been registered in the database")]
    UnregisteredAbility(String),

    /// More controllers than the fixed ceiling.
    #[error("Cannot have more than {limit} agent controllers")]
    ControllerLimitExceeded {
        /// Maximum number of controllers.
        limit: usize,
    },

    /// A controller or the global table ran out of agent slots.
    #[error("Agent capacity of {capacity} exceeded in {table}")]
    AgentCapacityExceeded {
        /// Which table overflowed.
        table: &'static str,
        /// Capacity of that table.
        capacity: usize,
    },

    /// Controller index was never created.
    #[error("Controller with index {0} not created")]
    ControllerNotFound(u8),

    /// Data file parsing error.
    #[error("Failed to parse data '{source_name}': {message}")]
    DataParseError {
        /// Name of the data source that failed to parse.
        source_name: String,
        /// Error message.
        message: String,
    },

    /// Snapshot or replay encoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Replay written by an incompatible format version.
    #[error("Replay version mismatch: expected {expected}, got {found}")]
    ReplayVersionMismatch {
        /// Version this build understands.
        expected: u32,
        /// Version found in the file.
        found: u32,
    },

    /// Invalid simulation state.
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),

    /// Desync detected between peers or against a recorded hash.
    #[error("Desync detected at frame {frame}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Frame where the hashes diverged.
        frame: u64,
        /// Local simulation hash.
        local_hash: i64,
        /// Remote or recorded hash.
        remote_hash: i64,
    },
}
