//! Errors of the headless tools.

use thiserror::Error;

use lockstep_core::error::GameError;

/// Result alias using [`HeadlessError`].
pub type Result<T> = std::result::Result<T, HeadlessError>;

/// Failures while loading inputs or running a session headlessly.
#[derive(Error, Debug)]
pub enum HeadlessError {
    /// Input file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a scenario.
    #[error("Failed to parse scenario: {0}")]
    ScenarioParse(#[from] ron::error::SpannedError),

    /// A scenario refers to something it does not define.
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// Failed to write JSON output.
    #[error("Failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The simulation core rejected an operation.
    #[error(transparent)]
    Core(#[from] GameError),
}
