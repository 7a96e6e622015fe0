//! # Engine Error Types

use spawnvault_core::{SpawnerError, SpawnerId};
use spawnvault_storage::StorageError;
use thiserror::Error;

/// Errors returned by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The simulation refused the operation.
    #[error(transparent)]
    Spawner(#[from] SpawnerError),

    /// Storage failed during startup or maintenance.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Another spawner already occupies the position.
    #[error("position already holds spawner {0}")]
    PositionOccupied(SpawnerId),

    /// A background thread could not be started.
    #[error("failed to spawn thread: {0}")]
    Thread(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for an unknown spawner id.
    pub(crate) fn not_found(id: &SpawnerId) -> Self {
        Self::Spawner(SpawnerError::NotFound(id.clone()))
    }

    /// The simulation error behind this one, if any.
    #[must_use]
    pub fn spawner_error(&self) -> Option<&SpawnerError> {
        match self {
            Self::Spawner(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
