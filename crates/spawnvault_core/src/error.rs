//! # Spawner Error Types
//!
//! All errors that can occur in the simulation core.

use thiserror::Error;

use crate::types::{CreatureType, SpawnerId};

/// Errors that can occur in the spawner core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpawnerError {
    /// No loot table is registered for the creature type.
    ///
    /// The owning spawner is disabled rather than crashing the tick loop.
    #[error("unknown creature type: {0}")]
    UnknownCreatureType(CreatureType),

    /// The land-protection collaborator refused the player.
    #[error("access denied for player at spawner {0}")]
    AccessDenied(SpawnerId),

    /// Two spawners cannot be stacked together.
    #[error("incompatible merge: {reason}")]
    IncompatibleMerge {
        /// Why the merge was refused.
        reason: String,
    },

    /// Split amount is outside `1..stack_size`.
    #[error("invalid split: cannot extract {amount} from a stack of {stack_size}")]
    InvalidSplit {
        /// Units requested.
        amount: u32,
        /// Units available.
        stack_size: u32,
    },

    /// Merging would exceed the configured stack ceiling.
    #[error("stack limit exceeded: {requested} > {limit}")]
    StackLimitExceeded {
        /// Resulting stack size.
        requested: u32,
        /// Configured maximum.
        limit: u32,
    },

    /// Selling or depositing failed; nothing left storage.
    #[error("economy unavailable: {reason}")]
    EconomyUnavailable {
        /// Reason reported to the player.
        reason: String,
    },

    /// There was nothing to collect or sell.
    #[error("no items to process")]
    NoItems,

    /// Spawner id is not present.
    #[error("spawner not found: {0}")]
    NotFound(SpawnerId),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Arithmetic overflow in a currency calculation.
    #[error("arithmetic overflow in economic calculation")]
    ArithmeticOverflow,
}

/// Result type for spawner operations.
pub type SpawnerResult<T> = Result<T, SpawnerError>;
