//! # Storage Error Types

use spawnvault_core::SpawnerId;
use thiserror::Error;

/// Errors that can occur in the persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No record exists for the id.
    #[error("spawner record not found: {0}")]
    NotFound(SpawnerId),

    /// The database driver reported an error.
    #[error("backend error: {0}")]
    Backend(String),

    /// No pooled connection could be obtained.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// A stored row cannot be turned back into a spawner.
    #[error("corrupt record {id}: {reason}")]
    Corrupt {
        /// Row id, or `?` when the id itself is unreadable.
        id: String,
        /// What was wrong.
        reason: String,
    },

    /// The background writer is gone.
    #[error("storage writer has shut down")]
    WriterShutdown,

    /// Too many records are waiting to be written (backpressure).
    #[error("write queue full ({capacity} records pending)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// Writes kept failing; records stay queued as dirty.
    #[error("persistence failed after {attempts} attempts: {last_error}")]
    PersistenceTransientFailure {
        /// Attempts made in the last cycle.
        attempts: u32,
        /// Last driver error.
        last_error: String,
    },

    /// The settings name a backend that cannot be opened.
    #[error("storage configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Shorthand for a corrupt-row error.
    pub(crate) fn corrupt(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

impl From<r2d2::Error> for StorageError {
    fn from(e: r2d2::Error) -> Self {
        Self::Pool(e.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2_sqlite::rusqlite::Error> for StorageError {
    fn from(e: r2d2_sqlite::rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<r2d2_postgres::postgres::Error> for StorageError {
    fn from(e: r2d2_postgres::postgres::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

#[cfg(feature = "mysql")]
impl From<mysql::Error> for StorageError {
    fn from(e: mysql::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
