//! # SpawnVault Storage
//!
//! Durable spawner state for SpawnVault.
//!
//! ## Design Principles
//!
//! 1. **One interface** - SQLite, MySQL, PostgreSQL and memory all implement [`SpawnerStore`]
//! 2. **Write-behind** - saves are queued and written in batches by one thread
//! 3. **Latest wins** - repeated saves of a spawner coalesce in the queue
//! 4. **Isolated damage** - a corrupt row is skipped, never fatal
//!
//! ## Example
//!
//! ```rust,ignore
//! use spawnvault_storage::Persistence;
//!
//! let persistence = Persistence::open(&settings.storage, settings.limits())?;
//! let report = persistence.load_all()?;
//! persistence.save(&spawner)?;   // returns immediately
//! persistence.flush()?;          // blocks until written
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod backend;
pub mod error;
pub mod migrate;
pub mod persistence;
pub mod record;
pub mod store;
pub mod writer;

pub use backend::memory::MemoryStore;
pub use error::{StorageError, StorageResult};
pub use migrate::{migrate, MigrationReport};
pub use persistence::{LoadReport, Persistence};
pub use record::PersistedRecord;
pub use store::{open_store, SpawnerStore};
pub use writer::{BatchedWriter, PendingWrite, WritePriority, WriterConfig, WriterStats};

#[cfg(feature = "mysql")]
pub use backend::mysql::MysqlStore;
#[cfg(feature = "postgres")]
pub use backend::postgres::PostgresStore;
#[cfg(feature = "sqlite")]
pub use backend::sqlite::SqliteStore;
