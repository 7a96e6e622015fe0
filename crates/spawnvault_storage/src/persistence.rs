//! # Persistence Facade
//!
//! One entry point for the engine: load, save, delete and flush, with the
//! backend and the write-behind queue hidden behind it.
//!
//! Reads are queue-aware: a spawner saved but not yet written is returned
//! from the queue, and one deleted but not yet removed is reported missing.

use spawnvault_core::{LogicalSpawner, SpawnerId, SpawnerLimits, StorageSettings};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{StorageError, StorageResult};
use crate::record::PersistedRecord;
use crate::store::{open_store, SpawnerStore};
use crate::writer::{BatchedWriter, PendingWrite, WritePriority, WriterConfig, WriterStats};

/// Outcome of a bulk load.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Spawners that loaded cleanly.
    pub spawners: Vec<LogicalSpawner>,
    /// Rows that were skipped, with the reason.
    pub skipped: Vec<StorageError>,
}

/// Durable spawner state behind a batched writer.
pub struct Persistence {
    store: Arc<dyn SpawnerStore>,
    writer: BatchedWriter,
    limits: SpawnerLimits,
}

impl Persistence {
    /// Opens the configured backend and starts the writer.
    ///
    /// # Errors
    ///
    /// Any error from [`open_store`] or the writer thread.
    pub fn open(settings: &StorageSettings, limits: SpawnerLimits) -> StorageResult<Self> {
        let store = open_store(settings)?;
        Self::new(store, WriterConfig::from(settings), limits)
    }

    /// Wraps an already opened store.
    ///
    /// # Errors
    ///
    /// `Backend` if the writer thread cannot start.
    pub fn new(
        store: Arc<dyn SpawnerStore>,
        config: WriterConfig,
        limits: SpawnerLimits,
    ) -> StorageResult<Self> {
        let writer = BatchedWriter::start(Arc::clone(&store), config)?;
        Ok(Self {
            store,
            writer,
            limits,
        })
    }

    /// Backend name.
    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.store.kind()
    }

    /// Underlying store, for maintenance tasks such as migration.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SpawnerStore> {
        &self.store
    }

    /// Loads one spawner.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent or pending deletion, `Corrupt` if the row is damaged.
    pub fn load(&self, id: &SpawnerId) -> StorageResult<LogicalSpawner> {
        let record = match self.writer.pending(id.as_str()) {
            Some(PendingWrite::Upsert(record)) => Some(record),
            Some(PendingWrite::Delete) => None,
            None => self.store.fetch(id.as_str())?,
        };
        record
            .ok_or_else(|| StorageError::NotFound(id.clone()))?
            .into_spawner(self.limits)
    }

    /// Loads every spawner, skipping damaged rows.
    ///
    /// # Errors
    ///
    /// Only if the backend cannot be read at all.
    pub fn load_all(&self) -> StorageResult<LoadReport> {
        let mut pending = self.writer.pending_all();
        let mut report = LoadReport::default();
        let mut seen = HashSet::new();

        for row in self.store.fetch_all()? {
            let record = match row {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable spawner row");
                    report.skipped.push(e);
                    continue;
                }
            };
            seen.insert(record.id.clone());
            let record = match pending.remove(&record.id) {
                Some(PendingWrite::Upsert(newer)) => newer,
                Some(PendingWrite::Delete) => continue,
                None => record,
            };
            self.push_loaded(record, &mut report);
        }

        // Saved but never written yet.
        for (id, op) in pending {
            if let PendingWrite::Upsert(record) = op {
                if !seen.contains(&id) {
                    self.push_loaded(record, &mut report);
                }
            }
        }

        tracing::info!(
            loaded = report.spawners.len(),
            skipped = report.skipped.len(),
            backend = self.backend(),
            "spawners loaded"
        );
        Ok(report)
    }

    fn push_loaded(&self, record: PersistedRecord, report: &mut LoadReport) {
        match record.into_spawner(self.limits) {
            Ok(spawner) => report.spawners.push(spawner),
            Err(e) => {
                tracing::warn!(error = %e, "skipping corrupt spawner record");
                report.skipped.push(e);
            }
        }
    }

    /// Queues a deferred save. Returns immediately.
    ///
    /// # Errors
    ///
    /// `QueueFull`, `WriterShutdown`, or `Corrupt` if the spawner cannot be encoded.
    pub fn save(&self, spawner: &LogicalSpawner) -> StorageResult<()> {
        self.writer
            .save(PersistedRecord::from_spawner(spawner)?, WritePriority::Deferred)
    }

    /// Queues a save and wakes the writer now.
    ///
    /// # Errors
    ///
    /// Same as [`Persistence::save`].
    pub fn save_prompt(&self, spawner: &LogicalSpawner) -> StorageResult<()> {
        self.writer
            .save(PersistedRecord::from_spawner(spawner)?, WritePriority::Prompt)
    }

    /// Queues removal of a spawner.
    ///
    /// # Errors
    ///
    /// `QueueFull` or `WriterShutdown`.
    pub fn delete(&self, id: &SpawnerId) -> StorageResult<()> {
        self.writer.delete(id.as_str(), WritePriority::Prompt)
    }

    /// Blocks until everything queued so far has been written.
    ///
    /// # Errors
    ///
    /// `PersistenceTransientFailure` if records remain dirty.
    pub fn flush(&self) -> StorageResult<()> {
        self.writer.flush()
    }

    /// Writer counters.
    #[must_use]
    pub fn stats(&self) -> WriterStats {
        self.writer.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use spawnvault_core::{CreatureType, ItemKind, Position};
    use std::time::Duration;

    fn create_test_spawner(x: i32) -> LogicalSpawner {
        LogicalSpawner::new(
            CreatureType::new("zombie"),
            Position::new("world", x, 70, 5),
            SpawnerLimits::default(),
            0,
        )
    }

    fn create_test_persistence() -> (Arc<MemoryStore>, Persistence) {
        let store = Arc::new(MemoryStore::new());
        let config = WriterConfig {
            flush_interval: Duration::from_secs(3_600),
            ..WriterConfig::from(&StorageSettings::memory())
        };
        let persistence = Persistence::new(store.clone(), config, SpawnerLimits::default()).unwrap();
        (store, persistence)
    }

    #[test]
    fn test_read_your_writes_before_flush() {
        let (store, persistence) = create_test_persistence();
        let mut spawner = create_test_spawner(1);
        spawner.stored_items.insert(ItemKind::new("rotten_flesh"), 7);
        persistence.save(&spawner).unwrap();

        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(persistence.load(&spawner.id).unwrap(), spawner);
    }

    #[test]
    fn test_pending_delete_hides_row() {
        let (_store, persistence) = create_test_persistence();
        let spawner = create_test_spawner(1);
        persistence.save_prompt(&spawner).unwrap();
        persistence.flush().unwrap();

        persistence.delete(&spawner.id).unwrap();
        assert!(matches!(
            persistence.load(&spawner.id),
            Err(StorageError::NotFound(_))
        ));
        assert!(persistence.load_all().unwrap().spawners.is_empty());
    }

    #[test]
    fn test_load_all_skips_corrupt_rows() {
        let (store, persistence) = create_test_persistence();
        for x in 0..3 {
            persistence.save(&create_test_spawner(x)).unwrap();
        }
        persistence.flush().unwrap();

        let mut damaged = PersistedRecord::from_spawner(&create_test_spawner(9)).unwrap();
        damaged.stored_experience = 12;
        store.insert_raw(damaged);

        let report = persistence.load_all().unwrap();
        assert_eq!(report.spawners.len(), 3);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(report.skipped[0], StorageError::Corrupt { .. }));
    }

    #[test]
    fn test_load_all_overlays_queue() {
        let (_store, persistence) = create_test_persistence();
        let mut spawner = create_test_spawner(1);
        persistence.save(&spawner).unwrap();
        persistence.flush().unwrap();

        spawner.stored_experience = 33;
        persistence.save(&spawner).unwrap();
        persistence.save(&create_test_spawner(2)).unwrap();

        let report = persistence.load_all().unwrap();
        assert_eq!(report.spawners.len(), 2);
        let reloaded = report
            .spawners
            .iter()
            .find(|s| s.id == spawner.id)
            .unwrap();
        assert_eq!(reloaded.stored_experience, 33);
    }

    #[test]
    fn test_missing_spawner() {
        let (_store, persistence) = create_test_persistence();
        let id = SpawnerId::at(&Position::new("world", 0, 0, 0));
        assert!(matches!(persistence.load(&id), Err(StorageError::NotFound(_))));
    }
}
