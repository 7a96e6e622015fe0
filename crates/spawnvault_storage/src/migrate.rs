//! Copies every spawner from one backend to another.
//!
//! Rows are verified before copying; damaged ones are reported and left
//! behind. The source is never modified.

use crate::error::{StorageError, StorageResult};
use crate::store::SpawnerStore;

/// Outcome of a migration.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Rows written to the target.
    pub copied: usize,
    /// Rows left behind.
    pub skipped: Vec<StorageError>,
}

/// Copies all rows from `source` into `target` in batches of `batch_size`.
///
/// Existing target rows with the same id are replaced.
///
/// # Errors
///
/// Any error reading the source table or writing a batch to the target.
pub fn migrate(
    source: &dyn SpawnerStore,
    target: &dyn SpawnerStore,
    batch_size: usize,
) -> StorageResult<MigrationReport> {
    let mut report = MigrationReport::default();
    let mut valid = Vec::new();

    for row in source.fetch_all()? {
        match row.and_then(|record| record.verify().map(|()| record)) {
            Ok(record) => valid.push(record),
            Err(e) => {
                tracing::warn!(error = %e, "row not migrated");
                report.skipped.push(e);
            }
        }
    }

    for chunk in valid.chunks(batch_size.max(1)) {
        target.upsert(chunk)?;
        report.copied += chunk.len();
    }

    tracing::info!(
        from = source.kind(),
        to = target.kind(),
        copied = report.copied,
        skipped = report.skipped.len(),
        "migration complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use crate::record::PersistedRecord;
    use spawnvault_core::{CreatureType, LogicalSpawner, Position, SpawnerLimits};

    fn create_test_record(x: i32) -> PersistedRecord {
        let spawner = LogicalSpawner::new(
            CreatureType::new("pig"),
            Position::new("farm", x, 64, 0),
            SpawnerLimits::default(),
            0,
        );
        PersistedRecord::from_spawner(&spawner).unwrap()
    }

    #[test]
    fn test_migrate_copies_valid_rows() {
        let source = MemoryStore::new();
        let target = MemoryStore::new();
        for x in 0..7 {
            source.insert_raw(create_test_record(x));
        }
        let mut damaged = create_test_record(99);
        damaged.creature = "cow".into();
        source.insert_raw(damaged);

        let report = migrate(&source, &target, 3).unwrap();
        assert_eq!(report.copied, 7);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(target.count().unwrap(), 7);
        assert_eq!(source.count().unwrap(), 8);
        assert_eq!(target.write_calls(), 3);
    }

    #[test]
    fn test_target_failure_aborts() {
        let source = MemoryStore::new();
        source.insert_raw(create_test_record(1));
        let target = MemoryStore::new();
        target.set_offline(true);
        assert!(migrate(&source, &target, 10).is_err());
    }
}
