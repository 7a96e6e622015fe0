//! Embedded SQLite backend over an r2d2 pool.

use r2d2::Pool;
use r2d2_sqlite::rusqlite::{params, OptionalExtension, Row};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use super::{column_list, select_all, update_columns, TABLE};
use crate::error::StorageResult;
use crate::record::{from_sql_int, to_sql_int, PersistedRecord};
use crate::store::SpawnerStore;

/// SQLite file store.
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Opens (or creates) the database file and its schema.
    ///
    /// # Errors
    ///
    /// Pool or driver errors.
    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> StorageResult<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;
        let store = Self { pool };
        store.create_schema()?;
        tracing::info!(path = %path.as_ref().display(), "sqlite store ready");
        Ok(store)
    }

    fn create_schema(&self) -> StorageResult<()> {
        let conn = self.pool.get()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (
                id TEXT PRIMARY KEY NOT NULL,
                creature TEXT NOT NULL,
                stack_size INTEGER NOT NULL,
                status TEXT NOT NULL,
                inactive_reason TEXT,
                stored_items TEXT NOT NULL,
                stored_experience INTEGER NOT NULL,
                world TEXT NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                z INTEGER NOT NULL,
                filtered_items TEXT NOT NULL,
                owner TEXT,
                last_tick_ms INTEGER NOT NULL,
                next_eligible_ms INTEGER NOT NULL,
                checksum INTEGER NOT NULL
            )"
        ))?;
        Ok(())
    }

    fn upsert_sql() -> String {
        let placeholders = (1..=16).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        let updates = update_columns()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {TABLE} ({}) VALUES ({placeholders}) ON CONFLICT(id) DO UPDATE SET {updates}",
            column_list()
        )
    }
}

/// Decodes one row; the id is read first so errors can name it.
fn decode(row: &Row<'_>) -> StorageResult<PersistedRecord> {
    let id: String = row.get(0)?;
    Ok(PersistedRecord {
        creature: row.get(1)?,
        stack_size: from_sql_int(row.get(2)?, &id, "stack_size")?,
        status: row.get(3)?,
        inactive_reason: row.get(4)?,
        stored_items: row.get(5)?,
        stored_experience: from_sql_int(row.get(6)?, &id, "stored_experience")?,
        world: row.get(7)?,
        x: row.get(8)?,
        y: row.get(9)?,
        z: row.get(10)?,
        filtered_items: row.get(11)?,
        owner: row.get(12)?,
        last_tick_ms: from_sql_int(row.get(13)?, &id, "last_tick_ms")?,
        next_eligible_ms: from_sql_int(row.get(14)?, &id, "next_eligible_ms")?,
        checksum: from_sql_int(row.get(15)?, &id, "checksum")?,
        id,
    })
}

impl SpawnerStore for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn upsert(&self, records: &[PersistedRecord]) -> StorageResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&Self::upsert_sql())?;
            for r in records {
                stmt.execute(params![
                    r.id,
                    r.creature,
                    i64::from(r.stack_size),
                    r.status,
                    r.inactive_reason,
                    r.stored_items,
                    to_sql_int(r.stored_experience, &r.id, "stored_experience")?,
                    r.world,
                    r.x,
                    r.y,
                    r.z,
                    r.filtered_items,
                    r.owner,
                    to_sql_int(r.last_tick_ms, &r.id, "last_tick_ms")?,
                    to_sql_int(r.next_eligible_ms, &r.id, "next_eligible_ms")?,
                    i64::from(r.checksum),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, ids: &[String]) -> StorageResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!("DELETE FROM {TABLE} WHERE id = ?1"))?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn fetch(&self, id: &str) -> StorageResult<Option<PersistedRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached(&format!("{} WHERE id = ?1", select_all()))?;
        let record = stmt.query_row(params![id], |row| Ok(decode(row))).optional()?;
        record.transpose()
    }

    fn fetch_all(&self) -> StorageResult<Vec<StorageResult<PersistedRecord>>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&select_all())?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(decode(row));
        }
        Ok(out)
    }

    fn count(&self) -> StorageResult<usize> {
        let conn = self.pool.get()?;
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| row.get(0))?;
        from_sql_int(n, TABLE, "count")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spawnvault_core::{CreatureType, ItemKind, LogicalSpawner, Position, SpawnerLimits};

    fn temp_db_path() -> std::path::PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("test_spawnvault_sqlite_{id}.db"))
    }

    fn cleanup(path: &Path) {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = path.as_os_str().to_owned();
            p.push(suffix);
            std::fs::remove_file(p).ok();
        }
    }

    #[test]
    fn test_upsert_and_reload() {
        let path = temp_db_path();
        let store = SqliteStore::open(&path, 2).unwrap();

        let mut spawner = LogicalSpawner::new(
            CreatureType::new("skeleton"),
            Position::new("world", 1, 2, 3),
            SpawnerLimits::default(),
            0,
        );
        spawner.stored_items.insert(ItemKind::new("bone"), 5);
        let record = PersistedRecord::from_spawner(&spawner).unwrap();
        store.upsert(&[record.clone()]).unwrap();

        spawner.stored_items.insert(ItemKind::new("bone"), 9);
        let updated = PersistedRecord::from_spawner(&spawner).unwrap();
        store.upsert(&[updated.clone()]).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.fetch(&record.id).unwrap(), Some(updated));
        assert_eq!(store.fetch("missing").unwrap(), None);

        store.delete(&[record.id.clone()]).unwrap();
        assert_eq!(store.count().unwrap(), 0);

        drop(store);
        cleanup(&path);
    }

    #[test]
    fn test_negative_column_is_reported_per_row() {
        let path = temp_db_path();
        let store = SqliteStore::open(&path, 1).unwrap();
        let spawner = LogicalSpawner::new(
            CreatureType::new("zombie"),
            Position::new("world", 0, 0, 0),
            SpawnerLimits::default(),
            0,
        );
        store
            .upsert(&[PersistedRecord::from_spawner(&spawner).unwrap()])
            .unwrap();
        {
            let conn = store.pool.get().unwrap();
            conn.execute(
                &format!("UPDATE {TABLE} SET stack_size = -4 WHERE id = ?1"),
                params![spawner.id.as_str()],
            )
            .unwrap();
        }

        let rows = store.fetch_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_err());

        drop(store);
        cleanup(&path);
    }
}
