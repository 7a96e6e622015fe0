//! # Store Interface
//!
//! Every backend implements [`SpawnerStore`]; callers hold an
//! `Arc<dyn SpawnerStore>` and never branch on the backend kind.

use spawnvault_core::{BackendKind, StorageSettings};
use std::sync::Arc;

use crate::error::{StorageError, StorageResult};
use crate::backend::memory::MemoryStore;
use crate::record::PersistedRecord;

/// Durable spawner storage.
///
/// Implementations are blocking and must only be driven from the writer
/// thread or from startup/maintenance code, never from the tick path.
pub trait SpawnerStore: Send + Sync {
    /// Backend name for diagnostics.
    fn kind(&self) -> &'static str;

    /// Inserts or replaces `records` in one transaction.
    ///
    /// # Errors
    ///
    /// Any driver or pool error; nothing is written on error.
    fn upsert(&self, records: &[PersistedRecord]) -> StorageResult<()>;

    /// Deletes `ids` in one transaction. Missing ids are ignored.
    ///
    /// # Errors
    ///
    /// Any driver or pool error.
    fn delete(&self, ids: &[String]) -> StorageResult<()>;

    /// Reads one record.
    ///
    /// # Errors
    ///
    /// Driver errors, or `Corrupt` if the row cannot be decoded.
    fn fetch(&self, id: &str) -> StorageResult<Option<PersistedRecord>>;

    /// Reads every record. Rows that fail to decode come back as errors
    /// in place so the caller can skip them individually.
    ///
    /// # Errors
    ///
    /// Only if the table cannot be read at all.
    fn fetch_all(&self) -> StorageResult<Vec<StorageResult<PersistedRecord>>>;

    /// Number of stored rows.
    ///
    /// # Errors
    ///
    /// Any driver or pool error.
    fn count(&self) -> StorageResult<usize>;
}

/// Opens the backend named by `settings`.
///
/// # Errors
///
/// `Config` for a missing URL or a backend compiled out, otherwise any
/// error raised while connecting or creating the schema.
pub fn open_store(settings: &StorageSettings) -> StorageResult<Arc<dyn SpawnerStore>> {
    let store: Arc<dyn SpawnerStore> = match settings.backend {
        BackendKind::Memory => Arc::new(MemoryStore::new()),
        BackendKind::Sqlite => open_sqlite(settings)?,
        BackendKind::Mysql => open_mysql(settings)?,
        BackendKind::Postgres => open_postgres(settings)?,
    };
    tracing::info!(backend = store.kind(), pool_size = settings.pool_size, "storage opened");
    Ok(store)
}

fn required_url(settings: &StorageSettings) -> StorageResult<&str> {
    settings
        .url
        .as_deref()
        .ok_or_else(|| StorageError::Config(format!("{:?} backend needs storage.url", settings.backend)))
}

#[cfg(feature = "sqlite")]
fn open_sqlite(settings: &StorageSettings) -> StorageResult<Arc<dyn SpawnerStore>> {
    Ok(Arc::new(crate::backend::sqlite::SqliteStore::open(
        &settings.path,
        settings.pool_size,
    )?))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_settings: &StorageSettings) -> StorageResult<Arc<dyn SpawnerStore>> {
    Err(StorageError::Config("built without the sqlite feature".into()))
}

#[cfg(feature = "mysql")]
fn open_mysql(settings: &StorageSettings) -> StorageResult<Arc<dyn SpawnerStore>> {
    Ok(Arc::new(crate::backend::mysql::MysqlStore::connect(
        required_url(settings)?,
        settings.pool_size,
    )?))
}

#[cfg(not(feature = "mysql"))]
fn open_mysql(settings: &StorageSettings) -> StorageResult<Arc<dyn SpawnerStore>> {
    required_url(settings)?;
    Err(StorageError::Config("built without the mysql feature".into()))
}

#[cfg(feature = "postgres")]
fn open_postgres(settings: &StorageSettings) -> StorageResult<Arc<dyn SpawnerStore>> {
    Ok(Arc::new(crate::backend::postgres::PostgresStore::connect(
        required_url(settings)?,
        settings.pool_size,
    )?))
}

#[cfg(not(feature = "postgres"))]
fn open_postgres(settings: &StorageSettings) -> StorageResult<Arc<dyn SpawnerStore>> {
    required_url(settings)?;
    Err(StorageError::Config("built without the postgres feature".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let store = open_store(&StorageSettings::memory()).unwrap();
        assert_eq!(store.kind(), "memory");
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_networked_backend_requires_url() {
        let settings = StorageSettings {
            backend: BackendKind::Postgres,
            url: None,
            ..StorageSettings::default()
        };
        assert!(matches!(open_store(&settings), Err(StorageError::Config(_))));
    }
}
