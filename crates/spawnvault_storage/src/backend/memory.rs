//! In-process store with fault injection, for tests and dry runs.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::error::{StorageError, StorageResult};
use crate::record::PersistedRecord;
use crate::store::SpawnerStore;

/// Rows kept in a map; can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, PersistedRecord>>,
    offline: AtomicBool,
    fail_writes: AtomicU32,
    rejected: Mutex<BTreeSet<String>>,
    write_calls: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }

    /// Makes every write touching `id` fail.
    pub fn reject(&self, id: impl Into<String>) {
        self.rejected.lock().insert(id.into());
    }

    /// Lifts a rejection set by [`MemoryStore::reject`].
    pub fn accept(&self, id: &str) {
        self.rejected.lock().remove(id);
    }

    /// Stores a row as-is, bypassing validation.
    pub fn insert_raw(&self, record: PersistedRecord) {
        self.rows.lock().insert(record.id.clone(), record);
    }

    /// Write transactions attempted so far.
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::Backend("memory store offline".into()))
        } else {
            Ok(())
        }
    }

    fn check_write<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> StorageResult<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let injected = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Backend("injected write failure".into()));
        }
        let rejected = self.rejected.lock();
        if let Some(id) = ids.into_iter().find(|id| rejected.contains(*id)) {
            return Err(StorageError::Backend(format!("write rejected for {id}")));
        }
        Ok(())
    }
}

impl SpawnerStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn upsert(&self, records: &[PersistedRecord]) -> StorageResult<()> {
        self.check_write(records.iter().map(|r| r.id.as_str()))?;
        let mut rows = self.rows.lock();
        for record in records {
            rows.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    fn delete(&self, ids: &[String]) -> StorageResult<()> {
        self.check_write(ids.iter().map(String::as_str))?;
        let mut rows = self.rows.lock();
        for id in ids {
            rows.remove(id);
        }
        Ok(())
    }

    fn fetch(&self, id: &str) -> StorageResult<Option<PersistedRecord>> {
        self.check_online()?;
        Ok(self.rows.lock().get(id).cloned())
    }

    fn fetch_all(&self) -> StorageResult<Vec<StorageResult<PersistedRecord>>> {
        self.check_online()?;
        Ok(self.rows.lock().values().cloned().map(Ok).collect())
    }

    fn count(&self) -> StorageResult<usize> {
        self.check_online()?;
        Ok(self.rows.lock().len())
    }
}
